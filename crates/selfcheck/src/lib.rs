//! Self-check core: runs a set of health probes concurrently, persists the
//! aggregated results with retries, and finds the longest silence per app in
//! the stored history.
//!
//! The service binary wires these pieces to configuration, HTTP and signals;
//! everything here is usable on its own.

pub mod clock;
pub mod context;
pub mod gap;
pub mod orchestrator;
pub mod probe;
pub mod publicip;
pub mod retry;
pub mod store;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use context::{ContextError, RunContext};
pub use gap::{GapAnalyzer, GapQuery, GapRecord};
pub use orchestrator::{OrchestratorError, ProbeOrchestrator};
pub use probe::Probe;
pub use retry::{BackoffSchedule, RetryQueue, RetryTask};
pub use store::{Store, StoreError};
pub use types::{CheckError, CheckResult, Instance, Measurement};
