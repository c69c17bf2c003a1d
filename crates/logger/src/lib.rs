//! Shared tracing setup for the self-check binaries.

mod tracing;

pub use self::tracing::{init, try_init_with};
