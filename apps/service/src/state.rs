use std::sync::Arc;

use selfcheck::{ProbeOrchestrator, RunContext, Store};

/// Shared by every HTTP worker.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ProbeOrchestrator>,
    pub store: Arc<dyn Store>,
    /// Cancelled on shutdown; request contexts derive from it.
    pub root: RunContext,
}
