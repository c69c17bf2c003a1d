use std::io::Error as IoError;

use selfcheck::OrchestratorError;
use selfcheck::probe::ProbeSetupError;
use selfcheck::store::StoreError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0:#}")]
    Io(#[from] IoError),
    #[error("Address parsing error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
    #[error("loading configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("opening store: {0}")]
    Store(#[from] StoreError),
    #[error("setting up check: {0}")]
    ProbeSetup(#[from] ProbeSetupError),
    #[error("building orchestrator: {0}")]
    Orchestrator(#[from] OrchestratorError),
}
