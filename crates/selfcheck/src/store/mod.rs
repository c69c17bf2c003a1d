/// Store abstraction layer
///
/// Check results and instance records are written through the [`Store`]
/// trait. Two backends exist: a log store that prints JSON, and a libsql
/// store (local file or remote server) with a pooled connection manager.
pub mod database;
pub mod log;
pub mod migrations;
pub mod pool;
pub mod save;

pub use database::{LibsqlStore, open_database};
pub use log::LogStore;
pub use save::{
    SaveCheckResult, UpdateInstance, register_instance_with_retry, save_with_retry, update_instance_with_retry,
};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::context::{ContextError, RunContext};
use crate::gap::{GapQuery, GapRecord};
use crate::types::{CheckResult, Instance};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unsupported store uri {0:?}")]
    UnsupportedUri(String),
    #[error(transparent)]
    Database(#[from] libsql::Error),
    #[error("acquiring connection: {0}")]
    Pool(#[from] deadpool::managed::PoolError<libsql::Error>),
    #[error("building connection pool: {0}")]
    PoolBuild(#[from] deadpool::managed::BuildError),
    #[error("encoding result: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("invalid stored data: {0}")]
    InvalidData(String),
}

/// Durable sink for check results.
///
/// Implementations must tolerate concurrent calls; writes of different
/// results are not serialised by the caller.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist one result with its errors and measurements.
    async fn save_check_result(&self, ctx: &RunContext, result: &CheckResult) -> Result<(), StoreError>;

    /// Insert or refresh the instance record.
    async fn update_instance(&self, ctx: &RunContext, instance: &Instance) -> Result<(), StoreError>;

    /// Scan stored check timestamps and report each app's longest gap.
    async fn analyze_longest_gap_per_app(
        &self,
        ctx: &RunContext,
        query: &GapQuery,
        output: &mut (dyn FnMut(GapRecord) + Send),
    ) -> Result<(), StoreError>;

    /// Release connections.
    async fn close(&self) -> Result<(), StoreError>;
}

/// Open a store from a URI.
///
/// Empty or `stdout` and `stderr` select the log store; `libsql://`,
/// `http(s)://`, `file:` URIs and bare paths select libsql.
pub async fn open(uri: &str, auth_token: Option<&str>) -> Result<Arc<dyn Store>, StoreError> {
    match uri {
        "" => Ok(Arc::new(LogStore::stdout())),
        u if u.eq_ignore_ascii_case("stdout") => Ok(Arc::new(LogStore::stdout())),
        u if u.eq_ignore_ascii_case("stderr") => Ok(Arc::new(LogStore::stderr())),
        u if is_libsql_uri(u) => Ok(Arc::new(LibsqlStore::open(u, auth_token).await?)),
        other => Err(StoreError::UnsupportedUri(other.to_string())),
    }
}

fn is_libsql_uri(uri: &str) -> bool {
    if let Some((scheme, _)) = uri.split_once("://") {
        return matches!(scheme, "libsql" | "http" | "https" | "file");
    }
    uri.starts_with("file:") || !uri.contains(':') || uri.starts_with('/')
}
