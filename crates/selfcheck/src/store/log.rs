use std::io::Write;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Store, StoreError};
use crate::context::RunContext;
use crate::gap::{GapQuery, GapRecord};
use crate::types::{CheckResult, Instance};

/// Thin store which writes pretty-printed JSON to a writer instead of a database.
pub struct LogStore {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl LogStore {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self { writer: Mutex::new(Box::new(writer)) }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }

    async fn write_json<T: serde::Serialize>(&self, value: &T) -> Result<(), StoreError> {
        let mut buf = serde_json::to_vec_pretty(value)?;
        buf.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(&buf)?;
        Ok(())
    }
}

#[async_trait]
impl Store for LogStore {
    async fn save_check_result(&self, _ctx: &RunContext, result: &CheckResult) -> Result<(), StoreError> {
        self.write_json(result).await
    }

    async fn update_instance(&self, _ctx: &RunContext, instance: &Instance) -> Result<(), StoreError> {
        self.write_json(instance).await
    }

    /// Nothing is retained, so there is nothing to analyse.
    async fn analyze_longest_gap_per_app(
        &self,
        _ctx: &RunContext,
        _query: &GapQuery,
        _output: &mut (dyn FnMut(GapRecord) + Send),
    ) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.writer.lock().await.flush()?;
        Ok(())
    }
}
