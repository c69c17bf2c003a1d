use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::Store;
use crate::context::RunContext;
use crate::publicip;
use crate::retry::{BackoffSchedule, RetryQueue, RetryTask};
use crate::types::{CheckError, CheckResult, Instance};

/// Retry task persisting one [`CheckResult`].
///
/// Each failed attempt is appended to the task's own copy of the result as
/// `result_save_attempt_<n>`, so a later successful save carries the history.
pub struct SaveCheckResult {
    store: Arc<dyn Store>,
    result: CheckResult,
}

impl SaveCheckResult {
    pub fn new(store: Arc<dyn Store>, result: CheckResult) -> Self {
        Self { store, result }
    }

    pub fn result(&self) -> &CheckResult {
        &self.result
    }
}

#[async_trait]
impl RetryTask for SaveCheckResult {
    async fn attempt(&mut self, ctx: &RunContext, _attempt: u32) -> anyhow::Result<()> {
        self.store.save_check_result(ctx, &self.result).await?;
        Ok(())
    }

    fn record_failure(&mut self, attempt: u32, err: &anyhow::Error) {
        self.result.errors.push(CheckError::new(format!("result_save_attempt_{attempt}"), err));
    }

    fn name(&self) -> &str {
        "save_check_result"
    }
}

/// Persist `result` in the background, retrying per `schedule`.
pub fn save_with_retry(
    queue: &RetryQueue,
    ctx: &RunContext,
    store: Arc<dyn Store>,
    result: CheckResult,
    schedule: &BackoffSchedule,
) {
    queue.submit(ctx, schedule, SaveCheckResult::new(store, result));
}

/// Retry task writing the instance record.
pub struct UpdateInstance {
    store: Arc<dyn Store>,
    instance: Instance,
    resolve_public_ipv4: bool,
}

impl UpdateInstance {
    pub fn new(store: Arc<dyn Store>, instance: Instance) -> Self {
        Self { store, instance, resolve_public_ipv4: false }
    }

    /// Fill in the public IPv4 address before writing, while it is unknown.
    /// A failed lookup is logged and the record is written without it.
    pub fn with_public_ipv4_lookup(mut self) -> Self {
        self.resolve_public_ipv4 = true;
        self
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }
}

#[async_trait]
impl RetryTask for UpdateInstance {
    async fn attempt(&mut self, ctx: &RunContext, _attempt: u32) -> anyhow::Result<()> {
        if self.resolve_public_ipv4 && self.instance.public_ipv4.is_none() {
            match publicip::lookup_public_ipv4(ctx).await {
                Ok(addr) => self.instance.public_ipv4 = Some(addr.to_string()),
                Err(e) => warn!(error = %e, "querying node public IPv4"),
            }
        }
        self.store.update_instance(ctx, &self.instance).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "update_instance"
    }
}

/// Write `instance` in the background, retrying per `schedule`.
pub fn update_instance_with_retry(
    queue: &RetryQueue,
    ctx: &RunContext,
    store: Arc<dyn Store>,
    instance: Instance,
    schedule: &BackoffSchedule,
) {
    queue.submit(ctx, schedule, UpdateInstance::new(store, instance));
}

/// Register `instance` in the background, discovering its public IPv4
/// address first.
pub fn register_instance_with_retry(
    queue: &RetryQueue,
    ctx: &RunContext,
    store: Arc<dyn Store>,
    instance: Instance,
    schedule: &BackoffSchedule,
) {
    queue.submit(ctx, schedule, UpdateInstance::new(store, instance).with_public_ipv4_lookup());
}
