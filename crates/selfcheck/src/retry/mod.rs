/// Retry module - asynchronous, retried execution of writes
///
/// A submission runs outside the caller's control flow, waits between
/// attempts according to a [`BackoffSchedule`], and gives up early when the
/// queue shuts down, after one last "dying breath" attempt on a fresh,
/// short-lived context.
pub mod queue;
pub mod schedule;

pub use queue::{DEFAULT_DYING_BREATH, RetryQueue};
pub use schedule::{BackoffSchedule, DEFAULT_SAVE_SCHEDULE};

use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;

use crate::context::RunContext;

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("backoff schedule must contain at least one attempt")]
    EmptySchedule,
}

/// Deferred work driven by [`RetryQueue`].
///
/// Attempts of one task never overlap, so implementations may keep an
/// accumulator in `self`.
#[async_trait]
pub trait RetryTask: Send + 'static {
    /// Run attempt number `attempt` (starting at 1) under `ctx`.
    async fn attempt(&mut self, ctx: &RunContext, attempt: u32) -> anyhow::Result<()>;

    /// Called after a failed attempt, before any further one.
    fn record_failure(&mut self, _attempt: u32, _err: &anyhow::Error) {}

    /// Label used in log events.
    fn name(&self) -> &str {
        "task"
    }
}

/// [`RetryTask`] backed by a closure taking the context and attempt number.
pub struct FnTask<F> {
    name: &'static str,
    f: F,
}

/// Wrap `f` as a [`RetryTask`] labelled `name` in logs.
pub fn task_fn<F, Fut>(name: &'static str, f: F) -> FnTask<F>
where
    F: FnMut(RunContext, u32) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnTask { name, f }
}

#[async_trait]
impl<F, Fut> RetryTask for FnTask<F>
where
    F: FnMut(RunContext, u32) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn attempt(&mut self, ctx: &RunContext, attempt: u32) -> anyhow::Result<()> {
        (self.f)(ctx.clone(), attempt).await
    }

    fn name(&self) -> &str {
        self.name
    }
}
