//! Cancellation and deadline scope shared by probes, retries and stores.
//!
//! A [`RunContext`] pairs a [`CancellationToken`] with an optional deadline.
//! Children derived from a context are cancelled together with their parent,
//! and inherit the tighter of the two deadlines.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Clone)]
pub struct RunContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::background()
    }
}

impl RunContext {
    /// A root context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self { token: CancellationToken::new(), deadline: None }
    }

    /// Wrap an existing token, e.g. one cancelled by a signal handler.
    pub fn from_token(token: CancellationToken) -> Self {
        Self { token, deadline: None }
    }

    /// Child context cancelled with this one, or on its own via [`cancel`](Self::cancel).
    pub fn child(&self) -> Self {
        Self { token: self.token.child_token(), deadline: self.deadline }
    }

    /// Child context that also expires `timeout` from now.
    ///
    /// A timeout too large to represent leaves the parent's deadline in place.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = match (self.deadline, Instant::now().checked_add(timeout)) {
            (Some(parent), Some(candidate)) => Some(parent.min(candidate)),
            (parent, None) => parent,
            (None, candidate) => candidate,
        };
        Self { token: self.token.child_token(), deadline }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `None` while the context is live.
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => ContextError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                ContextError::Cancelled
            }
        }
    }

    /// Drive `fut` to completion unless the context ends first.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, ContextError>
    where
        F: Future,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_child_follows_parent_cancellation() {
        let parent = RunContext::background();
        let child = parent.child();
        assert_eq!(child.err(), None);

        parent.cancel();
        assert_eq!(child.err(), Some(ContextError::Cancelled));
        assert_eq!(child.done().await, ContextError::Cancelled);
    }

    #[tokio::test]
    async fn test_child_cancel_does_not_reach_parent() {
        let parent = RunContext::background();
        let child = parent.child();
        child.cancel();
        assert!(parent.err().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_tighter_deadline() {
        let outer = RunContext::background().with_timeout(Duration::from_millis(50));
        let inner = outer.with_timeout(Duration::from_secs(10));
        assert_eq!(inner.deadline(), outer.deadline());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(inner.err(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_unrepresentable_timeout_keeps_parent_deadline() {
        let unbounded = RunContext::background().with_timeout(Duration::MAX);
        assert_eq!(unbounded.deadline(), None);
        assert!(unbounded.err().is_none());

        let outer = RunContext::background().with_timeout(Duration::from_secs(5));
        let inner = outer.with_timeout(Duration::MAX);
        assert_eq!(inner.deadline(), outer.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_abandons_slow_future() {
        let ctx = RunContext::background().with_timeout(Duration::from_millis(10));
        let out = ctx.run(tokio::time::sleep(Duration::from_secs(5))).await;
        assert_eq!(out, Err(ContextError::DeadlineExceeded));
    }
}
