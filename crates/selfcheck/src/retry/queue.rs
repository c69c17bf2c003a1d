use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use super::{BackoffSchedule, RetryTask};
use crate::context::RunContext;

/// Grace period for the final attempt made once a submission's context or
/// the queue itself has shut down.
pub const DEFAULT_DYING_BREATH: Duration = Duration::from_secs(1);

/// Runs [`RetryTask`]s in the background, one tracked tokio task per submission.
///
/// Clones share the same shutdown signal and outstanding-work tracker.
#[derive(Debug, Clone)]
pub struct RetryQueue {
    shutdown: CancellationToken,
    tracker: TaskTracker,
    dying_breath: Duration,
}

impl Default for RetryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::with_dying_breath(DEFAULT_DYING_BREATH)
    }

    pub fn with_dying_breath(dying_breath: Duration) -> Self {
        Self { shutdown: CancellationToken::new(), tracker: TaskTracker::new(), dying_breath }
    }

    pub fn dying_breath(&self) -> Duration {
        self.dying_breath
    }

    /// Submissions that have not returned yet.
    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Fire and forget: run `task` under `ctx`, retrying per `schedule`.
    ///
    /// The outcome is only visible through logs and whatever the task
    /// records about itself.
    pub fn submit<T>(&self, ctx: &RunContext, schedule: &BackoffSchedule, task: T)
    where
        T: RetryTask,
    {
        let submission = Submission {
            ctx: ctx.clone(),
            delays: schedule.delays().to_vec(),
            shutdown: self.shutdown.clone(),
            dying_breath: self.dying_breath,
        };
        self.tracker.spawn(submission.drive(task));
    }

    /// Wait for every outstanding submission without signalling shutdown.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        if !self.is_shutdown() {
            self.tracker.reopen();
        }
    }

    /// Make every waiting submission attempt once more immediately, then wait
    /// for all of them to return. Later calls return once the work has drained.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

struct Submission {
    ctx: RunContext,
    delays: Vec<Duration>,
    shutdown: CancellationToken,
    dying_breath: Duration,
}

impl Submission {
    async fn drive<T: RetryTask>(self, mut task: T) {
        let Submission { mut ctx, delays, shutdown, dying_breath } = self;
        let attempts = delays.len();
        let mut last_err = None;

        for (i, delay) in delays.into_iter().enumerate() {
            let attempt = i as u32 + 1;
            let mut last_breath = false;
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = ctx.done() => last_breath = true,
                    _ = shutdown.cancelled() => last_breath = true,
                }
            }
            if last_breath || ctx.err().is_some() || shutdown.is_cancelled() {
                // Parent or queue is gone; detach for one bounded attempt.
                ctx = RunContext::background().with_timeout(dying_breath);
                last_breath = true;
            }

            let err = match task.attempt(&ctx, attempt).await {
                Ok(()) => {
                    debug!(task = task.name(), attempt, "retried task succeeded");
                    return;
                }
                Err(err) => err,
            };
            if (attempt as usize) < attempts {
                warn!(task = task.name(), attempt, error = %err, "attempt failed");
            }
            task.record_failure(attempt, &err);
            last_err = Some(err);
            if last_breath || ctx.err().is_some() {
                break;
            }
        }

        if let Some(err) = last_err {
            error!(task = task.name(), error = %err, "final attempt failed, giving up");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::task_fn;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_success_stops_retrying() {
        let queue = RetryQueue::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let schedule = BackoffSchedule::new(vec![Duration::ZERO; 5]).unwrap();

        let task = task_fn("count", move |_ctx, _attempt| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), anyhow::Error>(())
            }
        });
        queue.submit(&RunContext::background(), &schedule, task);
        queue.drain().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let queue = RetryQueue::new();
        queue.shutdown().await;
        queue.shutdown().await;
        assert!(queue.is_shutdown());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_parent_gets_fresh_context() {
        let queue = RetryQueue::with_dying_breath(Duration::from_millis(250));
        let parent = RunContext::background();
        parent.cancel();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let record = seen.clone();

        let task = task_fn("record", move |ctx: RunContext, attempt| {
            record.lock().unwrap().push((attempt, ctx.err(), ctx.deadline()));
            async move { Err::<(), _>(anyhow::anyhow!("store down")) }
        });
        queue.submit(&parent, &BackoffSchedule::once(), task);
        queue.drain().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, 1);
        assert_eq!(seen[0].1, None);
        assert!(seen[0].2.is_some());
    }
}
