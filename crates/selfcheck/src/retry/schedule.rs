use std::time::Duration;

use super::RetryError;

/// Wait before each save attempt; the length is the attempt budget.
pub const DEFAULT_SAVE_SCHEDULE: [Duration; 10] = [
    Duration::ZERO,
    Duration::from_millis(10),
    Duration::from_millis(100),
    Duration::from_millis(500),
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(8),
    Duration::from_secs(16),
    Duration::from_secs(32),
];

/// Ordered waits consumed once per attempt.
///
/// Entry `i` is how long to wait before attempt `i + 1`; a zero entry runs
/// the attempt immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    delays: Vec<Duration>,
}

impl BackoffSchedule {
    pub fn new(delays: impl Into<Vec<Duration>>) -> Result<Self, RetryError> {
        let delays = delays.into();
        if delays.is_empty() {
            return Err(RetryError::EmptySchedule);
        }
        Ok(Self { delays })
    }

    /// A single immediate attempt.
    pub fn once() -> Self {
        Self { delays: vec![Duration::ZERO] }
    }

    pub fn max_attempts(&self) -> usize {
        self.delays.len()
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self { delays: DEFAULT_SAVE_SCHEDULE.to_vec() }
    }
}
