//! Longest-gap analysis over persisted check timestamps.
//!
//! Rows arrive grouped by app and ascending by timestamp. For every app the
//! analyzer keeps only the previous timestamp and the widest gap seen so far,
//! so a whole window is processed in one pass with constant state.

use chrono::{DateTime, Duration, Utc};

/// Time window (inclusive) and optional app filter for an analysis run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Empty means every app.
    pub apps: Vec<String>,
}

impl GapQuery {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end, apps: Vec::new() }
    }

    pub fn with_apps(mut self, apps: Vec<String>) -> Self {
        self.apps = apps;
        self
    }
}

/// The widest gap found for one app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapRecord {
    pub app_id: String,
    pub gap: Duration,
    /// Timestamp of the check that closed the gap
    pub gap_end: DateTime<Utc>,
}

impl GapRecord {
    pub fn gap_seconds(&self) -> f64 {
        self.gap.num_microseconds().map_or(self.gap.num_seconds() as f64, |us| us as f64 / 1e6)
    }

    /// `app_id,seconds,timestamp`
    pub fn to_csv_line(&self) -> String {
        format!("{},{:.6},{}", self.app_id, self.gap_seconds(), self.gap_end.to_rfc3339())
    }
}

struct Tracking {
    app_id: String,
    last: DateTime<Utc>,
    best: Option<(Duration, DateTime<Utc>)>,
}

impl Tracking {
    fn start(app_id: &str, ts: DateTime<Utc>) -> Self {
        Self { app_id: app_id.to_string(), last: ts, best: None }
    }

    fn finish(self) -> Option<GapRecord> {
        match self.best {
            Some((gap, gap_end)) if gap > Duration::zero() => {
                Some(GapRecord { app_id: self.app_id, gap, gap_end })
            }
            _ => None,
        }
    }
}

/// Streaming longest-gap calculator.
#[derive(Default)]
pub struct GapAnalyzer {
    current: Option<Tracking>,
}

impl GapAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next row. Returns the previous app's record when `app_id`
    /// starts a new group and that app had a positive gap.
    pub fn observe(&mut self, app_id: &str, ts: DateTime<Utc>) -> Option<GapRecord> {
        match &mut self.current {
            Some(tracking) if tracking.app_id == app_id => {
                let gap = ts - tracking.last;
                // Strict comparison keeps the earliest of equal gaps.
                if tracking.best.is_none_or(|(best, _)| gap > best) {
                    tracking.best = Some((gap, ts));
                }
                tracking.last = ts;
                None
            }
            _ => self.current.replace(Tracking::start(app_id, ts)).and_then(Tracking::finish),
        }
    }

    /// Flush the last app once the stream is exhausted.
    pub fn finish(self) -> Option<GapRecord> {
        self.current.and_then(Tracking::finish)
    }
}

/// Run [`GapAnalyzer`] over `rows`, calling `output` per emitting app.
pub fn analyze<I, S>(rows: I, mut output: impl FnMut(GapRecord))
where
    I: IntoIterator<Item = (S, DateTime<Utc>)>,
    S: AsRef<str>,
{
    let mut analyzer = GapAnalyzer::new();
    for (app_id, ts) in rows {
        if let Some(record) = analyzer.observe(app_id.as_ref(), ts) {
            output(record);
        }
    }
    if let Some(record) = analyzer.finish() {
        output(record);
    }
}
