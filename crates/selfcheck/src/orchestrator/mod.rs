
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::clock::{self, Clock};
use crate::context::RunContext;
use crate::probe::Probe;
use crate::types::{CheckError, CheckResult, Instance, Measurement};

/// Deadline applied to each cycle unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(6);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("probe name must not be empty")]
    EmptyProbeName,
    #[error("probe {0:?} registered twice")]
    DuplicateProbe(String),
    #[error("cycle timeout must be positive")]
    ZeroTimeout,
}

struct NamedProbe {
    name: String,
    probe: Arc<dyn Probe>,
}

/// Runs a fixed set of named probes and aggregates their outcomes.
pub struct ProbeOrchestrator {
    instance: Instance,
    probes: Vec<NamedProbe>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

/// Builder for [`ProbeOrchestrator`].
pub struct ProbeOrchestratorBuilder {
    instance: Instance,
    probes: Vec<NamedProbe>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl ProbeOrchestratorBuilder {
    /// Register a probe. Names are mandatory and must be unique.
    pub fn probe(mut self, name: impl Into<String>, probe: impl Probe + 'static) -> Self {
        self.probes.push(NamedProbe { name: name.into(), probe: Arc::new(probe) });
        self
    }

    /// Register an already shared probe.
    pub fn shared_probe(mut self, name: impl Into<String>, probe: Arc<dyn Probe>) -> Self {
        self.probes.push(NamedProbe { name: name.into(), probe });
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Result<ProbeOrchestrator, OrchestratorError> {
        if self.timeout.is_zero() {
            return Err(OrchestratorError::ZeroTimeout);
        }
        let mut seen = HashSet::new();
        for named in &self.probes {
            if named.name.is_empty() {
                return Err(OrchestratorError::EmptyProbeName);
            }
            if !seen.insert(named.name.as_str()) {
                return Err(OrchestratorError::DuplicateProbe(named.name.clone()));
            }
        }
        Ok(ProbeOrchestrator {
            instance: self.instance,
            probes: self.probes,
            timeout: self.timeout,
            clock: self.clock,
        })
    }
}

fn seconds_between(start: DateTime<Utc>, finish: DateTime<Utc>) -> f64 {
    (finish - start).to_std().map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

impl ProbeOrchestrator {
    pub fn builder(instance: Instance) -> ProbeOrchestratorBuilder {
        ProbeOrchestratorBuilder {
            instance,
            probes: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            clock: clock::system(),
        }
    }

    pub fn probe_names(&self) -> impl Iterator<Item = &str> {
        self.probes.iter().map(|p| p.name.as_str())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run every probe once under a child of `ctx` bounded by the cycle timeout.
    ///
    /// Returns once every probe has finished or been abandoned. A probe that
    /// fails after the cycle's context has ended contributes neither an error
    /// nor a duration; successful probes always report `<name>_duration` in
    /// seconds, measured from that probe's own start.
    pub async fn run_once(&self, ctx: &RunContext) -> CheckResult {
        let ctx = ctx.with_timeout(self.timeout);
        let result = Arc::new(Mutex::new(CheckResult::new(self.clock.now(), &self.instance)));
        let mut units = JoinSet::new();

        for named in &self.probes {
            info!(check = %named.name, "check started");
            let name = named.name.clone();
            let probe = named.probe.clone();
            let clock = self.clock.clone();
            let ctx = ctx.clone();
            let result = result.clone();

            units.spawn(async move {
                let start = clock.now();
                let outcome = match ctx.run(probe.check(&ctx)).await {
                    Ok(outcome) => outcome,
                    Err(abandoned) => Err(abandoned.into()),
                };
                let finish = clock.now();
                let cancelled = ctx.err().is_some();
                let duration = seconds_between(start, finish);
                let error_text = outcome.as_ref().err().map(|e| format!("{e:#}"));
                debug!(check = %name, duration, error = error_text.as_deref(), "check finished");

                let mut acc = result.lock().await;
                match outcome {
                    // The cycle was cut short; the probe is not to blame.
                    Err(_) if cancelled => {}
                    Err(_) => acc.errors.push(CheckError::new(name, error_text.unwrap_or_default())),
                    Ok(measurements) => {
                        acc.measurements.extend(measurements);
                        acc.measurements.push(Measurement::new(format!("{name}_duration"), duration));
                    }
                }
            });
        }

        while let Some(joined) = units.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "check unit did not complete");
            }
        }

        match Arc::try_unwrap(result) {
            Ok(result) => result.into_inner(),
            Err(shared) => shared.lock().await.clone(),
        }
    }

    /// Run a cycle every `interval` until `ctx` ends, handing each complete
    /// result to `on_result`.
    ///
    /// Cycles overlap if one outlasts the interval. Results of cycles that
    /// were still running when `ctx` ended are discarded. Returns after every
    /// started cycle has finished.
    pub async fn run_periodic<F>(self: Arc<Self>, ctx: RunContext, interval: Duration, on_result: F)
    where
        F: Fn(CheckResult) + Send + Sync + 'static,
    {
        let on_result = Arc::new(on_result);
        let cycles = TaskTracker::new();
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ctx.done() => break,
                _ = ticker.tick() => {
                    let this = self.clone();
                    let ctx = ctx.clone();
                    let on_result = on_result.clone();
                    cycles.spawn(async move {
                        let result = this.run_once(&ctx).await;
                        if ctx.err().is_some() {
                            debug!("discarding result of interrupted cycle");
                            return;
                        }
                        on_result(result);
                    });
                }
            }
        }

        cycles.close();
        cycles.wait().await;
    }
}
