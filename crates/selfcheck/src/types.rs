//! Result and identity types shared by the orchestrator and the stores.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A failed probe, or a failed save attempt, recorded against a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckError {
    pub check: String,
    pub error: String,
}

impl CheckError {
    pub fn new(check: impl Into<String>, error: impl ToString) -> Self {
        Self { check: check.into(), error: error.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub check: String,
    pub value: f64,
}

impl Measurement {
    pub fn new(check: impl Into<String>, value: f64) -> Self {
        Self { check: check.into(), value }
    }
}

/// Aggregated outcome of one probe cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// When the cycle started
    pub timestamp: DateTime<Utc>,

    /// Instance that ran the cycle
    pub instance_id: Uuid,

    /// App the instance belongs to, if known
    pub app_id: Option<String>,

    pub errors: Vec<CheckError>,

    pub measurements: Vec<Measurement>,
}

impl CheckResult {
    pub fn new(timestamp: DateTime<Utc>, instance: &Instance) -> Self {
        Self {
            timestamp,
            instance_id: instance.uuid,
            app_id: instance.app_id.clone(),
            errors: Vec::new(),
            measurements: Vec::new(),
        }
    }

    /// Look up a measurement by check name.
    pub fn measurement(&self, check: &str) -> Option<f64> {
        self.measurements.iter().find(|m| m.check == check).map(|m| m.value)
    }

    pub fn has_error(&self, check: &str) -> bool {
        self.errors.iter().any(|e| e.check == check)
    }
}

/// Identity of the running process, persisted alongside its results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub uuid: Uuid,
    pub hostname: String,
    pub app_id: Option<String>,
    pub public_ipv4: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl Instance {
    /// Create a fresh instance identity for this process.
    pub fn new(hostname: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            hostname: hostname.into(),
            app_id: None,
            public_ipv4: None,
            labels: BTreeMap::new(),
            started_at,
            stopped_at: None,
        }
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }
}
