//! Per-tick check outcomes and where they go.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use vigil_core::TimeRange;

/// Why one host was reported abnormal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostFinding {
    pub model_id: String,
    /// Metrics behind the verdict, empty when the algorithm cannot tell.
    pub abnormal_metrics: Vec<String>,
}

/// Result of running one workflow over one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub workflow_id: String,
    pub time_range: TimeRange,
    pub checked_at: DateTime<Utc>,
    /// Hosts that produced a verdict.
    pub checked_hosts: usize,
    /// host_id -> finding.
    pub abnormal_hosts: BTreeMap<String, HostFinding>,
    /// host_id -> error message, for hosts that could not be checked.
    pub failed_hosts: BTreeMap<String, String>,
}

impl CheckOutcome {
    pub fn new(workflow_id: impl Into<String>, time_range: TimeRange) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            time_range,
            checked_at: Utc::now(),
            checked_hosts: 0,
            abnormal_hosts: BTreeMap::new(),
            failed_hosts: BTreeMap::new(),
        }
    }

    pub fn is_abnormal(&self) -> bool {
        !self.abnormal_hosts.is_empty()
    }
}

/// Receives every tick's outcome, e.g. to raise alerts.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn publish(&self, outcome: &CheckOutcome);
}

/// Sink that only writes abnormal outcomes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl ResultSink for LogSink {
    async fn publish(&self, outcome: &CheckOutcome) {
        for (host_id, error) in &outcome.failed_hosts {
            warn!(
                workflow_id = %outcome.workflow_id,
                host_id = %host_id,
                error = %error,
                "host check failed"
            );
        }
        for (host_id, finding) in &outcome.abnormal_hosts {
            info!(
                workflow_id = %outcome.workflow_id,
                host_id = %host_id,
                model_id = %finding.model_id,
                metrics = ?finding.abnormal_metrics,
                start = outcome.time_range.start,
                end = outcome.time_range.end,
                "host abnormal"
            );
        }
    }
}
