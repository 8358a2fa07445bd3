use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_core::config::CheckConfig;
use vigil_core::{TimeRange, VigilError};
use vigil_rules::AlgorithmError;

use crate::pipeline::SourceError;

/// Errors surfaced by the scheduler and the workflow runner.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Persistence or connectivity failure in the workflow store.
    #[error("workflow store error: {0}")]
    Store(VigilError),

    #[error("workflow not found: {0}")]
    NotFound(String),

    #[error("algorithm error: {0}")]
    Algorithm(#[from] AlgorithmError),

    #[error("metric source error: {0}")]
    Source(#[from] SourceError),
}

impl From<VigilError> for SchedulerError {
    fn from(e: VigilError) -> Self {
        match e {
            VigilError::WorkflowNotFound(id) => SchedulerError::NotFound(id),
            other => SchedulerError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Scheduler settings, usually derived from [`CheckConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Step used when a workflow's own step is zero.
    pub default_step: u64,
    /// Seconds the check window trails behind "now".
    pub time_offset: u64,
    /// How long `shutdown` waits for jobs to exit.
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&CheckConfig::default())
    }
}

impl From<&CheckConfig> for SchedulerConfig {
    fn from(check: &CheckConfig) -> Self {
        Self {
            default_step: check.default_step,
            time_offset: check.time_offset,
            shutdown_timeout: check.shutdown_timeout(),
        }
    }
}

impl SchedulerConfig {
    /// Effective step for a workflow, never zero.
    pub fn resolve_step(&self, step: u64) -> u64 {
        match step {
            0 if self.default_step > 0 => self.default_step,
            0 => 1,
            s => s,
        }
    }
}

/// Window checked by a tick at `now`: `[now - offset - step, now - offset]`.
pub fn check_window(now: i64, step: u64, offset: u64) -> TimeRange {
    let end = now - offset as i64;
    TimeRange::new(end - step as i64, end)
}

/// Snapshot of one scheduled job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInfo {
    pub workflow_id: String,
    pub username: String,
    pub step: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub ticks: u64,
    pub failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_trails_now_by_offset() {
        assert_eq!(check_window(1_000, 60, 0), TimeRange::new(940, 1_000));
        assert_eq!(check_window(1_000, 60, 30), TimeRange::new(910, 970));
    }

    #[test]
    fn zero_step_falls_back() {
        let config = SchedulerConfig::default();
        assert_eq!(config.resolve_step(0), 60);
        assert_eq!(config.resolve_step(15), 15);

        let config = SchedulerConfig {
            default_step: 0,
            ..SchedulerConfig::default()
        };
        assert_eq!(config.resolve_step(0), 1);
    }

    #[test]
    fn not_found_store_error_maps_to_not_found() {
        let err: SchedulerError = VigilError::WorkflowNotFound("wf".into()).into();
        assert!(matches!(err, SchedulerError::NotFound(id) if id == "wf"));

        let err: SchedulerError = VigilError::Storage("disk full".into()).into();
        assert!(matches!(err, SchedulerError::Store(_)));
    }

    #[test]
    fn defaults_follow_check_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.time_offset, 0);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
    }
}
