//! Algorithm plugin interface.
//!
//! An algorithm is loaded from a model configuration file, declares which
//! metrics it needs (and how far back), and turns fetched metric data into
//! a verdict.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use vigil_core::{MetricData, TimeRange};

use crate::error::RuleError;

/// Errors raised by algorithm plugins.
#[derive(Debug, thiserror::Error)]
pub enum AlgorithmError {
    #[error("rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `calculate` called before a successful `load`.
    #[error("algorithm `{0}` has no model loaded")]
    NotLoaded(String),

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("calculation failed: {0}")]
    Calculation(String),
}

/// Static description of an algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmInfo {
    pub name: String,
    pub field: String,
    pub description: String,
}

/// What `calculate` produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmOutput {
    /// Abnormal (true) or normal (false).
    Verdict(bool),
    /// Per-sample labels; any non-zero label is abnormal.
    Labels(Vec<i64>),
}

impl AlgorithmOutput {
    pub fn is_abnormal(&self) -> bool {
        match self {
            AlgorithmOutput::Verdict(v) => *v,
            AlgorithmOutput::Labels(labels) => labels.iter().any(|l| *l != 0),
        }
    }
}

/// `calculate` output plus the metrics that explain it, when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub output: AlgorithmOutput,
    pub abnormal_metrics: Vec<String>,
}

pub trait Algorithm: Send + Sync {
    fn info(&self) -> AlgorithmInfo;

    /// Load model configuration from `path`, replacing any previous model.
    fn load(&mut self, path: &Path) -> Result<(), AlgorithmError>;

    /// Metric -> seconds of history needed before the check window.
    fn input_data(&self) -> HashMap<String, i64>;

    fn calculate(
        &self,
        data: &MetricData,
        time_range: TimeRange,
    ) -> Result<AlgorithmOutput, AlgorithmError>;

    /// Like `calculate`, also naming the metrics behind an abnormal result.
    fn check(&self, data: &MetricData, time_range: TimeRange) -> Result<CheckReport, AlgorithmError> {
        Ok(CheckReport {
            output: self.calculate(data, time_range)?,
            abnormal_metrics: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_abnormal_when_any_non_zero() {
        assert!(!AlgorithmOutput::Labels(vec![0, 0]).is_abnormal());
        assert!(AlgorithmOutput::Labels(vec![0, 1]).is_abnormal());
        assert!(AlgorithmOutput::Verdict(true).is_abnormal());
    }
}
