//! Tree-based diagnosis algorithm built on expert-authored check items.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vigil_core::{MetricData, TimeRange};

use crate::algorithm::{Algorithm, AlgorithmError, AlgorithmInfo, AlgorithmOutput, CheckReport};
use crate::error::{Result, RuleError};
use crate::expression::FunctionTable;
use crate::leaves::{CheckResult, LeafConfig, LeavesManager};
use crate::preprocess::{GridPreprocessor, Preprocessor};
use crate::tree::{DiagTree, Diagnosis, NodeConfig};

pub const DIAG_TREE_ALGORITHM: &str = "diag_tree";

/// Contents of a diagnosis configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnoseConfig {
    pub tree: NodeConfig,
    pub leaves: Vec<LeafConfig>,
}

impl DiagnoseConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a configuration file. Every failure is a `ParseConfig` error.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            RuleError::ParseConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&text).map_err(|e| {
            RuleError::ParseConfig(format!("invalid diagnosis config {}: {e}", path.display()))
        })
    }
}

/// A loaded tree together with the leaves it combines.
pub struct DiagnosisModel {
    pub tree: DiagTree,
    pub leaves_manager: LeavesManager,
}

/// Build tree and leaves from a configuration.
pub fn parse_config(
    config: &DiagnoseConfig,
    functions: Arc<FunctionTable>,
    preprocessor: Arc<dyn Preprocessor>,
) -> Result<DiagnosisModel> {
    let leaves_manager = LeavesManager::with_parts(&config.leaves, functions, preprocessor);
    let tree = DiagTree::from_config(&config.tree, leaves_manager.leaf_names()).map_err(|e| match e {
        RuleError::Tree(msg) => RuleError::ParseConfig(format!("invalid diagnosis tree: {msg}")),
        other => other,
    })?;
    Ok(DiagnosisModel {
        tree,
        leaves_manager,
    })
}

/// Full result of one diagnosis run.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnoseOutcome {
    pub leaves: CheckResult,
    pub abnormal_leaf_metric: HashMap<String, Vec<String>>,
    pub diagnosis: Diagnosis,
}

/// Diagnosis-tree algorithm: leaves produce verdicts, the tree combines them.
pub struct Diagnose {
    sample_period: i64,
    functions: Arc<FunctionTable>,
    preprocessor: Arc<dyn Preprocessor>,
    model: Option<DiagnosisModel>,
}

impl Diagnose {
    pub fn new(sample_period: i64) -> Self {
        Self::with_parts(
            sample_period,
            Arc::new(FunctionTable::builtin()),
            Arc::new(GridPreprocessor),
        )
    }

    pub fn with_parts(
        sample_period: i64,
        functions: Arc<FunctionTable>,
        preprocessor: Arc<dyn Preprocessor>,
    ) -> Self {
        Self {
            sample_period,
            functions,
            preprocessor,
            model: None,
        }
    }

    /// Install an already parsed configuration.
    pub fn load_config(&mut self, config: &DiagnoseConfig) -> Result<()> {
        let model = parse_config(
            config,
            Arc::clone(&self.functions),
            Arc::clone(&self.preprocessor),
        )?;
        info!(
            leaves = model.leaves_manager.len(),
            rejected = model.leaves_manager.rejected().len(),
            "diagnosis model loaded"
        );
        self.model = Some(model);
        Ok(())
    }

    pub fn model(&self) -> Option<&DiagnosisModel> {
        self.model.as_ref()
    }

    /// Run every leaf and the tree, keeping all intermediate results.
    pub fn diagnose(
        &self,
        data: &MetricData,
        time_range: TimeRange,
    ) -> std::result::Result<DiagnoseOutcome, AlgorithmError> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| AlgorithmError::NotLoaded(DIAG_TREE_ALGORITHM.to_string()))?;
        let (leaves, abnormal_leaf_metric) =
            model
                .leaves_manager
                .do_check(data, time_range, self.sample_period);
        debug!(
            abnormal = leaves.abnormal.len(),
            no_data = leaves.no_data.len(),
            internal_error = leaves.internal_error.len(),
            "leaves checked"
        );
        let diagnosis = model.tree.diagnose(&leaves.abnormal);
        Ok(DiagnoseOutcome {
            leaves,
            abnormal_leaf_metric,
            diagnosis,
        })
    }
}

impl Algorithm for Diagnose {
    fn info(&self) -> AlgorithmInfo {
        AlgorithmInfo {
            name: DIAG_TREE_ALGORITHM.to_string(),
            field: "multicheck".to_string(),
            description: "Diagnosis tree over expert-authored check items.".to_string(),
        }
    }

    fn load(&mut self, path: &Path) -> std::result::Result<(), AlgorithmError> {
        let config = DiagnoseConfig::from_path(path)?;
        self.load_config(&config)?;
        Ok(())
    }

    fn input_data(&self) -> HashMap<String, i64> {
        self.model
            .as_ref()
            .map(|m| m.leaves_manager.all_data_time_shift().clone())
            .unwrap_or_default()
    }

    fn calculate(
        &self,
        data: &MetricData,
        time_range: TimeRange,
    ) -> std::result::Result<AlgorithmOutput, AlgorithmError> {
        let outcome = self.diagnose(data, time_range)?;
        Ok(AlgorithmOutput::Verdict(outcome.diagnosis.root))
    }

    fn check(
        &self,
        data: &MetricData,
        time_range: TimeRange,
    ) -> std::result::Result<CheckReport, AlgorithmError> {
        let outcome = self.diagnose(data, time_range)?;
        let mut abnormal_metrics: Vec<String> = Vec::new();
        if outcome.diagnosis.root {
            for leaf in &outcome.leaves.abnormal {
                for metric in outcome.abnormal_leaf_metric.get(leaf).into_iter().flatten() {
                    if !abnormal_metrics.contains(metric) {
                        abnormal_metrics.push(metric.clone());
                    }
                }
            }
        }
        Ok(CheckReport {
            output: AlgorithmOutput::Verdict(outcome.diagnosis.root),
            abnormal_metrics,
        })
    }
}
