//! [`LeavesManager`] — owns every leaf of one diagnosis configuration.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use vigil_core::{MetricData, TimeRange};

use crate::error::ExpressionError;
use crate::expression::FunctionTable;
use crate::preprocess::{GridPreprocessor, Preprocessor};

use super::leaf::{Leaf, LeafConfig, LeafVerdict};

/// Leaf names grouped by non-normal verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub abnormal: BTreeSet<String>,
    pub no_data: BTreeSet<String>,
    pub internal_error: BTreeSet<String>,
}

/// A check item that was dropped at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedLeaf {
    pub name: String,
    pub error: ExpressionError,
}

/// Compiled leaves plus the per-metric look-back they need.
pub struct LeavesManager {
    leaves_cache: IndexMap<String, Leaf>,
    all_data_time_shift: HashMap<String, i64>,
    rejected: Vec<RejectedLeaf>,
    preprocessor: Arc<dyn Preprocessor>,
}

impl LeavesManager {
    /// Build with the built-in function table and grid preprocessor.
    pub fn new(leaves: &[LeafConfig]) -> Self {
        Self::with_parts(
            leaves,
            Arc::new(FunctionTable::builtin()),
            Arc::new(GridPreprocessor),
        )
    }

    pub fn with_parts(
        leaves: &[LeafConfig],
        functions: Arc<FunctionTable>,
        preprocessor: Arc<dyn Preprocessor>,
    ) -> Self {
        let mut manager = Self {
            leaves_cache: IndexMap::new(),
            all_data_time_shift: HashMap::new(),
            rejected: Vec::new(),
            preprocessor,
        };
        manager.init_leaves(leaves, functions);
        manager
    }

    fn init_leaves(&mut self, leaves: &[LeafConfig], functions: Arc<FunctionTable>) {
        for config in leaves {
            let leaf = match Leaf::new(config, Arc::clone(&functions)) {
                Ok(leaf) => leaf,
                Err(e) => {
                    error!(
                        leaf = %config.check_item,
                        condition = %config.condition,
                        error = %e,
                        "skipping check item with invalid condition"
                    );
                    self.rejected.push(RejectedLeaf {
                        name: config.check_item.clone(),
                        error: e,
                    });
                    continue;
                }
            };

            for metric in leaf.data_name_map.keys() {
                let shift = self.all_data_time_shift.entry(metric.clone()).or_insert(0);
                *shift = (*shift).max(leaf.time_shift);
            }

            if self.leaves_cache.contains_key(&leaf.name) {
                warn!(leaf = %leaf.name, "duplicate check item, later definition wins");
            }
            self.leaves_cache.insert(leaf.name.clone(), leaf);
        }
    }

    /// Run every leaf independently and group the non-normal ones.
    ///
    /// Also returns, for each abnormal leaf, the metrics it reads.
    pub fn do_check(
        &self,
        data: &MetricData,
        time_range: TimeRange,
        sample_period: i64,
    ) -> (CheckResult, HashMap<String, Vec<String>>) {
        let leaves: Vec<&Leaf> = self.leaves_cache.values().collect();
        let verdicts: Vec<(&Leaf, LeafVerdict)> = leaves
            .par_iter()
            .map(|leaf| {
                let leaf_data = leaf.get_required_data_with(
                    data,
                    time_range,
                    sample_period,
                    self.preprocessor.as_ref(),
                );
                (*leaf, leaf.do_check(&leaf_data, time_range))
            })
            .collect();

        let mut result = CheckResult::default();
        let mut abnormal_leaf_metric = HashMap::new();
        for (leaf, verdict) in verdicts {
            debug!(leaf = %leaf.name, verdict = %verdict, "leaf checked");
            match verdict {
                LeafVerdict::Normal => {}
                LeafVerdict::NoData => {
                    result.no_data.insert(leaf.name.clone());
                }
                LeafVerdict::Abnormal => {
                    result.abnormal.insert(leaf.name.clone());
                    abnormal_leaf_metric.insert(leaf.name.clone(), leaf.metrics());
                }
                LeafVerdict::InternalError => {
                    result.internal_error.insert(leaf.name.clone());
                }
            }
        }
        (result, abnormal_leaf_metric)
    }

    /// Largest look-back per metric across all leaves.
    pub fn all_data_time_shift(&self) -> &HashMap<String, i64> {
        &self.all_data_time_shift
    }

    pub fn get(&self, name: &str) -> Option<&Leaf> {
        self.leaves_cache.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.leaves_cache.contains_key(name)
    }

    pub fn leaf_names(&self) -> impl Iterator<Item = &str> {
        self.leaves_cache.keys().map(String::as_str)
    }

    /// Check items dropped because their condition failed to compile.
    pub fn rejected(&self) -> &[RejectedLeaf] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.leaves_cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves_cache.is_empty()
    }
}
