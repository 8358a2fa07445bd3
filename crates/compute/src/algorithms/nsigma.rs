//! N-sigma outlier check over aggregated metrics.
//!
//! Each metric's labelled series are summed into one series. The mean and
//! standard deviation come from its first `train_length` points; a point
//! scores above zero when it leaves the `mean ± n·σ` band.
//!
//! Metrics are grouped into rules. A rule fuses the verdicts of its related
//! metrics (union or intersection of flagged timestamps) and the host is
//! abnormal when any rule fires inside the check window. A model without
//! rules checks every metric on its own.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use vigil_core::{MetricData, Series, TimeRange};
use vigil_rules::{Algorithm, AlgorithmError, AlgorithmInfo, AlgorithmOutput, CheckReport};

use super::aggregate::aggregate;
use super::filter::{fix_result, median_filter, normalize, MEDIAN_WINDOW};

pub const NSIGMA_ALGORITHM: &str = "nsigma";

const BAND_EPSILON: f64 = 1e-5;
const SIGMA_EPSILON: f64 = 1e-3;

/// Which labels of a metric take part in the check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricRule {
    #[serde(default)]
    pub filter_rule: BTreeMap<String, String>,
}

/// Transformation applied to an aggregated series before scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preprocess {
    #[default]
    None,
    /// Min-max normalize, then distance from the rolling median.
    Normal,
}

/// Per-metric settings inside a rule. Unset values fall back to the model's.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricCheck {
    #[serde(default)]
    pub preprocess: Preprocess,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_length: Option<usize>,
}

/// How the flagged timestamps of a rule's metrics combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionStrategy {
    /// Any metric flagged.
    #[default]
    Union,
    /// Every metric with data flagged at the same timestamp.
    Intersection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub related_metrics: BTreeMap<String, MetricCheck>,
    #[serde(default)]
    pub fusion_strategy: FusionStrategy,
    /// Ignore outliers without a flagged neighbour.
    #[serde(default)]
    pub fix_result: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NSigmaConfig {
    pub metrics: BTreeMap<String, MetricRule>,
    #[serde(default = "default_n")]
    pub n: f64,
    #[serde(default = "default_train_length")]
    pub train_length: usize,
    /// Seconds of history fetched before the check window.
    #[serde(default)]
    pub look_back: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rules: BTreeMap<String, RuleGroup>,
}

fn default_n() -> f64 {
    3.0
}

fn default_train_length() -> usize {
    20
}

fn check_params(n: f64, train_length: usize) -> Result<(), AlgorithmError> {
    if !n.is_finite() || n < 0.0 {
        return Err(AlgorithmError::InvalidModel(format!("invalid n: {n}")));
    }
    if train_length == 0 {
        return Err(AlgorithmError::InvalidModel("train_length must be positive".into()));
    }
    Ok(())
}

impl NSigmaConfig {
    fn validate(&self) -> Result<(), AlgorithmError> {
        if self.metrics.is_empty() {
            return Err(AlgorithmError::InvalidModel("nsigma model lists no metrics".into()));
        }
        check_params(self.n, self.train_length)?;
        if self.look_back < 0 {
            return Err(AlgorithmError::InvalidModel("look_back must not be negative".into()));
        }
        for (name, rule) in &self.rules {
            if rule.related_metrics.is_empty() {
                return Err(AlgorithmError::InvalidModel(format!("rule `{name}` has no related metrics")));
            }
            for (metric, check) in &rule.related_metrics {
                if !self.metrics.contains_key(metric) {
                    return Err(AlgorithmError::InvalidModel(format!(
                        "rule `{name}` refers to unlisted metric `{metric}`"
                    )));
                }
                check_params(
                    check.n.unwrap_or(self.n),
                    check.train_length.unwrap_or(self.train_length),
                )?;
            }
        }
        Ok(())
    }

    /// Configured rules, or one single-metric rule per metric.
    pub fn rule_groups(&self) -> Cow<'_, BTreeMap<String, RuleGroup>> {
        if !self.rules.is_empty() {
            return Cow::Borrowed(&self.rules);
        }
        Cow::Owned(
            self.metrics
                .keys()
                .map(|metric| {
                    let rule = RuleGroup {
                        related_metrics: BTreeMap::from([(metric.clone(), MetricCheck::default())]),
                        ..RuleGroup::default()
                    };
                    (metric.clone(), rule)
                })
                .collect(),
        )
    }
}

/// Outlier score of every value against the band learned from the leading
/// `train_length` values. NaN values are left out of the band and score 0.
pub fn nsigma_scores(values: &[f64], n: f64, train_length: usize) -> Vec<f64> {
    let train: Vec<f64> = values[..train_length.min(values.len())]
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    if train.is_empty() {
        return vec![0.0; values.len()];
    }
    let count = train.len() as f64;
    let mean = train.iter().sum::<f64>() / count;
    let variance = train.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
    let std = variance.sqrt();

    let up = mean + n * std + BAND_EPSILON;
    let down = mean - n * std - BAND_EPSILON;
    let scale = std + SIGMA_EPSILON;

    values
        .iter()
        .map(|x| {
            if x.is_nan() {
                0.0
            } else {
                ((x - up) / scale).max(0.0) + ((down - x) / scale).max(0.0)
            }
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct NSigma {
    config: Option<NSigmaConfig>,
}

impl NSigma {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: NSigmaConfig) -> Result<Self, AlgorithmError> {
        config.validate()?;
        Ok(Self {
            config: Some(config),
        })
    }

    pub fn config(&self) -> Option<&NSigmaConfig> {
        self.config.as_ref()
    }

    /// Timestamps inside `time_range` where one metric is flagged.
    fn flagged(
        config: &NSigmaConfig,
        series: &Series,
        check: &MetricCheck,
        fix: bool,
        time_range: TimeRange,
    ) -> BTreeSet<i64> {
        let values: Vec<f64> = series
            .iter()
            .map(|s| s.value().as_f64().unwrap_or(f64::NAN))
            .collect();
        let values = match check.preprocess {
            Preprocess::None => values,
            Preprocess::Normal => median_filter(&normalize(&values), MEDIAN_WINDOW),
        };
        let scores = nsigma_scores(
            &values,
            check.n.unwrap_or(config.n),
            check.train_length.unwrap_or(config.train_length),
        );
        let mut flags: Vec<bool> = scores.iter().map(|s| *s > 0.0).collect();
        if fix {
            flags = fix_result(&flags);
        }
        series
            .iter()
            .zip(flags)
            .filter(|(sample, flag)| *flag && time_range.contains(sample.ts()))
            .map(|(sample, _)| sample.ts())
            .collect()
    }

    /// Metrics behind every rule that fires inside `time_range`.
    fn abnormal_metrics(
        &self,
        data: &MetricData,
        time_range: TimeRange,
    ) -> Result<Vec<String>, AlgorithmError> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| AlgorithmError::NotLoaded(NSIGMA_ALGORITHM.to_string()))?;

        let mut aggregated: BTreeMap<&str, Series> = BTreeMap::new();
        for (metric, rule) in &config.metrics {
            let Some(labelled) = data.get(metric) else {
                debug!(metric = %metric, "no data for nsigma metric");
                continue;
            };
            let series = aggregate(labelled, &rule.filter_rule);
            if !series.is_empty() {
                aggregated.insert(metric.as_str(), series);
            }
        }

        let mut abnormal: Vec<String> = Vec::new();
        for (name, rule) in config.rule_groups().iter() {
            let flagged: BTreeMap<&str, BTreeSet<i64>> = rule
                .related_metrics
                .iter()
                .filter_map(|(metric, check)| {
                    let series = aggregated.get(metric.as_str())?;
                    let hits = Self::flagged(config, series, check, rule.fix_result, time_range);
                    Some((metric.as_str(), hits))
                })
                .collect();
            if flagged.is_empty() {
                continue;
            }

            let fired = match rule.fusion_strategy {
                FusionStrategy::Union => flagged.values().any(|hits| !hits.is_empty()),
                FusionStrategy::Intersection => flagged.values().next().is_some_and(|first| {
                    first
                        .iter()
                        .any(|ts| flagged.values().all(|hits| hits.contains(ts)))
                }),
            };
            if !fired {
                continue;
            }
            debug!(rule = %name, "nsigma rule fired");
            for (metric, hits) in &flagged {
                if !hits.is_empty() && !abnormal.iter().any(|m| m.as_str() == *metric) {
                    abnormal.push(metric.to_string());
                }
            }
        }
        Ok(abnormal)
    }
}

impl Algorithm for NSigma {
    fn info(&self) -> AlgorithmInfo {
        AlgorithmInfo {
            name: NSIGMA_ALGORITHM.to_string(),
            field: "multicheck".to_string(),
            description: "N-sigma outlier check over aggregated metrics.".to_string(),
        }
    }

    fn load(&mut self, path: &Path) -> Result<(), AlgorithmError> {
        let text = fs::read_to_string(path)?;
        let config: NSigmaConfig = serde_json::from_str(&text)?;
        config.validate()?;
        self.config = Some(config);
        Ok(())
    }

    fn input_data(&self) -> HashMap<String, i64> {
        self.config
            .as_ref()
            .map(|c| {
                c.metrics
                    .keys()
                    .map(|m| (m.clone(), c.look_back))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn calculate(
        &self,
        data: &MetricData,
        time_range: TimeRange,
    ) -> Result<AlgorithmOutput, AlgorithmError> {
        let abnormal = self.abnormal_metrics(data, time_range)?;
        Ok(AlgorithmOutput::Verdict(!abnormal.is_empty()))
    }

    fn check(&self, data: &MetricData, time_range: TimeRange) -> Result<CheckReport, AlgorithmError> {
        let abnormal_metrics = self.abnormal_metrics(data, time_range)?;
        Ok(CheckReport {
            output: AlgorithmOutput::Verdict(!abnormal_metrics.is_empty()),
            abnormal_metrics,
        })
    }
}
