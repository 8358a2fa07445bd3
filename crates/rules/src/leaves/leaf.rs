//! A single check item: one condition over one or more metrics.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use vigil_core::{metric_name, parse_label_info, MetricData, Series, TimeRange};

use crate::error::ExpressionError;
use crate::expression::{compile, evaluate, max_time_filter, DataBackpack, EvalContext, Expr, FunctionTable};
use crate::preprocess::{GridPreprocessor, Preprocessor};

use super::merge::merge_by_method;

/// Macro of the primary data item.
pub const MAIN_DATA_MACRO: &str = "$0";

// ── Configuration ───────────────────────────────────────────────────

/// One metric referenced by a check item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataItem {
    /// Metric key as it appears in the input data, labels included.
    pub metric: String,
    /// `kpi` or `log`; anything else counts as `kpi`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Label merge method (`avg`, `sum`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl DataItem {
    pub fn kind(&self) -> DataKind {
        match self.kind.as_deref() {
            Some("log") => DataKind::Log,
            _ => DataKind::Kpi,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Kpi,
    Log,
}

/// A check item as written in a diagnosis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafConfig {
    pub check_item: String,
    pub data_list: Vec<DataItem>,
    pub condition: String,
    #[serde(default)]
    pub description: String,
}

/// Outcome of checking one leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeafVerdict {
    NoData,
    Normal,
    Abnormal,
    InternalError,
}

impl LeafVerdict {
    /// Numeric code: -1 no data, 0 normal, 1 abnormal, 2 internal error.
    pub fn code(self) -> i8 {
        match self {
            LeafVerdict::NoData => -1,
            LeafVerdict::Normal => 0,
            LeafVerdict::Abnormal => 1,
            LeafVerdict::InternalError => 2,
        }
    }
}

impl fmt::Display for LeafVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LeafVerdict::NoData => "no data",
            LeafVerdict::Normal => "normal",
            LeafVerdict::Abnormal => "abnormal",
            LeafVerdict::InternalError => "internal error",
        })
    }
}

// ── Calculator ──────────────────────────────────────────────────────

/// Compiled condition plus the function table it calls into.
#[derive(Debug, Clone)]
pub struct Calculator {
    condition: Expr,
    functions: Arc<FunctionTable>,
    time_shift: i64,
}

impl Calculator {
    pub fn new(condition: &str, functions: Arc<FunctionTable>) -> Result<Self, ExpressionError> {
        let condition = compile(condition)?;
        let time_shift = max_time_filter(&condition);
        Ok(Self {
            condition,
            functions,
            time_shift,
        })
    }

    pub fn time_shift(&self) -> i64 {
        self.time_shift
    }

    /// Evaluate the condition at `index` of `main_data_macro` and test truthiness.
    pub fn judge_condition(
        &self,
        main_data_macro: &str,
        index: usize,
        data_vector: &HashMap<String, Series>,
    ) -> Result<bool, ExpressionError> {
        let backpack = DataBackpack::new(main_data_macro, index, data_vector);
        let ctx = EvalContext::new(backpack, &self.functions);
        Ok(evaluate(&self.condition, &ctx)?.is_truthy())
    }
}

// ── Leaf ────────────────────────────────────────────────────────────

/// A compiled check item, read-only after construction.
#[derive(Debug, Clone)]
pub struct Leaf {
    pub name: String,
    pub data_list: Vec<DataItem>,
    pub condition: String,
    pub description: String,
    /// metric -> macro (`$0`, `$1`, ...), in data list order.
    pub data_name_map: IndexMap<String, String>,
    pub data_kind: DataKind,
    /// Seconds of history the condition looks back over.
    pub time_shift: i64,
    calculator: Calculator,
}

impl Leaf {
    pub fn new(config: &LeafConfig, functions: Arc<FunctionTable>) -> Result<Self, ExpressionError> {
        let mut data_name_map = IndexMap::new();
        for (index, item) in config.data_list.iter().enumerate() {
            data_name_map.insert(item.metric.clone(), format!("${index}"));
        }
        let data_kind = if config.data_list.iter().any(|d| d.kind() == DataKind::Log) {
            DataKind::Log
        } else {
            DataKind::Kpi
        };
        let calculator = Calculator::new(&config.condition, functions)?;

        Ok(Self {
            name: config.check_item.clone(),
            data_list: config.data_list.clone(),
            condition: config.condition.clone(),
            description: config.description.clone(),
            data_name_map,
            data_kind,
            time_shift: calculator.time_shift(),
            calculator,
        })
    }

    /// Metrics this leaf reads, in data list order.
    pub fn metrics(&self) -> Vec<String> {
        self.data_list.iter().map(|d| d.metric.clone()).collect()
    }

    /// Required data with the default grid preprocessor.
    pub fn get_required_data(
        &self,
        all_data: &MetricData,
        time_range: TimeRange,
        sample_period: i64,
    ) -> HashMap<String, Series> {
        self.get_required_data_with(all_data, time_range, sample_period, &GridPreprocessor)
    }

    /// Pick this leaf's metrics out of `all_data`, keyed by macro.
    ///
    /// The window starts `time_shift` seconds before `time_range.start`.
    /// Labelled series are merged by method, sliced to the window, then
    /// aligned (kpi) or deduplicated (log).
    pub fn get_required_data_with(
        &self,
        all_data: &MetricData,
        time_range: TimeRange,
        sample_period: i64,
        preprocessor: &dyn Preprocessor,
    ) -> HashMap<String, Series> {
        let window = time_range.extend_back(self.time_shift);
        let mut selected = HashMap::new();

        for (metric, data_macro) in &self.data_name_map {
            let Some(metric_data) = series_of(all_data, metric) else {
                selected.insert(data_macro.clone(), Vec::new());
                continue;
            };
            let method = self
                .data_list
                .iter()
                .rev()
                .find(|d| &d.metric == metric)
                .and_then(|d| d.method.as_deref());
            let merged = merge_by_method(&metric_data, method);
            let sliced = match find_start_index(&merged, window.start) {
                Some(start) => merged[start..].to_vec(),
                None => Vec::new(),
            };
            selected.insert(data_macro.clone(), sliced);
        }

        match self.data_kind {
            DataKind::Kpi => preprocessor.align(sample_period, window, selected),
            DataKind::Log => preprocessor.deduplicate(selected),
        }
    }

    /// Walk the primary series from `time_range.start`; the first index where
    /// the condition holds makes the leaf abnormal.
    pub fn do_check(&self, data: &HashMap<String, Series>, time_range: TimeRange) -> LeafVerdict {
        let Some(main) = data.get(MAIN_DATA_MACRO) else {
            return LeafVerdict::NoData;
        };
        let Some(start) = find_start_index(main, time_range.start) else {
            return LeafVerdict::NoData;
        };

        for index in start..main.len() {
            match self.calculator.judge_condition(MAIN_DATA_MACRO, index, data) {
                Ok(true) => return LeafVerdict::Abnormal,
                Ok(false) => continue,
                Err(e) => {
                    tracing::debug!(leaf = %self.name, index, error = %e, "leaf evaluation failed");
                    return LeafVerdict::InternalError;
                }
            }
        }
        LeafVerdict::Normal
    }
}

/// Series of `all_data` matching a data-list metric.
///
/// Data is grouped by bare metric name. A metric written with labels,
/// such as `cpu{mode="user"}`, keeps only the series carrying all of them.
fn series_of<'a>(all_data: &'a MetricData, metric: &str) -> Option<Cow<'a, BTreeMap<String, Series>>> {
    let group = all_data.get(metric_name(metric))?;
    let wanted = parse_label_info(metric);
    if wanted.is_empty() {
        return Some(Cow::Borrowed(group));
    }
    let matching: BTreeMap<String, Series> = group
        .iter()
        .filter(|(key, _)| {
            let labels = parse_label_info(key);
            wanted.iter().all(|(k, v)| labels.get(k) == Some(v))
        })
        .map(|(key, series)| (key.clone(), series.clone()))
        .collect();
    (!matching.is_empty()).then_some(Cow::Owned(matching))
}

/// Leftmost index whose timestamp is at or after `start`.
pub fn find_start_index(data: &Series, start: i64) -> Option<usize> {
    let index = data.partition_point(|s| s.ts() < start);
    (index < data.len()).then_some(index)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use vigil_core::Sample;

    use super::*;

    fn series(points: &[(i64, f64)]) -> Series {
        points.iter().map(|&(t, v)| Sample::new(t, v)).collect()
    }

    fn config(condition: &str, data_list: Vec<DataItem>) -> LeafConfig {
        LeafConfig {
            check_item: "item".into(),
            data_list,
            condition: condition.into(),
            description: String::new(),
        }
    }

    fn item(metric: &str, kind: Option<&str>, method: Option<&str>) -> DataItem {
        DataItem {
            metric: metric.into(),
            kind: kind.map(String::from),
            method: method.map(String::from),
        }
    }

    fn leaf(condition: &str) -> Leaf {
        Leaf::new(
            &config(condition, vec![item("m0", None, None), item("m1", None, None)]),
            Arc::new(FunctionTable::builtin()),
        )
        .unwrap()
    }

    #[test]
    fn find_start_index_examples() {
        let data = series(&[(10, 1.0), (20, 1.0), (30, 1.0)]);
        assert_eq!(find_start_index(&data, 15), Some(1));
        assert_eq!(find_start_index(&data, 35), None);
        assert_eq!(find_start_index(&data, 5), Some(0));
        assert_eq!(find_start_index(&data, 20), Some(1));
        assert_eq!(find_start_index(&Vec::new(), 0), None);
    }

    #[test]
    fn macros_follow_data_list_order() {
        let l = leaf("$0 > $1");
        assert_eq!(l.data_name_map["m0"], "$0");
        assert_eq!(l.data_name_map["m1"], "$1");
        assert_eq!(l.data_kind, DataKind::Kpi);
        assert_eq!(l.time_shift, 0);
    }

    #[test]
    fn time_shift_is_largest_filter() {
        assert_eq!(leaf("$0 + $1.max(50s) < 10 && $0.avg(2m) > 1").time_shift, 120);
    }

    #[test]
    fn any_log_item_makes_log_leaf() {
        let l = Leaf::new(
            &config("$0 > 1", vec![item("a", Some("kpi"), None), item("b", Some("log"), None)]),
            Arc::new(FunctionTable::builtin()),
        )
        .unwrap();
        assert_eq!(l.data_kind, DataKind::Log);
    }

    #[test]
    fn bad_condition_fails_to_build() {
        let result = Leaf::new(&config("$0 >", vec![]), Arc::new(FunctionTable::builtin()));
        assert!(matches!(result, Err(ExpressionError::Syntax { .. })));
    }

    #[test]
    fn always_true_leaf_is_abnormal() {
        let l = leaf("true");
        let data = HashMap::from([("$0".to_string(), series(&[(0, 1.0), (15, 1.0)]))]);
        assert_eq!(l.do_check(&data, TimeRange::new(0, 15)), LeafVerdict::Abnormal);
    }

    #[test]
    fn never_true_leaf_is_normal() {
        let l = leaf("$0 > 100");
        let data = HashMap::from([("$0".to_string(), series(&[(0, 1.0), (15, 1.0)]))]);
        assert_eq!(l.do_check(&data, TimeRange::new(0, 15)), LeafVerdict::Normal);
    }

    #[test]
    fn missing_primary_data_is_no_data() {
        let l = leaf("$0 > 1");
        assert_eq!(l.do_check(&HashMap::new(), TimeRange::new(0, 15)), LeafVerdict::NoData);

        let stale = HashMap::from([("$0".to_string(), series(&[(0, 1.0)]))]);
        assert_eq!(l.do_check(&stale, TimeRange::new(10, 20)), LeafVerdict::NoData);
    }

    #[test]
    fn evaluation_error_is_internal_error() {
        let l = leaf("$0 / 0");
        let data = HashMap::from([("$0".to_string(), series(&[(0, 1.0)]))]);
        assert_eq!(l.do_check(&data, TimeRange::new(0, 0)), LeafVerdict::InternalError);
        assert_eq!(LeafVerdict::InternalError.code(), 2);
    }

    #[test]
    fn check_starts_at_time_range_not_window() {
        // The spike at ts=0 is history for max(30s), not a checked index
        let l = leaf("$0 > 5");
        let data = HashMap::from([("$0".to_string(), series(&[(0, 9.0), (15, 1.0), (30, 1.0)]))]);
        assert_eq!(l.do_check(&data, TimeRange::new(15, 30)), LeafVerdict::Normal);
    }

    #[test]
    fn required_data_merges_slices_and_aligns() {
        let l = Leaf::new(
            &config(
                "$0.max(30s) > $1",
                vec![item("cpu", Some("kpi"), Some("avg")), item("mem", None, None)],
            ),
            Arc::new(FunctionTable::builtin()),
        )
        .unwrap();

        let mut all: MetricData = HashMap::new();
        all.insert(
            "cpu".into(),
            BTreeMap::from([
                ("cpu{c=\"0\"}".to_string(), series(&[(0, 1.0), (30, 2.0), (60, 3.0), (90, 4.0)])),
                ("cpu{c=\"1\"}".to_string(), series(&[(0, 3.0), (30, 4.0), (60, 5.0), (90, 6.0)])),
            ]),
        );

        // Window is [60 - 30, 90]; mem is missing entirely
        let data = l.get_required_data(&all, TimeRange::new(60, 90), 15);
        let cpu: Vec<(i64, f64)> = data["$0"]
            .iter()
            .map(|s| (s.ts(), s.value().as_f64().unwrap()))
            .collect();
        assert_eq!(cpu, vec![(30, 3.0), (45, 3.0), (60, 4.0), (75, 4.0), (90, 5.0)]);
        assert!(data["$1"].is_empty());
    }

    #[test]
    fn labelled_metric_selects_matching_series() {
        let l = Leaf::new(
            &config("$0 > 5", vec![item(r#"cpu{mode="user"}"#, None, None)]),
            Arc::new(FunctionTable::builtin()),
        )
        .unwrap();

        let mut all: MetricData = HashMap::new();
        all.insert(
            "cpu".into(),
            BTreeMap::from([
                (
                    r#"cpu{instance="10.0.0.1:9100",mode="user"}"#.to_string(),
                    series(&[(0, 10.0), (15, 10.0), (30, 10.0)]),
                ),
                (
                    r#"cpu{instance="10.0.0.1:9100",mode="idle"}"#.to_string(),
                    series(&[(0, 1.0), (15, 1.0), (30, 1.0)]),
                ),
            ]),
        );

        let range = TimeRange::new(0, 30);
        let data = l.get_required_data(&all, range, 15);
        assert_eq!(data["$0"].len(), 3);
        assert_eq!(data["$0"][0].value().as_f64(), Some(10.0));
        assert_eq!(l.do_check(&data, range), LeafVerdict::Abnormal);

        // No series carries the wanted label
        let steal = Leaf::new(
            &config("$0 > 5", vec![item(r#"cpu{mode="steal"}"#, None, None)]),
            Arc::new(FunctionTable::builtin()),
        )
        .unwrap();
        let data = steal.get_required_data(&all, range, 15);
        assert_eq!(steal.do_check(&data, range), LeafVerdict::NoData);
    }

    #[test]
    fn log_leaves_are_deduplicated() {
        let l = Leaf::new(
            &config("$0 == 'error'", vec![item("syslog", Some("log"), None)]),
            Arc::new(FunctionTable::builtin()),
        )
        .unwrap();
        let mut all: MetricData = HashMap::new();
        all.insert(
            "syslog".into(),
            BTreeMap::from([(
                "syslog".to_string(),
                vec![
                    Sample::new(10, "error"),
                    Sample::new(10, "error"),
                    Sample::new(20, "ok"),
                ],
            )]),
        );
        let data = l.get_required_data(&all, TimeRange::new(0, 30), 15);
        assert_eq!(data["$0"].len(), 2);
        assert_eq!(l.do_check(&data, TimeRange::new(0, 30)), LeafVerdict::Abnormal);
    }
}
