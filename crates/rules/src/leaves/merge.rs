//! Combining the labelled series of one metric into a single series.

use std::collections::BTreeMap;

use vigil_core::{Sample, Series};

/// How multiple labelled series of one metric are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMethod {
    /// Per-timestamp mean, rounded to 3 decimals.
    Avg,
    /// Per-timestamp sum.
    Sum,
}

impl MergeMethod {
    /// Parse a configured method name. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "avg" => Some(MergeMethod::Avg),
            "sum" => Some(MergeMethod::Sum),
            _ => None,
        }
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Merge a metric's labelled series into one series.
///
/// Without a method the single series is returned as is; more than one
/// series (or an unknown method) yields an empty series. Non-numeric samples
/// are skipped when merging.
pub fn merge_by_method(metric_data: &BTreeMap<String, Series>, method: Option<&str>) -> Series {
    let Some(method) = method.filter(|m| !m.is_empty()) else {
        return if metric_data.len() == 1 {
            metric_data.values().next().cloned().unwrap_or_default()
        } else {
            Vec::new()
        };
    };

    let Some(method) = MergeMethod::parse(method) else {
        return Vec::new();
    };

    let mut by_ts: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for series in metric_data.values() {
        for sample in series {
            if let Some(v) = sample.value().as_f64() {
                by_ts.entry(sample.ts()).or_default().push(v);
            }
        }
    }

    by_ts
        .into_iter()
        .map(|(ts, values)| {
            let total: f64 = values.iter().sum();
            let merged = match method {
                MergeMethod::Avg => round3(total / values.len() as f64),
                MergeMethod::Sum => total,
            };
            Sample::new(ts, merged)
        })
        .collect()
}
