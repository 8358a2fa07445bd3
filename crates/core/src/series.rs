//! Time-series primitives shared by the rule engine and the check pipeline.
//!
//! A [`Series`] is an ordered list of `[timestamp, value]` samples. Values are
//! usually numbers, but metric sources may hand back strings (Prometheus
//! encodes every sample value as a string), so [`SampleValue`] keeps both.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// One sample value: numeric or free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Number(f64),
    Text(String),
}

impl SampleValue {
    /// Numeric view of the value. Numeric strings are parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SampleValue::Number(n) => Some(*n),
            SampleValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl From<f64> for SampleValue {
    fn from(v: f64) -> Self {
        SampleValue::Number(v)
    }
}

impl From<i64> for SampleValue {
    fn from(v: i64) -> Self {
        SampleValue::Number(v as f64)
    }
}

impl From<&str> for SampleValue {
    fn from(v: &str) -> Self {
        SampleValue::Text(v.to_string())
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleValue::Number(n) => write!(f, "{n}"),
            SampleValue::Text(s) => f.write_str(s),
        }
    }
}

/// A `(timestamp seconds, value)` pair, serialized as a two-element array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample(pub i64, pub SampleValue);

impl Sample {
    pub fn new(ts: i64, value: impl Into<SampleValue>) -> Self {
        Sample(ts, value.into())
    }

    pub fn ts(&self) -> i64 {
        self.0
    }

    pub fn value(&self) -> &SampleValue {
        &self.1
    }
}

/// Samples ordered by timestamp.
pub type Series = Vec<Sample>;

/// Metric name -> `metric{labels}` -> series.
pub type MetricData = HashMap<String, BTreeMap<String, Series>>;

/// Closed time interval in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Same interval with its start pulled back by `seconds`.
    pub fn extend_back(&self, seconds: i64) -> Self {
        Self {
            start: self.start - seconds,
            end: self.end,
        }
    }

    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Split `metric{a="x",b="y"}` into its label map.
///
/// Keys without braces yield an empty map. Label values keep everything
/// between the quotes.
pub fn parse_label_info(key: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    let Some(open) = key.find('{') else {
        return labels;
    };
    let body = key[open + 1..].trim_end_matches('}');

    let mut rest = body;
    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let name = rest[..eq].trim().trim_start_matches(',').trim();
        let after = rest[eq + 1..].trim_start();
        let (value, tail) = match after.strip_prefix('"') {
            Some(quoted) => match quoted.find('"') {
                Some(close) => (&quoted[..close], &quoted[close + 1..]),
                None => (quoted, ""),
            },
            None => match after.find(',') {
                Some(comma) => (&after[..comma], &after[comma..]),
                None => (after, ""),
            },
        };
        if !name.is_empty() {
            labels.insert(name.to_string(), value.to_string());
        }
        rest = tail.trim_start_matches(',').trim_start();
    }
    labels
}

/// Bare metric name of a `metric{labels}` key.
pub fn metric_name(key: &str) -> &str {
    key.split('{').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_serializes_as_pair() {
        let s = Sample::new(10, 1.5);
        assert_eq!(serde_json::to_string(&s).unwrap(), "[10,1.5]");

        let parsed: Sample = serde_json::from_str(r#"[20, "3.25"]"#).unwrap();
        assert_eq!(parsed.ts(), 20);
        assert_eq!(parsed.value().as_f64(), Some(3.25));
    }

    #[test]
    fn text_value_without_number_has_no_numeric_view() {
        assert_eq!(SampleValue::from("oops").as_f64(), None);
    }

    #[test]
    fn label_info_parses_pairs() {
        let labels = parse_label_info(r#"cpu_usage{instance="10.0.0.1:9100",mode="idle"}"#);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["instance"], "10.0.0.1:9100");
        assert_eq!(labels["mode"], "idle");
    }

    #[test]
    fn label_info_without_braces_is_empty() {
        assert!(parse_label_info("cpu_usage").is_empty());
        assert!(parse_label_info("cpu_usage{}").is_empty());
    }

    #[test]
    fn metric_name_strips_labels() {
        assert_eq!(metric_name(r#"mem{host="a"}"#), "mem");
        assert_eq!(metric_name("mem"), "mem");
    }

    #[test]
    fn extend_back_moves_start_only() {
        let r = TimeRange::new(100, 200).extend_back(30);
        assert_eq!(r, TimeRange::new(70, 200));
        assert!(r.contains(70));
        assert!(!r.contains(201));
    }
}
