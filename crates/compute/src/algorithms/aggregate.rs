//! Collapse the labelled series of one metric into a single series.

use std::collections::{BTreeMap, BTreeSet};

use vigil_core::{parse_label_info, Sample, Series};

/// True when every `filter_rule` label is present on `key` with the same value.
pub fn matches_filter(key: &str, filter_rule: &BTreeMap<String, String>) -> bool {
    if filter_rule.is_empty() {
        return true;
    }
    let labels = parse_label_info(key);
    filter_rule
        .iter()
        .all(|(name, value)| labels.get(name) == Some(value))
}

/// Sum the matching series per timestamp.
///
/// Timestamps are the union over all kept series. Each series is forward
/// filled onto that union; a series contributes nothing before its first
/// numeric sample. NaN counts as missing and is filled over. Series with no
/// numeric sample are dropped, and an empty result means nothing matched.
pub fn aggregate(labelled: &BTreeMap<String, Series>, filter_rule: &BTreeMap<String, String>) -> Series {
    let numeric = |series: &Series| -> Vec<(i64, f64)> {
        series
            .iter()
            .filter_map(|s| s.value().as_f64().map(|v| (s.ts(), v)))
            .collect()
    };
    let kept: Vec<Vec<(i64, f64)>> = labelled
        .iter()
        .filter(|(key, _)| matches_filter(key, filter_rule))
        .map(|(_, series)| numeric(series))
        .filter(|points| !points.is_empty())
        .collect();

    if kept.is_empty() {
        return Vec::new();
    }

    let timestamps: BTreeSet<i64> = kept.iter().flatten().map(|(ts, _)| *ts).collect();
    let mut totals = vec![0.0; timestamps.len()];

    for points in &kept {
        let mut cursor = 0;
        let mut last: Option<f64> = None;
        for (slot, ts) in timestamps.iter().enumerate() {
            while cursor < points.len() && points[cursor].0 <= *ts {
                let value = points[cursor].1;
                if !value.is_nan() {
                    last = Some(value);
                }
                cursor += 1;
            }
            if let Some(v) = last {
                totals[slot] += v;
            }
        }
    }

    timestamps
        .into_iter()
        .zip(totals)
        .map(|(ts, v)| Sample::new(ts, v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(points: &[(i64, f64)]) -> Series {
        points.iter().map(|(ts, v)| Sample::new(*ts, *v)).collect()
    }

    fn values(series: &Series) -> Vec<(i64, f64)> {
        series
            .iter()
            .map(|s| (s.ts(), s.value().as_f64().unwrap()))
            .collect()
    }

    #[test]
    fn filter_requires_every_label() {
        let rule = BTreeMap::from([
            ("mode".to_string(), "user".to_string()),
            ("cpu".to_string(), "0".to_string()),
        ]);
        assert!(matches_filter(r#"cpu_seconds{cpu="0",mode="user"}"#, &rule));
        assert!(!matches_filter(r#"cpu_seconds{cpu="1",mode="user"}"#, &rule));
        assert!(!matches_filter("cpu_seconds", &rule));
        assert!(matches_filter("cpu_seconds", &BTreeMap::new()));
    }

    #[test]
    fn sums_with_forward_fill() {
        let labelled = BTreeMap::from([
            (
                r#"m{mode="user",cpu="0"}"#.to_string(),
                series(&[(0, 2.0), (15, 3.0), (30, 4.0)]),
            ),
            (
                r#"m{mode="user",cpu="1"}"#.to_string(),
                series(&[(0, 3.0), (15, 4.0), (30, 5.0), (45, 6.0)]),
            ),
            (r#"m{mode="user",cpu="2"}"#.to_string(), Vec::new()),
        ]);
        let rule = BTreeMap::from([("mode".to_string(), "user".to_string())]);
        assert_eq!(
            values(&aggregate(&labelled, &rule)),
            vec![(0, 5.0), (15, 7.0), (30, 9.0), (45, 10.0)]
        );
    }

    #[test]
    fn late_series_adds_nothing_before_first_point() {
        let labelled = BTreeMap::from([
            ("a".to_string(), series(&[(0, 1.0), (15, 1.0)])),
            ("b".to_string(), series(&[(15, 10.0)])),
        ]);
        assert_eq!(
            values(&aggregate(&labelled, &BTreeMap::new())),
            vec![(0, 1.0), (15, 11.0)]
        );
    }

    #[test]
    fn nan_samples_are_filled_over() {
        let labelled = BTreeMap::from([
            ("a".to_string(), series(&[(0, 1.0), (15, f64::NAN), (30, 2.0)])),
            ("b".to_string(), series(&[(0, 1.0), (15, 1.0), (30, 1.0)])),
        ]);
        assert_eq!(
            values(&aggregate(&labelled, &BTreeMap::new())),
            vec![(0, 2.0), (15, 2.0), (30, 3.0)]
        );

        // Leading NaN contributes nothing until the first real value
        let late = BTreeMap::from([("a".to_string(), series(&[(0, f64::NAN), (15, 4.0)]))]);
        assert_eq!(values(&aggregate(&late, &BTreeMap::new())), vec![(0, 0.0), (15, 4.0)]);
    }

    #[test]
    fn nothing_matching_is_empty() {
        let labelled = BTreeMap::from([(
            r#"m{mode="idle"}"#.to_string(),
            series(&[(0, 1.0)]),
        )]);
        let rule = BTreeMap::from([("mode".to_string(), "user".to_string())]);
        assert!(aggregate(&labelled, &rule).is_empty());
    }
}
