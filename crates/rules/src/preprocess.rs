//! Series preprocessing applied before a leaf is evaluated.
//!
//! KPI leaves align every series onto a fixed sample grid so that index `i`
//! refers to the same instant in all of them. Log leaves only drop repeated
//! samples.

use std::collections::{HashMap, HashSet};

use vigil_core::{Sample, SampleValue, Series, TimeRange};

/// Preprocessing seam for leaf data.
pub trait Preprocessor: Send + Sync {
    /// Resample each series onto `[start, end]` with step `sample_period`.
    fn align(
        &self,
        sample_period: i64,
        time_range: TimeRange,
        data: HashMap<String, Series>,
    ) -> HashMap<String, Series>;

    /// Drop repeated `(timestamp, value)` samples.
    fn deduplicate(&self, data: HashMap<String, Series>) -> HashMap<String, Series>;
}

/// Forward-fill grid alignment.
///
/// Each grid point takes the latest sample at or before it. Grid points
/// before the first sample take the first sample's value. Empty series stay
/// empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridPreprocessor;

impl GridPreprocessor {
    fn align_series(sample_period: i64, time_range: TimeRange, series: &Series) -> Series {
        let Some(first) = series.first() else {
            return Vec::new();
        };

        let mut aligned = Vec::new();
        let mut cursor = 0usize;
        let mut current = first.value();
        let mut ts = time_range.start;
        while ts <= time_range.end {
            while cursor < series.len() && series[cursor].ts() <= ts {
                current = series[cursor].value();
                cursor += 1;
            }
            aligned.push(Sample(ts, current.clone()));
            ts += sample_period;
        }
        aligned
    }
}

/// Hashable view of a sample value. Numbers compare by bit pattern.
#[derive(PartialEq, Eq, Hash)]
enum SampleKey<'a> {
    Number(u64),
    Text(&'a str),
}

impl<'a> SampleKey<'a> {
    fn of(value: &'a SampleValue) -> Self {
        match value {
            SampleValue::Number(n) => SampleKey::Number(n.to_bits()),
            SampleValue::Text(s) => SampleKey::Text(s),
        }
    }
}

impl Preprocessor for GridPreprocessor {
    fn align(
        &self,
        sample_period: i64,
        time_range: TimeRange,
        data: HashMap<String, Series>,
    ) -> HashMap<String, Series> {
        if sample_period <= 0 || time_range.start > time_range.end {
            tracing::warn!(
                sample_period,
                start = time_range.start,
                end = time_range.end,
                "cannot align onto an empty grid, leaving data as is"
            );
            return data;
        }
        data.into_iter()
            .map(|(name, series)| {
                let aligned = Self::align_series(sample_period, time_range, &series);
                (name, aligned)
            })
            .collect()
    }

    fn deduplicate(&self, data: HashMap<String, Series>) -> HashMap<String, Series> {
        data.into_iter()
            .map(|(name, series)| {
                let first_seen: Vec<bool> = {
                    let mut seen = HashSet::with_capacity(series.len());
                    series
                        .iter()
                        .map(|s| seen.insert((s.ts(), SampleKey::of(s.value()))))
                        .collect()
                };
                let kept: Series = series
                    .into_iter()
                    .zip(first_seen)
                    .filter_map(|(sample, first)| first.then_some(sample))
                    .collect();
                (name, kept)
            })
            .collect()
    }
}
