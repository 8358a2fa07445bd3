//! Metric source abstraction.

use std::collections::BTreeMap;

use async_trait::async_trait;
use vigil_core::{metric_name, MetricData, Series, TimeRange};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Parse(String),
}

/// Read access to host telemetry.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Series of `metric` on `host_ip` inside `time_range`, keyed as
    /// `metric{labels}`.
    async fn query(
        &self,
        host_ip: &str,
        metric: &str,
        time_range: TimeRange,
        step: u64,
    ) -> Result<BTreeMap<String, Series>, SourceError>;

    /// Bare names of every metric the host exports.
    async fn metric_names(&self, host_ip: &str) -> Result<Vec<String>, SourceError>;
}

/// Regroup `metric{labels}` keyed series under their bare metric name.
pub fn reformat(series: impl IntoIterator<Item = (String, Series)>) -> MetricData {
    let mut data = MetricData::new();
    for (key, points) in series {
        data.entry(metric_name(&key).to_string())
            .or_default()
            .insert(key, points);
    }
    data
}

#[cfg(test)]
mod tests {
    use vigil_core::Sample;

    use super::*;

    #[test]
    fn groups_by_bare_name() {
        let data = reformat(vec![
            (r#"cpu{mode="user"}"#.to_string(), vec![Sample::new(0, 1.0)]),
            (r#"cpu{mode="idle"}"#.to_string(), vec![Sample::new(0, 2.0)]),
            ("load1".to_string(), Vec::new()),
        ]);
        assert_eq!(data.len(), 2);
        assert_eq!(data["cpu"].len(), 2);
        assert!(data["load1"]["load1"].is_empty());
    }
}
