//! Prometheus HTTP API metric source.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use vigil_core::config::PrometheusConfig;
use vigil_core::{metric_name, Sample, SampleValue, Series, TimeRange};

use super::source::{MetricSource, SourceError};

/// Prometheus rejects range queries returning more points than this per series.
const MAX_POINTS_PER_SERIES: u64 = 11_000;
const STEP_INCREMENT: u64 = 15;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    status: String,
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MatrixData {
    #[serde(rename = "resultType")]
    result_type: String,
    result: Vec<MatrixEntry>,
}

#[derive(Debug, Deserialize)]
struct MatrixEntry {
    metric: BTreeMap<String, String>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

pub struct PrometheusSource {
    client: reqwest::Client,
    base_url: String,
    instance_port: u16,
}

impl PrometheusSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration, instance_port: u16) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            instance_port,
        })
    }

    pub fn from_config(config: &PrometheusConfig) -> Result<Self, SourceError> {
        Self::new(
            config.url.clone(),
            Duration::from_secs(config.timeout_secs),
            config.instance_port,
        )
    }

    fn instance_label(&self, host_ip: &str) -> String {
        format!(r#"instance="{}:{}""#, host_ip, self.instance_port)
    }

    fn instance_selector(&self, host_ip: &str) -> String {
        format!("{{{}}}", self.instance_label(host_ip))
    }

    /// PromQL selector for `metric` on one host. A metric written with its
    /// own labels gets the instance label added inside its braces.
    fn host_query(&self, host_ip: &str, metric: &str) -> String {
        let instance = self.instance_label(host_ip);
        match metric.split_once('{') {
            Some((name, labels)) => {
                let labels = labels.trim_end().trim_end_matches('}').trim();
                if labels.is_empty() {
                    format!("{name}{{{instance}}}")
                } else {
                    format!("{name}{{{instance},{labels}}}")
                }
            }
            None => format!("{metric}{{{instance}}}"),
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "prometheus request");

        let response = self.client.get(&url).query(params).send().await?;
        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Api { status, body });
        }

        let parsed: ApiResponse<T> = response.json().await?;
        if parsed.status != "success" {
            return Err(SourceError::Parse(
                parsed.error.unwrap_or_else(|| format!("status {}", parsed.status)),
            ));
        }
        parsed
            .data
            .ok_or_else(|| SourceError::Parse("response has no data".into()))
    }
}

#[async_trait]
impl MetricSource for PrometheusSource {
    async fn query(
        &self,
        host_ip: &str,
        metric: &str,
        time_range: TimeRange,
        step: u64,
    ) -> Result<BTreeMap<String, Series>, SourceError> {
        let step = adjusted_step(time_range, step);
        let params = [
            ("query", self.host_query(host_ip, metric)),
            ("start", time_range.start.to_string()),
            ("end", time_range.end.to_string()),
            ("step", step.to_string()),
        ];
        let data: MatrixData = self.get("/api/v1/query_range", &params).await?;
        matrix_to_series(metric_name(metric), data)
    }

    async fn metric_names(&self, host_ip: &str) -> Result<Vec<String>, SourceError> {
        let params = [("match[]", self.instance_selector(host_ip))];
        let names: Vec<String> = self.get("/api/v1/label/__name__/values", &params).await?;
        Ok(names.into_iter().collect::<BTreeSet<_>>().into_iter().collect())
    }
}

/// Widen `step` until the range fits the per-series point limit.
fn adjusted_step(time_range: TimeRange, step: u64) -> u64 {
    let seconds = (time_range.end - time_range.start).max(0) as u64;
    let mut step = step.max(1);
    while seconds / step > MAX_POINTS_PER_SERIES {
        step += STEP_INCREMENT;
    }
    step
}

/// `name{a="x",b="y"}` from a label set, `__name__` excluded.
fn series_key(fallback_name: &str, labels: &BTreeMap<String, String>) -> String {
    let name = labels
        .get("__name__")
        .map(String::as_str)
        .unwrap_or(fallback_name);
    let body: Vec<String> = labels
        .iter()
        .filter(|(k, _)| k.as_str() != "__name__")
        .map(|(k, v)| format!(r#"{k}="{v}""#))
        .collect();
    if body.is_empty() {
        name.to_string()
    } else {
        format!("{}{{{}}}", name, body.join(","))
    }
}

fn matrix_to_series(metric: &str, data: MatrixData) -> Result<BTreeMap<String, Series>, SourceError> {
    if data.result_type != "matrix" {
        return Err(SourceError::Parse(format!(
            "expected matrix result, got {}",
            data.result_type
        )));
    }
    Ok(data
        .result
        .into_iter()
        .map(|entry| {
            let key = series_key(metric, &entry.metric);
            let series = entry
                .values
                .into_iter()
                .map(|(ts, raw)| {
                    let value = match raw.parse::<f64>() {
                        Ok(v) => SampleValue::Number(v),
                        Err(_) => SampleValue::Text(raw),
                    };
                    Sample(ts as i64, value)
                })
                .collect();
            (key, series)
        })
        .collect())
}
