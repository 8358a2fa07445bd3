//! Runs the sample workflow in `data/workflows.json` against the sample
//! diagnosis model, with an in-process metric source.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use vigil_compute::pipeline::SourceError;
use vigil_compute::{JsonWorkflowStore, LogSink, MetricSource, ModelRegistry, WorkflowRunner, WorkflowStore};
use vigil_core::{Sample, Series, TimeRange, WorkflowStatus};

/// Integration tests run from the crate directory, so we go up two levels.
fn data_dir() -> PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../data")
}

/// Every interface up and flat counters, or nothing at all.
struct StaticSource {
    healthy: bool,
}

#[async_trait]
impl MetricSource for StaticSource {
    async fn query(
        &self,
        _host_ip: &str,
        metric: &str,
        time_range: TimeRange,
        step: u64,
    ) -> Result<BTreeMap<String, Series>, SourceError> {
        if !self.healthy {
            return Ok(BTreeMap::new());
        }
        let value = match metric {
            "node_network_up" => 1.0,
            "tcp_rtt_ms" => 10.0,
            _ => 5.0,
        };
        let series: Series = (time_range.start..=time_range.end)
            .step_by(step as usize)
            .map(|ts| Sample::new(ts, value))
            .collect();
        Ok(BTreeMap::from([(metric.to_string(), series)]))
    }

    async fn metric_names(&self, _host_ip: &str) -> Result<Vec<String>, SourceError> {
        Ok(Vec::new())
    }
}

async fn runner(healthy: bool) -> WorkflowRunner {
    let store = JsonWorkflowStore::open(data_dir().join("workflows.json"))
        .await
        .unwrap_or_else(|e| panic!("Failed to open workflows.json: {e}"));
    WorkflowRunner::new(
        Arc::new(store),
        Arc::new(StaticSource { healthy }),
        Arc::new(ModelRegistry::builtin(data_dir(), 15)),
        Arc::new(LogSink),
        15,
    )
}

const WINDOW: TimeRange = TimeRange { start: 1_000, end: 1_060 };

#[tokio::test]
async fn sample_workflow_is_held() {
    let store = JsonWorkflowStore::open(data_dir().join("workflows.json")).await.unwrap();
    let wf = store.get_workflow("wf-network-01").await.unwrap();
    assert_eq!(wf.status, WorkflowStatus::Hold);
    assert_eq!(wf.model_for_host("host1"), Some("network"));
}

#[tokio::test]
async fn healthy_host_is_normal() {
    let outcome = runner(true).await.run("wf-network-01", WINDOW).await.unwrap();
    assert_eq!(outcome.checked_hosts, 1);
    assert!(outcome.failed_hosts.is_empty());
    assert!(!outcome.is_abnormal());
}

#[tokio::test]
async fn silent_host_trips_link_check() {
    // No data at all: link_up is not abnormal, so NOT(link_up) fires
    let outcome = runner(false).await.run("wf-network-01", WINDOW).await.unwrap();
    assert!(outcome.is_abnormal());
    assert_eq!(outcome.abnormal_hosts["host1"].model_id, "network");
}
