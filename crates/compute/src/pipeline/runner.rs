//! Runs one workflow over one window: per host, resolve the bound model,
//! fetch what it needs and compute a verdict.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use vigil_core::{MetricData, TimeRange, Workflow};
use vigil_rules::{AlgorithmError, CheckReport};

use super::sink::{CheckOutcome, HostFinding, ResultSink};
use super::source::{reformat, MetricSource, SourceError};
use super::store::WorkflowStore;
use crate::models::ModelRegistry;
use crate::scheduler::{Result, SchedulerError, WorkflowCheck};

pub struct WorkflowRunner {
    store: Arc<dyn WorkflowStore>,
    source: Arc<dyn MetricSource>,
    models: Arc<ModelRegistry>,
    sink: Arc<dyn ResultSink>,
    /// Resolution requested from the metric source.
    query_step: u64,
}

impl WorkflowRunner {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        source: Arc<dyn MetricSource>,
        models: Arc<ModelRegistry>,
        sink: Arc<dyn ResultSink>,
        query_step: u64,
    ) -> Self {
        Self {
            store,
            source,
            models,
            sink,
            query_step,
        }
    }

    /// Check every host of the workflow. One host failing does not stop the rest.
    pub async fn run(&self, workflow_id: &str, time_range: TimeRange) -> Result<CheckOutcome> {
        let workflow = self.store.get_workflow(workflow_id).await?;
        let mut outcome = CheckOutcome::new(workflow_id, time_range);

        let mut host_ids: Vec<&str> = workflow.host_ids().collect();
        host_ids.sort_unstable();

        for host_id in host_ids {
            let Some(model_id) = workflow.model_for_host(host_id) else {
                debug!(workflow_id = %workflow_id, host_id = %host_id, "host has no model bound");
                continue;
            };
            match self.check_host(&workflow, host_id, model_id, time_range).await {
                Ok(report) => {
                    outcome.checked_hosts += 1;
                    if report.output.is_abnormal() {
                        outcome.abnormal_hosts.insert(
                            host_id.to_string(),
                            HostFinding {
                                model_id: model_id.to_string(),
                                abnormal_metrics: report.abnormal_metrics,
                            },
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        workflow_id = %workflow_id,
                        host_id = %host_id,
                        error = %e,
                        "host check failed"
                    );
                    outcome.failed_hosts.insert(host_id.to_string(), e.to_string());
                }
            }
        }

        self.sink.publish(&outcome).await;
        Ok(outcome)
    }

    async fn check_host(
        &self,
        workflow: &Workflow,
        host_id: &str,
        model_id: &str,
        time_range: TimeRange,
    ) -> Result<CheckReport> {
        let info = workflow.model_info.get(model_id).ok_or_else(|| {
            AlgorithmError::InvalidModel(format!("model `{model_id}` has no model_info entry"))
        })?;
        let host = workflow.input.hosts.get(host_id).ok_or_else(|| {
            AlgorithmError::InvalidModel(format!("host `{host_id}` is not in the workflow input"))
        })?;

        let algorithm = self.models.get_or_load(model_id, &info.algo_name).await?;
        let data = self
            .fetch(&host.host_ip, algorithm.input_data(), time_range)
            .await?;

        let report = tokio::task::spawn_blocking(move || algorithm.check(&data, time_range))
            .await
            .map_err(|e| {
                SchedulerError::Algorithm(AlgorithmError::Calculation(format!(
                    "calculation task failed: {e}"
                )))
            })??;
        Ok(report)
    }

    /// Query each metric with its own look-back prepended to the window.
    async fn fetch(
        &self,
        host_ip: &str,
        input: HashMap<String, i64>,
        time_range: TimeRange,
    ) -> std::result::Result<MetricData, SourceError> {
        let mut metrics: Vec<(String, i64)> = input.into_iter().collect();
        metrics.sort_unstable();

        let mut series = Vec::new();
        for (metric, look_back) in metrics {
            let range = time_range.extend_back(look_back.max(0));
            let result = self
                .source
                .query(host_ip, &metric, range, self.query_step)
                .await?;
            series.extend(result);
        }
        Ok(reformat(series))
    }
}

#[async_trait]
impl WorkflowCheck for WorkflowRunner {
    async fn run(&self, workflow_id: &str, time_range: TimeRange) -> Result<CheckOutcome> {
        WorkflowRunner::run(self, workflow_id, time_range).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;
    use std::sync::Mutex;

    use tempfile::TempDir;
    use vigil_core::{HostInfo, ModelInfo, Sample, Series, WorkflowStatus};

    use super::*;
    use crate::pipeline::store::MemoryWorkflowStore;

    const MODEL: &str = r#"{"metrics": {"cpu": {"filter_rule": {"mode": "user"}}}, "n": 3, "train_length": 4, "look_back": 60}"#;

    /// Serves canned series per host and records every query.
    #[derive(Default)]
    struct FakeSource {
        data: HashMap<String, BTreeMap<String, Series>>,
        queries: Mutex<Vec<(String, String, TimeRange)>>,
    }

    #[async_trait]
    impl MetricSource for FakeSource {
        async fn query(
            &self,
            host_ip: &str,
            metric: &str,
            time_range: TimeRange,
            _step: u64,
        ) -> std::result::Result<BTreeMap<String, Series>, SourceError> {
            self.queries
                .lock()
                .unwrap()
                .push((host_ip.to_string(), metric.to_string(), time_range));
            if host_ip == "10.0.0.9" {
                return Err(SourceError::Parse("host unreachable".into()));
            }
            Ok(self.data.get(host_ip).cloned().unwrap_or_default())
        }

        async fn metric_names(&self, _host_ip: &str) -> std::result::Result<Vec<String>, SourceError> {
            Ok(vec!["cpu".to_string()])
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        outcomes: Mutex<Vec<CheckOutcome>>,
    }

    #[async_trait]
    impl ResultSink for RecordingSink {
        async fn publish(&self, outcome: &CheckOutcome) {
            self.outcomes.lock().unwrap().push(outcome.clone());
        }
    }

    fn cpu(values: &[f64]) -> BTreeMap<String, Series> {
        let series = values
            .iter()
            .enumerate()
            .map(|(i, v)| Sample::new(i as i64 * 15, *v))
            .collect();
        BTreeMap::from([(r#"cpu{mode="user"}"#.to_string(), series)])
    }

    fn workflow() -> Workflow {
        let mut wf = Workflow::new("wf", "cpu check", "admin");
        wf.status = WorkflowStatus::Running;
        for (id, ip) in [("calm", "10.0.0.1"), ("busy", "10.0.0.2"), ("gone", "10.0.0.9"), ("unbound", "10.0.0.3")] {
            wf.input.hosts.insert(
                id.to_string(),
                HostInfo {
                    host_ip: ip.to_string(),
                    host_name: id.to_string(),
                    scene: None,
                },
            );
        }
        for id in ["calm", "busy", "gone"] {
            wf.detail.multicheck.insert(id.to_string(), "cpu".to_string());
        }
        wf.model_info.insert(
            "cpu".to_string(),
            ModelInfo {
                model_name: "cpu".to_string(),
                algo_name: "nsigma".to_string(),
                algo_id: String::new(),
            },
        );
        wf
    }

    fn runner(dir: &TempDir, source: Arc<FakeSource>, sink: Arc<RecordingSink>) -> WorkflowRunner {
        fs::create_dir_all(dir.path().join("nsigma")).unwrap();
        fs::write(dir.path().join("nsigma").join("cpu.json"), MODEL).unwrap();
        WorkflowRunner::new(
            Arc::new(MemoryWorkflowStore::with_workflows(vec![workflow()])),
            source,
            Arc::new(ModelRegistry::builtin(dir.path(), 15)),
            sink,
            15,
        )
    }

    #[tokio::test]
    async fn reports_abnormal_hosts_and_isolates_failures() {
        let dir = TempDir::new().expect("create tempdir");
        let source = Arc::new(FakeSource {
            data: HashMap::from([
                ("10.0.0.1".to_string(), cpu(&[10.0, 10.0, 10.0, 10.0, 10.0, 10.0])),
                ("10.0.0.2".to_string(), cpu(&[10.0, 10.0, 10.0, 10.0, 10.0, 90.0])),
            ]),
            ..FakeSource::default()
        });
        let sink = Arc::new(RecordingSink::default());
        let runner = runner(&dir, Arc::clone(&source), Arc::clone(&sink));

        let window = TimeRange::new(60, 75);
        let outcome = runner.run("wf", window).await.unwrap();

        assert_eq!(outcome.checked_hosts, 2);
        assert!(outcome.is_abnormal());
        assert_eq!(
            outcome.abnormal_hosts["busy"],
            HostFinding {
                model_id: "cpu".to_string(),
                abnormal_metrics: vec!["cpu".to_string()],
            }
        );
        assert!(!outcome.abnormal_hosts.contains_key("calm"));
        assert!(outcome.failed_hosts["gone"].contains("host unreachable"));

        // Look-back is prepended to the window; unbound hosts are never queried
        let queries = source.queries.lock().unwrap();
        assert_eq!(queries.len(), 3);
        assert!(queries.iter().all(|(_, metric, range)| metric == "cpu" && *range == TimeRange::new(0, 75)));
        assert!(!queries.iter().any(|(ip, _, _)| ip == "10.0.0.3"));

        assert_eq!(sink.outcomes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn labelled_data_list_metric_reaches_its_leaf() {
        const TREE: &str = r#"{
            "tree": {"name": "cpu_busy", "operator": "or", "children": [{"leaf": "user_high"}]},
            "leaves": [{
                "check_item": "user_high",
                "data_list": [{"metric": "cpu{mode=\"user\"}", "type": "kpi"}],
                "condition": "$0 > 50"
            }]
        }"#;
        let dir = TempDir::new().expect("create tempdir");
        fs::create_dir_all(dir.path().join("diag_tree")).unwrap();
        fs::write(dir.path().join("diag_tree").join("cpu_tree.json"), TREE).unwrap();

        let mut wf = Workflow::new("wf-tree", "cpu tree", "admin");
        wf.input.hosts.insert(
            "busy".to_string(),
            HostInfo {
                host_ip: "10.0.0.2".to_string(),
                host_name: "busy".to_string(),
                scene: None,
            },
        );
        wf.detail.multicheck.insert("busy".to_string(), "cpu_tree".to_string());
        wf.model_info.insert(
            "cpu_tree".to_string(),
            ModelInfo {
                model_name: "cpu_tree".to_string(),
                algo_name: "diag_tree".to_string(),
                algo_id: String::new(),
            },
        );

        // Series come back keyed with every label, as Prometheus returns them
        let points = |v: f64| -> Series { (0..6).map(|i| Sample::new(i * 15, v)).collect() };
        let source = Arc::new(FakeSource {
            data: HashMap::from([(
                "10.0.0.2".to_string(),
                BTreeMap::from([
                    (r#"cpu{instance="10.0.0.2:9100",mode="user"}"#.to_string(), points(80.0)),
                    (r#"cpu{instance="10.0.0.2:9100",mode="idle"}"#.to_string(), points(20.0)),
                ]),
            )]),
            ..FakeSource::default()
        });
        let runner = WorkflowRunner::new(
            Arc::new(MemoryWorkflowStore::with_workflows(vec![wf])),
            Arc::clone(&source) as Arc<dyn MetricSource>,
            Arc::new(ModelRegistry::builtin(dir.path(), 15)),
            Arc::new(RecordingSink::default()),
            15,
        );

        let outcome = runner.run("wf-tree", TimeRange::new(60, 75)).await.unwrap();
        assert!(outcome.failed_hosts.is_empty());
        assert_eq!(
            outcome.abnormal_hosts["busy"].abnormal_metrics,
            vec![r#"cpu{mode="user"}"#.to_string()]
        );
        let queries = source.queries.lock().unwrap();
        assert_eq!(queries[0].1, r#"cpu{mode="user"}"#);
    }

    #[tokio::test]
    async fn unknown_workflow_is_not_found() {
        let dir = TempDir::new().expect("create tempdir");
        let runner = runner(
            &dir,
            Arc::new(FakeSource::default()),
            Arc::new(RecordingSink::default()),
        );
        assert!(matches!(
            runner.run("ghost", TimeRange::new(0, 60)).await,
            Err(SchedulerError::NotFound(_))
        ));
    }
}
