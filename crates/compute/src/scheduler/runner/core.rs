use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::job::ScheduledJob;
use crate::pipeline::WorkflowStore;
use crate::scheduler::task::WorkflowCheck;
use crate::scheduler::types::{JobInfo, SchedulerConfig};

/// Runs one periodic job per active workflow.
///
/// Jobs are keyed by workflow id; the registry mutex serializes every
/// start/stop so a workflow never has two live jobs.
pub struct CheckScheduler {
    pub(super) config: SchedulerConfig,
    pub(super) store: Arc<dyn WorkflowStore>,
    pub(super) check: Arc<dyn WorkflowCheck>,
    pub(super) jobs: Mutex<HashMap<String, ScheduledJob>>,
    /// Set by `shutdown`; no job starts afterwards.
    pub(super) closed: AtomicBool,
}

impl CheckScheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn WorkflowStore>,
        check: Arc<dyn WorkflowCheck>,
    ) -> Self {
        Self {
            config,
            store,
            check,
            jobs: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_scheduled(&self, workflow_id: &str) -> bool {
        self.jobs.lock().await.contains_key(workflow_id)
    }

    /// Snapshot of every job, sorted by workflow id.
    pub async fn jobs(&self) -> Vec<JobInfo> {
        let mut infos: Vec<JobInfo> = self.jobs.lock().await.values().map(ScheduledJob::info).collect();
        infos.sort_by(|a, b| a.workflow_id.cmp(&b.workflow_id));
        infos
    }
}
