use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, info, warn};
use vigil_core::WorkflowStatus;

use super::job::ScheduledJob;
use super::CheckScheduler;
use crate::scheduler::types::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Install {
    Started,
    AlreadyRunning,
    /// Scheduler is shut down.
    Refused,
}

impl CheckScheduler {
    /// Install a job for every workflow the store marks as running.
    ///
    /// Returns how many jobs were newly started.
    pub async fn start_all_workflow(&self) -> Result<usize> {
        let workflows = self
            .store
            .get_all_workflow_list(Some(WorkflowStatus::Running))
            .await?;

        let mut jobs = self.jobs.lock().await;
        let mut started = 0;
        for workflow in &workflows {
            if self.install(&mut jobs, &workflow.workflow_id, &workflow.username, workflow.step)
                == Install::Started
            {
                started += 1;
            }
        }
        info!(running = workflows.len(), started, "running workflows scheduled");
        Ok(started)
    }

    /// Start the periodic job for a workflow.
    ///
    /// Starting a workflow that already has a live job succeeds without a
    /// second job. Returns `false` only once the scheduler is shut down.
    pub async fn start_workflow(&self, workflow_id: &str, username: &str, step: u64) -> bool {
        let mut jobs = self.jobs.lock().await;
        self.install(&mut jobs, workflow_id, username, step) != Install::Refused
    }

    /// Cancel and remove a workflow's job. Unknown ids are a no-op.
    pub async fn stop_workflow(&self, workflow_id: &str) {
        let mut jobs = self.jobs.lock().await;
        Self::remove(&mut jobs, workflow_id);
    }

    /// Move a held workflow to running and start its job.
    ///
    /// A workflow in any other status is left alone.
    pub async fn execute_workflow(&self, workflow_id: &str, username: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let workflow = self.store.get_workflow(workflow_id).await?;
        if workflow.status != WorkflowStatus::Hold {
            info!(
                workflow_id = %workflow_id,
                status = %workflow.status,
                "workflow is not on hold, nothing to execute"
            );
            return Ok(());
        }

        self.store
            .update_workflow_status(workflow_id, WorkflowStatus::Running)
            .await?;
        self.install(&mut jobs, workflow_id, username, workflow.step);
        info!(workflow_id = %workflow_id, username = %username, "workflow executed");
        Ok(())
    }

    /// Move a running workflow back to hold and stop its job.
    ///
    /// A workflow in any other status is left alone.
    pub async fn stop_running_workflow(&self, workflow_id: &str, username: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let workflow = self.store.get_workflow(workflow_id).await?;
        if workflow.status != WorkflowStatus::Running {
            info!(
                workflow_id = %workflow_id,
                status = %workflow.status,
                "workflow is not running, nothing to stop"
            );
            return Ok(());
        }

        self.store
            .update_workflow_status(workflow_id, WorkflowStatus::Hold)
            .await?;
        Self::remove(&mut jobs, workflow_id);
        info!(workflow_id = %workflow_id, username = %username, "workflow stopped");
        Ok(())
    }

    /// Stop every job and wait for the loops to exit, up to the configured timeout.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let mut handles = {
            let mut jobs = self.jobs.lock().await;
            jobs.drain()
                .map(|(_, job)| {
                    job.cancel();
                    job.into_handle()
                })
                .collect::<Vec<_>>()
        };
        info!(jobs = handles.len(), "scheduler shutting down");

        let wait_all = async {
            for handle in handles.iter_mut() {
                if let Err(e) = handle.await {
                    warn!(error = %e, "workflow job ended abnormally");
                }
            }
        };
        if tokio::time::timeout(self.config.shutdown_timeout, wait_all)
            .await
            .is_err()
        {
            warn!(
                timeout_secs = self.config.shutdown_timeout.as_secs(),
                "jobs did not stop in time, aborting"
            );
            for handle in &handles {
                handle.abort();
            }
        }
        info!("scheduler stopped");
    }

    /// Caller holds the registry lock.
    fn install(
        &self,
        jobs: &mut HashMap<String, ScheduledJob>,
        workflow_id: &str,
        username: &str,
        step: u64,
    ) -> Install {
        if self.closed.load(Ordering::SeqCst) {
            warn!(workflow_id = %workflow_id, "scheduler is shut down, job not started");
            return Install::Refused;
        }
        if let Some(job) = jobs.get(workflow_id) {
            if !job.is_finished() {
                debug!(workflow_id = %workflow_id, "workflow already scheduled");
                return Install::AlreadyRunning;
            }
        }

        let step = self.config.resolve_step(step);
        let job = ScheduledJob::spawn(
            workflow_id,
            username,
            step,
            self.config.time_offset,
            Arc::clone(&self.check),
        );
        jobs.insert(workflow_id.to_string(), job);
        info!(workflow_id = %workflow_id, username = %username, step, "workflow job started");
        Install::Started
    }

    fn remove(jobs: &mut HashMap<String, ScheduledJob>, workflow_id: &str) {
        match jobs.remove(workflow_id) {
            Some(job) => {
                job.cancel();
                info!(workflow_id = %workflow_id, "workflow job cancelled");
            }
            None => debug!(workflow_id = %workflow_id, "no job to stop"),
        }
    }
}
