use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::scheduler::task::WorkflowCheck;
use crate::scheduler::types::{check_window, JobInfo};

const NEVER_RUN: i64 = i64::MIN;

/// State shared between a job's registry entry and its loop.
pub(super) struct JobState {
    workflow_id: String,
    username: String,
    step: u64,
    cancelled: AtomicBool,
    wake: Notify,
    last_run: AtomicI64,
    ticks: AtomicU64,
    failures: AtomicU64,
}

/// One periodic job in the registry.
pub(super) struct ScheduledJob {
    state: Arc<JobState>,
    handle: JoinHandle<()>,
}

impl ScheduledJob {
    pub(super) fn spawn(
        workflow_id: &str,
        username: &str,
        step: u64,
        time_offset: u64,
        check: Arc<dyn WorkflowCheck>,
    ) -> Self {
        let state = Arc::new(JobState {
            workflow_id: workflow_id.to_string(),
            username: username.to_string(),
            step,
            cancelled: AtomicBool::new(false),
            wake: Notify::new(),
            last_run: AtomicI64::new(NEVER_RUN),
            ticks: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        });
        let handle = tokio::spawn(run_job(Arc::clone(&state), time_offset, check));
        Self { state, handle }
    }

    /// Stop the loop. An in-flight tick finishes; no new tick starts.
    pub(super) fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.wake.notify_one();
    }

    pub(super) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub(super) fn info(&self) -> JobInfo {
        let last_run = match self.state.last_run.load(Ordering::Relaxed) {
            NEVER_RUN => None,
            ts => DateTime::<Utc>::from_timestamp(ts, 0),
        };
        JobInfo {
            workflow_id: self.state.workflow_id.clone(),
            username: self.state.username.clone(),
            step: self.state.step,
            last_run,
            ticks: self.state.ticks.load(Ordering::Relaxed),
            failures: self.state.failures.load(Ordering::Relaxed),
        }
    }

    pub(super) fn into_handle(self) -> JoinHandle<()> {
        self.handle
    }
}

async fn run_job(state: Arc<JobState>, time_offset: u64, check: Arc<dyn WorkflowCheck>) {
    let period = Duration::from_secs(state.step);
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = state.wake.notified() => {}
        }
        if state.cancelled.load(Ordering::SeqCst) {
            break;
        }
        run_tick(&state, time_offset, &check).await;
    }

    info!(workflow_id = %state.workflow_id, "workflow job stopped");
}

/// Run one check in its own task so a panic cannot take the loop down.
async fn run_tick(state: &JobState, time_offset: u64, check: &Arc<dyn WorkflowCheck>) {
    let now = Utc::now();
    let window = check_window(now.timestamp(), state.step, time_offset);
    state.last_run.store(now.timestamp(), Ordering::Relaxed);
    state.ticks.fetch_add(1, Ordering::Relaxed);

    let task_check = Arc::clone(check);
    let workflow_id = state.workflow_id.clone();
    let result = tokio::spawn(async move { task_check.run(&workflow_id, window).await }).await;

    match result {
        Ok(Ok(outcome)) => {
            debug!(
                workflow_id = %state.workflow_id,
                start = window.start,
                end = window.end,
                checked = outcome.checked_hosts,
                abnormal = outcome.abnormal_hosts.len(),
                failed = outcome.failed_hosts.len(),
                "workflow tick finished"
            );
        }
        Ok(Err(e)) => {
            state.failures.fetch_add(1, Ordering::Relaxed);
            warn!(workflow_id = %state.workflow_id, error = %e, "workflow tick failed");
        }
        Err(e) => {
            state.failures.fetch_add(1, Ordering::Relaxed);
            error!(workflow_id = %state.workflow_id, error = %e, "workflow tick panicked");
        }
    }
}
