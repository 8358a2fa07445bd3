use async_trait::async_trait;
use vigil_core::TimeRange;

use super::types::Result;
use crate::pipeline::CheckOutcome;

/// The work a scheduled job performs on every tick.
///
/// [`WorkflowRunner`](crate::pipeline::WorkflowRunner) is the production
/// implementation.
#[async_trait]
pub trait WorkflowCheck: Send + Sync {
    /// Check `workflow_id` over `time_range`.
    async fn run(&self, workflow_id: &str, time_range: TimeRange) -> Result<CheckOutcome>;
}
