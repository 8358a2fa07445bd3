pub mod algorithms;
pub mod models;
pub mod pipeline;
pub mod scheduler;

pub use algorithms::{NSigma, NSigmaConfig};
pub use models::ModelRegistry;
pub use pipeline::{
    CheckOutcome, JsonWorkflowStore, LogSink, MemoryWorkflowStore, MetricSource,
    PrometheusSource, ResultSink, WorkflowRunner, WorkflowStore,
};
pub use scheduler::{CheckScheduler, SchedulerConfig, SchedulerError, WorkflowCheck};
