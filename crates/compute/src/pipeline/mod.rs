//! Check pipeline: workflow store → metric source → algorithm → result sink.
//!
//! - `store`: workflow persistence ([`WorkflowStore`])
//! - `source` / `prometheus`: metric retrieval ([`MetricSource`])
//! - `runner`: per-tick execution of one workflow ([`WorkflowRunner`])
//! - `sink`: where outcomes go ([`ResultSink`])

pub mod prometheus;
pub mod runner;
pub mod sink;
pub mod source;
pub mod store;

pub use prometheus::PrometheusSource;
pub use runner::WorkflowRunner;
pub use sink::{CheckOutcome, HostFinding, LogSink, ResultSink};
pub use source::{reformat, MetricSource, SourceError};
pub use store::{JsonWorkflowStore, MemoryWorkflowStore, WorkflowStore};
