//! Periodic execution of diagnostic workflows.
//!
//! A [`CheckScheduler`] keeps one job per running workflow. Every `step`
//! seconds a job hands the window `[now - offset - step, now - offset]` to
//! its [`WorkflowCheck`]; failures are logged and the job keeps going.

pub mod runner;
pub mod task;
pub mod types;

pub use runner::CheckScheduler;
pub use task::WorkflowCheck;
pub use types::{check_window, JobInfo, Result, SchedulerConfig, SchedulerError};
