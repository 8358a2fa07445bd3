//! Check scheduler -- one periodic job per running workflow.
//!
//! Split into focused submodules:
//! - `core`: CheckScheduler struct, constructor, and accessor methods
//! - `lifecycle`: start/stop/execute transitions and shutdown
//! - `job`: the per-workflow loop and tick isolation

mod core;
mod job;
mod lifecycle;

pub use self::core::CheckScheduler;
