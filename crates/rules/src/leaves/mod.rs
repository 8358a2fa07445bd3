//! Check items (leaves) and their manager.
//!
//! A leaf binds one compiled condition to a list of metrics. The
//! [`LeavesManager`] builds every leaf of a configuration, tracks how far
//! back each metric must be fetched, and classifies each leaf per run as
//! normal, abnormal, no data, or internal error.

mod leaf;
mod manager;
mod merge;

pub use self::leaf::{
    find_start_index, Calculator, DataItem, DataKind, Leaf, LeafConfig, LeafVerdict,
    MAIN_DATA_MACRO,
};
pub use self::manager::{CheckResult, LeavesManager, RejectedLeaf};
pub use self::merge::{merge_by_method, MergeMethod};
