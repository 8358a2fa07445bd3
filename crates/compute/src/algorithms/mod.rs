//! Built-in statistical algorithms. The diagnosis tree lives in `vigil-rules`.

pub mod aggregate;
pub mod filter;
pub mod nsigma;

pub use aggregate::{aggregate, matches_filter};
pub use nsigma::{
    nsigma_scores, FusionStrategy, MetricCheck, NSigma, NSigmaConfig, Preprocess, RuleGroup,
    NSIGMA_ALGORITHM,
};
