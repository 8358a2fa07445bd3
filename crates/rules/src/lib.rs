//! Diagnostic rule engine.
//!
//! This crate provides:
//! - A condition expression language compiled to an AST and evaluated
//!   against time-aligned metric samples
//! - Check items (leaves) with look-back windows, label merging and
//!   grid alignment
//! - A diagnosis tree combining leaf verdicts with AND/OR/NOT
//! - The algorithm plugin interface and the tree-based algorithm

pub mod algorithm;
pub mod diagnose;
pub mod error;
pub mod expression;
pub mod leaves;
pub mod preprocess;
pub mod tree;

pub use algorithm::{Algorithm, AlgorithmError, AlgorithmInfo, AlgorithmOutput, CheckReport};
pub use diagnose::{Diagnose, DiagnoseConfig, DIAG_TREE_ALGORITHM};
pub use error::{ExpressionError, Result, RuleError};
