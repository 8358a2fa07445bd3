//! Condition expression language.
//!
//! Conditions such as `$0 + $1.max(50s) < 10` are compiled once into an
//! [`Expr`] tree and then evaluated against a [`DataBackpack`] for every
//! index of the primary series. Functions are resolved through an explicit
//! [`FunctionTable`].

mod ast;
mod backpack;
mod builtins;
mod eval;
mod lexer;
mod parser;
mod value;

#[cfg(test)]
mod tests;

pub use self::ast::{
    max_time_filter, ArithmeticOp, BinaryOp, BitwiseOp, ComparisonOp, Expr, Literal, LogicalOp,
    MemberOp, TimeUnit, UnaryOp, DEFAULT_TARGET,
};
pub use self::backpack::DataBackpack;
pub use self::builtins::{BuiltinFn, FunctionTable};
pub use self::eval::{evaluate, EvalContext};
pub use self::value::Value;

use crate::error::ExpressionError;

/// Compile a condition string. Errors carry the byte offset of the problem.
pub fn compile(src: &str) -> Result<Expr, ExpressionError> {
    parser::parse(src)
}
