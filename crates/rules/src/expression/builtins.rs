//! Function table and the built-in window aggregates.
//!
//! Every built-in takes an optional window argument (usually a time filter
//! such as `50s`). The window covers samples of the call target whose
//! timestamp falls in `[ts(i) - w, ts(i)]`, where `ts(i)` is the target's
//! timestamp at the current index. Without an argument the window holds the
//! current sample only.

use std::collections::HashMap;

use crate::error::ExpressionError;

use super::ast::Expr;
use super::eval::{evaluate, EvalContext};
use super::value::Value;

/// Signature shared by every callable function: target name, raw arguments, context.
pub type BuiltinFn = fn(&str, &[Expr], &EvalContext<'_>) -> Result<Value, ExpressionError>;

/// Functions callable from conditions, keyed by name.
#[derive(Clone)]
pub struct FunctionTable {
    functions: HashMap<String, BuiltinFn>,
}

impl FunctionTable {
    /// A table with no functions registered.
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// The default table: `max`, `min`, `avg`, `sum`, `count`, `diff`.
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        table.register("max", builtin_max);
        table.register("min", builtin_min);
        table.register("avg", builtin_avg);
        table.register("sum", builtin_sum);
        table.register("count", builtin_count);
        table.register("diff", builtin_diff);
        table
    }

    /// Add or replace a function.
    pub fn register(&mut self, name: impl Into<String>, function: BuiltinFn) {
        self.functions.insert(name.into(), function);
    }

    pub fn get(&self, name: &str) -> Option<BuiltinFn> {
        self.functions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Default for FunctionTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("FunctionTable").field("functions", &names).finish()
    }
}

// ── Window helpers ──────────────────────────────────────────────────

fn window_seconds(name: &str, args: &[Expr], ctx: &EvalContext<'_>) -> Result<i64, ExpressionError> {
    match args {
        [] => Ok(0),
        [arg] => {
            let value = evaluate(arg, ctx)?;
            value
                .as_f64()
                .filter(|w| *w >= 0.0)
                .map(|w| w as i64)
                .ok_or_else(|| {
                    ExpressionError::function(name, format!("invalid window {value}"))
                })
        }
        _ => Err(ExpressionError::function(
            name,
            format!("expects at most one argument, got {}", args.len()),
        )),
    }
}

/// Numeric samples of the target inside the window, oldest first.
fn window_values(
    name: &str,
    target: &str,
    args: &[Expr],
    ctx: &EvalContext<'_>,
) -> Result<Vec<f64>, ExpressionError> {
    let window = window_seconds(name, args, ctx)?;
    let backpack = &ctx.backpack;
    let data_name = backpack.get_key_data_name(target)?;
    let series = backpack.series(data_name)?;
    let index = backpack.target_index;
    let current = backpack.get_time_stamp(index, data_name)?;

    let lower = current.saturating_sub(window);
    let head = &series[..=index];
    let start = head.partition_point(|s| s.ts() < lower);
    let values: Vec<f64> = head[start..]
        .iter()
        .filter_map(|s| Value::from_sample(s.value()).as_f64())
        .collect();

    if values.is_empty() {
        return Err(ExpressionError::function(
            name,
            format!("no numeric samples of `{data_name}` in window"),
        ));
    }
    Ok(values)
}

// ── Built-ins ───────────────────────────────────────────────────────

fn builtin_max(target: &str, args: &[Expr], ctx: &EvalContext<'_>) -> Result<Value, ExpressionError> {
    let values = window_values("max", target, args, ctx)?;
    Ok(Value::Float(values.into_iter().fold(f64::NEG_INFINITY, f64::max)))
}

fn builtin_min(target: &str, args: &[Expr], ctx: &EvalContext<'_>) -> Result<Value, ExpressionError> {
    let values = window_values("min", target, args, ctx)?;
    Ok(Value::Float(values.into_iter().fold(f64::INFINITY, f64::min)))
}

fn builtin_avg(target: &str, args: &[Expr], ctx: &EvalContext<'_>) -> Result<Value, ExpressionError> {
    let values = window_values("avg", target, args, ctx)?;
    Ok(Value::Float(values.iter().sum::<f64>() / values.len() as f64))
}

fn builtin_sum(target: &str, args: &[Expr], ctx: &EvalContext<'_>) -> Result<Value, ExpressionError> {
    let values = window_values("sum", target, args, ctx)?;
    Ok(Value::Float(values.iter().sum()))
}

fn builtin_count(target: &str, args: &[Expr], ctx: &EvalContext<'_>) -> Result<Value, ExpressionError> {
    let values = window_values("count", target, args, ctx)?;
    Ok(Value::Int(values.len() as i64))
}

/// Current value minus the oldest value in the window.
fn builtin_diff(target: &str, args: &[Expr], ctx: &EvalContext<'_>) -> Result<Value, ExpressionError> {
    let values = window_values("diff", target, args, ctx)?;
    let (first, last) = (values[0], values[values.len() - 1]);
    Ok(Value::Float(last - first))
}
