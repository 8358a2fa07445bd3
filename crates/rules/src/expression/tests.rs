//! Evaluation tests for the expression module.

use std::collections::HashMap;

use vigil_core::{Sample, Series};

use super::*;
use crate::error::ExpressionError;

fn series(points: &[(i64, f64)]) -> Series {
    points.iter().map(|&(ts, v)| Sample::new(ts, v)).collect()
}

fn data() -> HashMap<String, Series> {
    HashMap::from([
        (
            "$0".to_string(),
            series(&[(0, 1.0), (15, 4.0), (30, 2.0), (45, 8.0), (60, 5.0)]),
        ),
        (
            "$1".to_string(),
            series(&[(0, 10.0), (15, 20.0), (30, 30.0), (45, 40.0), (60, 50.0)]),
        ),
    ])
}

fn eval_at(src: &str, index: usize) -> Result<Value, ExpressionError> {
    let data = data();
    let functions = FunctionTable::builtin();
    let expr = compile(src)?;
    let ctx = EvalContext::new(DataBackpack::new("$0", index, &data), &functions);
    evaluate(&expr, &ctx)
}

fn eval(src: &str) -> Result<Value, ExpressionError> {
    eval_at(src, 4)
}

// ── Literals and operators ──────────────────────────────────

#[test]
fn literal_evaluation_is_deterministic() {
    for _ in 0..3 {
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::Int(7));
        assert_eq!(eval("'a' + \"b\"").unwrap(), Value::Str("ab".into()));
    }
}

#[test]
fn scientific_and_float_literals() {
    assert_eq!(eval("1e3 == 1000").unwrap(), Value::Bool(true));
    assert_eq!(eval("0.5 * 4").unwrap(), Value::Float(2.0));
}

#[test]
fn divide_and_modulo_by_zero_fail() {
    assert_eq!(eval("1 / 0").unwrap_err(), ExpressionError::DivideByZero);
    assert_eq!(eval("1 % 0").unwrap_err(), ExpressionError::DivideByZero);
    assert_eq!(eval("$0 / ($1 - $1)").unwrap_err(), ExpressionError::DivideByZero);
}

#[test]
fn logical_operators_return_operands() {
    assert_eq!(eval("0 || 5").unwrap(), Value::Int(5));
    assert_eq!(eval("3 || 5").unwrap(), Value::Int(3));
    assert_eq!(eval("0 && 5").unwrap(), Value::Int(0));
    assert_eq!(eval("3 && 5").unwrap(), Value::Int(5));
}

#[test]
fn null_operands_fail_everywhere() {
    for src in ["null + 1", "null > 1", "null || true", "1 | null", "-null", "null ? 1 : 2"] {
        assert!(
            matches!(eval(src), Err(ExpressionError::NullOperand(_))),
            "expected null operand failure for {src}"
        );
    }
}

#[test]
fn conditional_evaluates_all_branches() {
    assert_eq!(eval("$0 > 1 ? 'high' : 'low'").unwrap(), Value::Str("high".into()));
    // The untaken branch still runs and its failure propagates
    assert_eq!(eval("true ? 1 : 1 / 0").unwrap_err(), ExpressionError::DivideByZero);
}

#[test]
fn membership_over_dict_literals() {
    assert_eq!(eval(r#"{"a": 1} in {"a": 1, "b": 2}"#).unwrap(), Value::Bool(true));
    assert_eq!(eval(r#"{"a": 3} in {"a": 1, "b": 2}"#).unwrap(), Value::Bool(false));
    assert_eq!(eval(r#"{"a": 3} notin {"a": 1}"#).unwrap(), Value::Bool(true));
    assert!(matches!(eval("1 in 2"), Err(ExpressionError::Type(_))));
}

#[test]
fn unary_operators() {
    assert_eq!(eval("!0").unwrap(), Value::Bool(true));
    assert_eq!(eval("~5").unwrap(), Value::Int(-6));
    assert_eq!(eval("-$0").unwrap(), Value::Float(-5.0));
}

#[test]
fn time_filter_evaluates_to_seconds() {
    assert_eq!(eval("2m").unwrap(), Value::Int(120));
    assert_eq!(eval("1h + 1s").unwrap(), Value::Int(3601));
}

// ── Names ───────────────────────────────────────────────────

#[test]
fn names_read_current_index() {
    assert_eq!(eval_at("$0", 1).unwrap(), Value::Float(4.0));
    assert_eq!(eval_at("$1 + $0", 2).unwrap(), Value::Float(32.0));
}

#[test]
fn unknown_name_fails() {
    assert_eq!(eval("$9").unwrap_err(), ExpressionError::UnknownName("$9".into()));
}

// ── Built-in functions ──────────────────────────────────────

#[test]
fn window_functions_cover_trailing_interval() {
    // Index 4 is ts=60; 30s covers ts 30, 45, 60 of $0: 2, 8, 5
    assert_eq!(eval("max(30s)").unwrap(), Value::Float(8.0));
    assert_eq!(eval("min(30s)").unwrap(), Value::Float(2.0));
    assert_eq!(eval("sum(30s)").unwrap(), Value::Float(15.0));
    assert_eq!(eval("avg(30s)").unwrap(), Value::Float(5.0));
    assert_eq!(eval("count(30s)").unwrap(), Value::Int(3));
    assert_eq!(eval("diff(30s)").unwrap(), Value::Float(3.0));
}

#[test]
fn explicit_target_uses_that_series() {
    assert_eq!(eval("$1.max(1m)").unwrap(), Value::Float(50.0));
    assert_eq!(eval("$1.diff(1m)").unwrap(), Value::Float(40.0));
    assert_eq!(eval("$0 + $1.min(15s) < 50").unwrap(), Value::Bool(true));
}

#[test]
fn window_without_argument_is_current_sample() {
    assert_eq!(eval_at("count()", 2).unwrap(), Value::Int(1));
    assert_eq!(eval_at("max()", 2).unwrap(), Value::Float(2.0));
}

#[test]
fn window_is_clipped_at_series_start() {
    assert_eq!(eval_at("count(1h)", 1).unwrap(), Value::Int(2));
}

#[test]
fn unknown_function_fails() {
    assert_eq!(
        eval("median(10s)").unwrap_err(),
        ExpressionError::UnknownFunction("median".into())
    );
}

#[test]
fn bad_window_argument_fails() {
    assert!(matches!(eval("max('x')"), Err(ExpressionError::Function { .. })));
    assert!(matches!(eval("max(1s, 2s)"), Err(ExpressionError::Function { .. })));
}

#[test]
fn window_without_numeric_samples_fails() {
    let data = HashMap::from([(
        "$0".to_string(),
        vec![Sample::new(0, "up"), Sample::new(15, "down")],
    )]);
    let functions = FunctionTable::builtin();
    let expr = compile("max(1m)").unwrap();
    let ctx = EvalContext::new(DataBackpack::new("$0", 1, &data), &functions);
    assert!(matches!(
        evaluate(&expr, &ctx),
        Err(ExpressionError::Function { .. })
    ));
}

#[test]
fn injected_table_replaces_builtins() {
    fn always_seven(_: &str, _: &[Expr], _: &EvalContext<'_>) -> Result<Value, ExpressionError> {
        Ok(Value::Int(7))
    }

    let data = data();
    let mut functions = FunctionTable::empty();
    functions.register("seven", always_seven);
    let ctx = EvalContext::new(DataBackpack::new("$0", 0, &data), &functions);

    assert_eq!(evaluate(&compile("seven() * 2").unwrap(), &ctx).unwrap(), Value::Int(14));
    assert!(matches!(
        evaluate(&compile("max()").unwrap(), &ctx),
        Err(ExpressionError::UnknownFunction(_))
    ));
}

// ── Time shift ──────────────────────────────────────────────

#[test]
fn max_time_filter_folds_whole_tree() {
    assert_eq!(max_time_filter(&compile("$0 > 1").unwrap()), 0);
    assert_eq!(max_time_filter(&compile("$0 + $1.max(50s) < 10").unwrap()), 50);
    assert_eq!(
        max_time_filter(&compile("max(1m) > 0 ? {\"k\": sum(2h)} : avg(30s)").unwrap()),
        7200
    );
}
