//! Tree-walking evaluator for compiled conditions.

use crate::error::ExpressionError;

use super::ast::{BinaryOp, Expr, LogicalOp, MemberOp, UnaryOp};
use super::backpack::DataBackpack;
use super::builtins::FunctionTable;
use super::value::{self, Value};

/// Everything a node needs to evaluate: the data view and the function table.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub backpack: DataBackpack<'a>,
    pub functions: &'a FunctionTable,
}

impl<'a> EvalContext<'a> {
    pub fn new(backpack: DataBackpack<'a>, functions: &'a FunctionTable) -> Self {
        Self {
            backpack,
            functions,
        }
    }
}

pub fn evaluate(expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(lit) => Ok(Value::from(lit)),
        Expr::Name(name) => ctx
            .backpack
            .get_data_value(ctx.backpack.target_index, name),
        Expr::Pair(key, value) => Ok(Value::Dict(vec![(
            evaluate(key, ctx)?,
            evaluate(value, ctx)?,
        )])),
        Expr::Dict(entries) => {
            let mut pairs = Vec::with_capacity(entries.len());
            for entry in entries {
                match evaluate(entry, ctx)? {
                    Value::Dict(inner) => pairs.extend(inner),
                    other => {
                        return Err(ExpressionError::Type(format!(
                            "dict entry evaluated to {}",
                            other.type_name()
                        )))
                    }
                }
            }
            Ok(Value::Dict(pairs))
        }
        Expr::Binary { op, left, right } => {
            let l = evaluate(left, ctx)?;
            let r = evaluate(right, ctx)?;
            binary(*op, l, r)
        }
        Expr::Unary { op, operand } => {
            let v = evaluate(operand, ctx)?;
            if v.is_null() {
                return Err(ExpressionError::NullOperand(op.to_string()));
            }
            match op {
                UnaryOp::Plus => value::plus(&v),
                UnaryOp::Minus => value::negate(&v),
                UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
                UnaryOp::Invert => value::invert(&v),
            }
        }
        Expr::Conditional {
            predicate,
            if_true,
            if_false,
        } => {
            let p = evaluate(predicate, ctx)?;
            let t = evaluate(if_true, ctx)?;
            let f = evaluate(if_false, ctx)?;
            if p.is_null() || t.is_null() || f.is_null() {
                return Err(ExpressionError::NullOperand("?:".into()));
            }
            Ok(if p.is_truthy() { t } else { f })
        }
        Expr::TimeFilter { .. } => Ok(Value::Int(expr.time_filter_seconds().unwrap_or(0))),
        Expr::FunctionCall { name, target, args } => {
            let function = ctx
                .functions
                .get(name)
                .ok_or_else(|| ExpressionError::UnknownFunction(name.clone()))?;
            function(target, args, ctx)
        }
    }
}

fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, ExpressionError> {
    match op {
        BinaryOp::Arithmetic(a) => value::arithmetic(a, &l, &r),
        BinaryOp::Comparison(c) => value::compare(c, &l, &r),
        BinaryOp::Bitwise(b) => value::bitwise(b, &l, &r),
        BinaryOp::Logical(logical) => {
            if l.is_null() || r.is_null() {
                return Err(ExpressionError::NullOperand(op.to_string()));
            }
            Ok(match logical {
                LogicalOp::Or => {
                    if l.is_truthy() {
                        l
                    } else {
                        r
                    }
                }
                LogicalOp::And => {
                    if l.is_truthy() {
                        r
                    } else {
                        l
                    }
                }
            })
        }
        BinaryOp::Member(m) => {
            let found = value::member(&l, &r)?;
            Ok(Value::Bool(match m {
                MemberOp::In => found,
                MemberOp::NotIn => !found,
            }))
        }
    }
}
