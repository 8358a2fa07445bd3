//! Runtime values and the operator semantics applied to them.

use std::cmp::Ordering;
use std::fmt;

use vigil_core::SampleValue;

use crate::error::ExpressionError;

use super::ast::{ArithmeticOp, BitwiseOp, ComparisonOp, Literal};

/// Result of evaluating a condition node.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Insertion-ordered key/value pairs.
    Dict(Vec<(Value, Value)>),
}

type ValueResult = Result<Value, ExpressionError>;

/// Numeric view of a value; booleans count as 0/1.
#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Dict(_) => "dict",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Dict(pairs) => !pairs.is_empty(),
        }
    }

    /// Numeric value as `f64`, if the value is a number or boolean.
    pub fn as_f64(&self) -> Option<f64> {
        self.as_num().map(Num::as_f64)
    }

    fn as_num(&self) -> Option<Num> {
        match self {
            Value::Bool(b) => Some(Num::Int(i64::from(*b))),
            Value::Int(i) => Some(Num::Int(*i)),
            Value::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }

    /// Integer coercion used by bitwise operators.
    fn coerce_int(&self) -> Result<i64, ExpressionError> {
        match self {
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Int(i) => Ok(*i),
            Value::Float(f) if f.is_finite() => Ok(f.trunc() as i64),
            Value::Str(s) => {
                let t = s.trim();
                t.parse::<i64>()
                    .ok()
                    .or_else(|| t.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
                    .ok_or_else(|| ExpressionError::Type(format!("cannot convert `{s}` to int")))
            }
            other => Err(ExpressionError::Type(format!(
                "cannot convert {} to int",
                other.type_name()
            ))),
        }
    }

    /// Convert a stored sample, parsing numeric strings.
    pub fn from_sample(sample: &SampleValue) -> Value {
        match sample {
            SampleValue::Number(n) => Value::Float(*n),
            SampleValue::Text(s) => {
                let t = s.trim();
                if let Ok(i) = t.parse::<i64>() {
                    Value::Int(i)
                } else if let Ok(f) = t.parse::<f64>() {
                    Value::Float(f)
                } else {
                    Value::Str(s.clone())
                }
            }
        }
    }
}

impl From<&Literal> for Value {
    fn from(lit: &Literal) -> Self {
        match lit {
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::Str(s) => Value::Str(s.clone()),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Null => Value::Null,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        values_equal(self, other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Dict(pairs) => {
                f.write_str("{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

fn dict_get<'a>(pairs: &'a [(Value, Value)], key: &Value) -> Option<&'a Value> {
    pairs.iter().rev().find(|(k, _)| values_equal(k, key)).map(|(_, v)| v)
}

/// Equality across types is false; numbers compare numerically.
fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (a.as_num(), b.as_num()) {
        return match (x, y) {
            (Num::Int(x), Num::Int(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        };
    }
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Dict(x), Value::Dict(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| dict_get(y, k).is_some_and(|other| values_equal(v, other)))
        }
        _ => false,
    }
}

fn overflow(op: impl fmt::Display) -> ExpressionError {
    ExpressionError::Type(format!("integer overflow in `{op}`"))
}

fn null_check(op: impl fmt::Display, left: &Value, right: &Value) -> Result<(), ExpressionError> {
    if left.is_null() || right.is_null() {
        return Err(ExpressionError::NullOperand(op.to_string()));
    }
    Ok(())
}

fn mismatch(op: impl fmt::Display, left: &Value, right: &Value) -> ExpressionError {
    ExpressionError::Type(format!(
        "unsupported operand types for `{op}`: {} and {}",
        left.type_name(),
        right.type_name()
    ))
}

fn op_symbol(op: ArithmeticOp) -> &'static str {
    match op {
        ArithmeticOp::Add => "+",
        ArithmeticOp::Sub => "-",
        ArithmeticOp::Mul => "*",
        ArithmeticOp::Div => "/",
        ArithmeticOp::Mod => "%",
    }
}

/// `%` with the sign of the divisor.
fn float_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

pub fn arithmetic(op: ArithmeticOp, left: &Value, right: &Value) -> ValueResult {
    let sym = op_symbol(op);
    null_check(sym, left, right)?;

    if let (ArithmeticOp::Add, Value::Str(a), Value::Str(b)) = (op, left, right) {
        return Ok(Value::Str(format!("{a}{b}")));
    }

    let (Some(a), Some(b)) = (left.as_num(), right.as_num()) else {
        return Err(mismatch(sym, left, right));
    };

    if matches!(op, ArithmeticOp::Div | ArithmeticOp::Mod) && b.as_f64() == 0.0 {
        return Err(ExpressionError::DivideByZero);
    }

    match (a, b) {
        (Num::Int(x), Num::Int(y)) => match op {
            ArithmeticOp::Add => x.checked_add(y).map(Value::Int).ok_or_else(|| overflow(sym)),
            ArithmeticOp::Sub => x.checked_sub(y).map(Value::Int).ok_or_else(|| overflow(sym)),
            ArithmeticOp::Mul => x.checked_mul(y).map(Value::Int).ok_or_else(|| overflow(sym)),
            ArithmeticOp::Div => Ok(Value::Float(x as f64 / y as f64)),
            ArithmeticOp::Mod => {
                let r = x.checked_rem(y).ok_or_else(|| overflow(sym))?;
                Ok(Value::Int(if r != 0 && (r < 0) != (y < 0) { r + y } else { r }))
            }
        },
        _ => {
            let (x, y) = (a.as_f64(), b.as_f64());
            Ok(Value::Float(match op {
                ArithmeticOp::Add => x + y,
                ArithmeticOp::Sub => x - y,
                ArithmeticOp::Mul => x * y,
                ArithmeticOp::Div => x / y,
                ArithmeticOp::Mod => float_mod(x, y),
            }))
        }
    }
}

pub fn compare(op: ComparisonOp, left: &Value, right: &Value) -> ValueResult {
    let sym = match op {
        ComparisonOp::Gt => ">",
        ComparisonOp::Lt => "<",
        ComparisonOp::Ge => ">=",
        ComparisonOp::Le => "<=",
        ComparisonOp::Eq => "==",
        ComparisonOp::Ne => "!=",
    };
    null_check(sym, left, right)?;

    if matches!(op, ComparisonOp::Eq | ComparisonOp::Ne) {
        let equal = values_equal(left, right);
        return Ok(Value::Bool(if op == ComparisonOp::Eq { equal } else { !equal }));
    }

    let ordering = match (left.as_num(), right.as_num()) {
        (Some(Num::Int(x)), Some(Num::Int(y))) => Some(x.cmp(&y)),
        (Some(x), Some(y)) => x.as_f64().partial_cmp(&y.as_f64()),
        _ => match (left, right) {
            (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
            _ => return Err(mismatch(sym, left, right)),
        },
    };

    // NaN compares false for every ordering
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    Ok(Value::Bool(match op {
        ComparisonOp::Gt => ordering == Ordering::Greater,
        ComparisonOp::Lt => ordering == Ordering::Less,
        ComparisonOp::Ge => ordering != Ordering::Less,
        ComparisonOp::Le => ordering != Ordering::Greater,
        ComparisonOp::Eq => ordering == Ordering::Equal,
        ComparisonOp::Ne => ordering != Ordering::Equal,
    }))
}

pub fn bitwise(op: BitwiseOp, left: &Value, right: &Value) -> ValueResult {
    let sym = match op {
        BitwiseOp::Shl => "<<",
        BitwiseOp::Shr => ">>",
        BitwiseOp::Or => "|",
        BitwiseOp::And => "&",
        BitwiseOp::Xor => "^",
    };
    null_check(sym, left, right)?;
    let a = left.coerce_int()?;
    let b = right.coerce_int()?;

    let value = match op {
        BitwiseOp::Or => a | b,
        BitwiseOp::And => a & b,
        BitwiseOp::Xor => a ^ b,
        BitwiseOp::Shl | BitwiseOp::Shr if b < 0 => {
            return Err(ExpressionError::Type("negative shift count".into()))
        }
        BitwiseOp::Shl => {
            if a == 0 {
                0
            } else if b >= 64 {
                return Err(overflow(sym));
            } else {
                let shifted = i128::from(a) << b;
                i64::try_from(shifted).map_err(|_| overflow(sym))?
            }
        }
        BitwiseOp::Shr => {
            if b >= 64 {
                if a < 0 { -1 } else { 0 }
            } else {
                a >> b
            }
        }
    };
    Ok(Value::Int(value))
}

/// True iff some key of `left` is present in `right` with an equal value.
pub fn member(left: &Value, right: &Value) -> Result<bool, ExpressionError> {
    match (left, right) {
        (Value::Dict(l), Value::Dict(r)) => Ok(l
            .iter()
            .any(|(k, v)| dict_get(r, k).is_some_and(|rv| values_equal(v, rv)))),
        _ => Err(ExpressionError::Type(format!(
            "membership needs two dicts, got {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

pub fn negate(value: &Value) -> ValueResult {
    match value.as_num() {
        Some(Num::Int(i)) => i.checked_neg().map(Value::Int).ok_or_else(|| overflow("-")),
        Some(Num::Float(f)) => Ok(Value::Float(-f)),
        None => Err(ExpressionError::Type(format!(
            "bad operand type for unary -: {}",
            value.type_name()
        ))),
    }
}

pub fn plus(value: &Value) -> ValueResult {
    match value.as_num() {
        Some(Num::Int(i)) => Ok(Value::Int(i)),
        Some(Num::Float(f)) => Ok(Value::Float(f)),
        None => Err(ExpressionError::Type(format!(
            "bad operand type for unary +: {}",
            value.type_name()
        ))),
    }
}

pub fn invert(value: &Value) -> ValueResult {
    match value {
        Value::Bool(b) => Ok(Value::Int(!i64::from(*b))),
        Value::Int(i) => Ok(Value::Int(!i)),
        other => Err(ExpressionError::Type(format!(
            "bad operand type for unary ~: {}",
            other.type_name()
        ))),
    }
}
