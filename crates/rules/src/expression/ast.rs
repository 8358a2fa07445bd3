//! Condition syntax tree.

use std::fmt;

/// Target name a call falls back to when written without `x.`.
pub const DEFAULT_TARGET: &str = "default";

/// Constant values that can appear in a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

/// Units accepted by time filters such as `50s` or `2h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            's' => Some(TimeUnit::Seconds),
            'm' => Some(TimeUnit::Minutes),
            'h' => Some(TimeUnit::Hours),
            _ => None,
        }
    }

    pub fn multiplier(self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3600.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitwiseOp {
    Shl,
    Shr,
    Or,
    And,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberOp {
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Arithmetic(ArithmeticOp),
    Comparison(ComparisonOp),
    Logical(LogicalOp),
    Bitwise(BitwiseOp),
    Member(MemberOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
    Invert,
}

/// Longest look-back a time filter may ask for: 30 days.
pub const MAX_TIME_FILTER_SECONDS: i64 = 30 * 86_400;

/// A compiled condition node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// Data reference such as `$0`.
    Name(String),
    /// `key: value` entry of a dict literal.
    Pair(Box<Expr>, Box<Expr>),
    Dict(Vec<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Conditional {
        predicate: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    TimeFilter {
        amount: f64,
        unit: TimeUnit,
    },
    FunctionCall {
        name: String,
        target: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Seconds of a time filter node; `None` for every other node.
    pub fn time_filter_seconds(&self) -> Option<i64> {
        match self {
            Expr::TimeFilter { amount, unit } => Some((amount * unit.multiplier()) as i64),
            _ => None,
        }
    }
}

/// Largest time filter anywhere in the tree, or 0 without one.
pub fn max_time_filter(expr: &Expr) -> i64 {
    match expr {
        Expr::TimeFilter { .. } => expr.time_filter_seconds().unwrap_or(0),
        Expr::Literal(_) | Expr::Name(_) => 0,
        Expr::Pair(key, value) => max_time_filter(key).max(max_time_filter(value)),
        Expr::Dict(pairs) => pairs.iter().map(max_time_filter).max().unwrap_or(0),
        Expr::Binary { left, right, .. } => max_time_filter(left).max(max_time_filter(right)),
        Expr::Unary { operand, .. } => max_time_filter(operand),
        Expr::Conditional {
            predicate,
            if_true,
            if_false,
        } => max_time_filter(predicate)
            .max(max_time_filter(if_true))
            .max(max_time_filter(if_false)),
        Expr::FunctionCall { args, .. } => args.iter().map(max_time_filter).max().unwrap_or(0),
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Arithmetic(ArithmeticOp::Add) => "+",
            BinaryOp::Arithmetic(ArithmeticOp::Sub) => "-",
            BinaryOp::Arithmetic(ArithmeticOp::Mul) => "*",
            BinaryOp::Arithmetic(ArithmeticOp::Div) => "/",
            BinaryOp::Arithmetic(ArithmeticOp::Mod) => "%",
            BinaryOp::Comparison(ComparisonOp::Gt) => ">",
            BinaryOp::Comparison(ComparisonOp::Lt) => "<",
            BinaryOp::Comparison(ComparisonOp::Ge) => ">=",
            BinaryOp::Comparison(ComparisonOp::Le) => "<=",
            BinaryOp::Comparison(ComparisonOp::Eq) => "==",
            BinaryOp::Comparison(ComparisonOp::Ne) => "!=",
            BinaryOp::Logical(LogicalOp::And) => "&&",
            BinaryOp::Logical(LogicalOp::Or) => "||",
            BinaryOp::Bitwise(BitwiseOp::Shl) => "<<",
            BinaryOp::Bitwise(BitwiseOp::Shr) => ">>",
            BinaryOp::Bitwise(BitwiseOp::Or) => "|",
            BinaryOp::Bitwise(BitwiseOp::And) => "&",
            BinaryOp::Bitwise(BitwiseOp::Xor) => "^",
            BinaryOp::Member(MemberOp::In) => "in",
            BinaryOp::Member(MemberOp::NotIn) => "notin",
        };
        f.write_str(s)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Plus => "+",
            UnaryOp::Minus => "-",
            UnaryOp::Not => "!",
            UnaryOp::Invert => "~",
        };
        f.write_str(s)
    }
}
