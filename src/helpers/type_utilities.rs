//! Pure type utility functions
//!
//! Functions here need neither flow facts nor the class environment.

use crate::ast::{BinaryOp, Literal};
use crate::types::Type;

/// Whether `s` is a string the runtime treats as an integer array key.
///
/// An optional sign, no leading zeros (except `"0"` itself) and a value within `i64`:
/// `"0"`, `"12"`, `"-3"` and `"+7"` qualify; `"01"`, `"-0"`, `"1.5"` and `""` do not.
pub fn is_int_like(s: &str) -> bool {
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    let signed = digits.len() != s.len();
    let Some(first) = digits.bytes().next() else {
        return false;
    };
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if first == b'0' {
        return !signed && digits.len() == 1;
    }
    let normalized = s.strip_prefix('+').unwrap_or(s);
    normalized.parse::<i64>().is_ok()
}

/// Type of a literal; `false` keeps its own pseudo-type while `true` is plain `bool`.
pub fn literal_type(literal: &Literal) -> Type {
    match literal {
        Literal::Null => Type::Null,
        Literal::Bool(true) => Type::Bool,
        Literal::Bool(false) => Type::False,
        Literal::Int(_) => Type::Int,
        Literal::Float(_) => Type::Float,
        Literal::String(_) => Type::String,
    }
}

/// Result type of an arithmetic operator applied to operands of the given types
pub fn arithmetic_result(op: BinaryOp, left: &Type, right: &Type) -> Type {
    if left.is_never() || right.is_never() {
        return Type::Never;
    }
    match op {
        BinaryOp::Mod => Type::Int,
        BinaryOp::Div => Type::union([Type::Int, Type::Float]),
        _ => match (left, right) {
            (Type::Int, Type::Int) => Type::Int,
            (Type::Float, Type::Int | Type::Float) | (Type::Int, Type::Float) => Type::Float,
            _ => Type::union([Type::Int, Type::Float]),
        },
    }
}

/// Result of unary minus/plus and of increments
pub fn numeric_result(operand: &Type) -> Type {
    match operand {
        Type::Int => Type::Int,
        Type::Float => Type::Float,
        Type::Never => Type::Never,
        _ => Type::union([Type::Int, Type::Float]),
    }
}
