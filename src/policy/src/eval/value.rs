//! Runtime value semantics over JSON values
//!
//! Evaluation never fails: reads through missing properties, non-object
//! receivers or out-of-range indices produce `null`, and arithmetic that
//! leaves the finite range produces `null` as well.

use serde_json::{Number, Value};

use crate::model::{BinaryOp, UnaryOp};

/// Shared `null` for reads that find nothing
pub static NULL: Value = Value::Null;

/// Field carrying the concept name of an object for `is` tests
pub const TYPE_TAG: &str = "$type";

/// JSON number from `value`, or `null` when it is NaN or infinite
pub fn number(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub fn get_property(receiver: &Value, property: &str) -> Value {
    match receiver {
        Value::Object(map) => map.get(property).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

pub fn array_get(receiver: &Value, index: &Value) -> Value {
    let (Value::Array(items), Some(index)) = (receiver, index.as_f64()) else {
        return Value::Null;
    };
    if index < 0.0 || index.fract() != 0.0 {
        return Value::Null;
    }
    items.get(index as usize).cloned().unwrap_or(Value::Null)
}

/// Concept tag of an object value
pub fn type_tag(value: &Value) -> Option<&str> {
    value.get(TYPE_TAG)?.as_str()
}

/// Strict equality: numbers by value, everything else structurally
pub fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Apply `operator` to two evaluated operands
///
/// `&&` and `||` return one of their operands as-is.
pub fn binary(operator: BinaryOp, left: &Value, right: &Value) -> Value {
    use BinaryOp::*;

    match operator {
        And => {
            if truthy(left) {
                right.clone()
            } else {
                left.clone()
            }
        }
        Or => {
            if truthy(left) {
                left.clone()
            } else {
                right.clone()
            }
        }
        Eq => Value::Bool(strict_equals(left, right)),
        Ne => Value::Bool(!strict_equals(left, right)),
        Lt | Le | Gt | Ge => Value::Bool(compare(operator, left, right)),
        Add => match (left, right) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                Value::String(format!("{}{}", to_text(left), to_text(right)))
            }
            _ => arithmetic(left, right, |a, b| a + b),
        },
        Sub => arithmetic(left, right, |a, b| a - b),
        Mul => arithmetic(left, right, |a, b| a * b),
        Div => arithmetic(left, right, |a, b| a / b),
        Rem => arithmetic(left, right, |a, b| a % b),
        In => Value::Bool(match right {
            Value::Array(items) => items.iter().any(|item| strict_equals(left, item)),
            _ => false,
        }),
    }
}

fn compare(operator: BinaryOp, left: &Value, right: &Value) -> bool {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match operator {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Ge => ordering.is_ge(),
        _ => false,
    }
}

fn arithmetic(left: &Value, right: &Value, op: impl Fn(f64, f64) -> f64) -> Value {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => number(op(a, b)),
        _ => Value::Null,
    }
}

pub fn unary(operator: UnaryOp, operand: &Value) -> Value {
    match operator {
        UnaryOp::Not => Value::Bool(!truthy(operand)),
        UnaryOp::Neg => operand.as_f64().map(|n| number(-n)).unwrap_or(Value::Null),
        UnaryOp::Plus => operand.as_f64().map(number).unwrap_or(Value::Null),
    }
}
