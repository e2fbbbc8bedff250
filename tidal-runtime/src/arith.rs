//! Lua 5.3 operators: arithmetic, bitwise, comparison, concatenation and
//! length, with string/number coercion.
//!
//! Integer arithmetic wraps on overflow. `/` and `^` always produce floats.
//! Metamethods are not consulted.

use std::cmp::Ordering;

use crate::error::LuaError;
use crate::value::{float_to_integer, Value};

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    Len,
    BNot,
}

/// A coerced numeric operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(i) => Value::Integer(i),
            Number::Float(f) => Value::Float(f),
        }
    }
}

/// Apply a binary operator.
pub fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, LuaError> {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::IDiv
        | BinaryOp::Mod | BinaryOp::Pow => arithmetic(op, lhs, rhs),
        BinaryOp::BAnd | BinaryOp::BOr | BinaryOp::BXor | BinaryOp::Shl | BinaryOp::Shr => {
            bitwise(op, lhs, rhs)
        }
        BinaryOp::Concat => concat(lhs, rhs),
        BinaryOp::Eq => Ok(Value::Boolean(lhs.raw_equals(rhs))),
        BinaryOp::Ne => Ok(Value::Boolean(!lhs.raw_equals(rhs))),
        BinaryOp::Lt => Ok(Value::Boolean(compare(lhs, rhs)? == Some(Ordering::Less))),
        BinaryOp::Le => Ok(Value::Boolean(matches!(
            compare(lhs, rhs)?,
            Some(Ordering::Less | Ordering::Equal)
        ))),
    }
}

/// Apply a unary operator.
pub fn unary(op: UnaryOp, operand: &Value) -> Result<Value, LuaError> {
    match op {
        UnaryOp::Not => Ok(Value::Boolean(!operand.is_truthy())),
        UnaryOp::Neg => match to_number(operand) {
            Some(Number::Int(i)) => Ok(Value::Integer(i.wrapping_neg())),
            Some(Number::Float(f)) => Ok(Value::Float(-f)),
            None => Err(arith_error(operand)),
        },
        UnaryOp::Len => match operand {
            Value::String(s) => Ok(Value::Integer(s.len() as i64)),
            Value::Table(t) => Ok(Value::Integer(t.len())),
            other => Err(LuaError::new(format!(
                "attempt to get length of a {} value",
                other.type_name()
            ))),
        },
        UnaryOp::BNot => Ok(Value::Integer(!to_bit_integer(operand)?)),
    }
}

/// Coerce a value to a number: numbers as-is, numeric strings parsed.
pub fn to_number(v: &Value) -> Option<Number> {
    match v {
        Value::Integer(i) => Some(Number::Int(*i)),
        Value::Float(f) => Some(Number::Float(*f)),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// Parse a Lua numeric literal with surrounding whitespace.
pub fn parse_number(s: &str) -> Option<Number> {
    let s = s.trim();
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if body.is_empty() {
        return None;
    }

    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        // Hex integers wrap around modulo 2^64.
        let n = hex.bytes().fold(0u64, |acc, b| {
            acc.wrapping_mul(16)
                .wrapping_add((b as char).to_digit(16).unwrap_or(0) as u64)
        }) as i64;
        return Some(Number::Int(if negative { n.wrapping_neg() } else { n }));
    }

    if !body
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return None;
    }
    if body.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(i) = s.parse::<i64>() {
            return Some(Number::Int(i));
        }
    }
    s.parse::<f64>().ok().map(Number::Float)
}

fn arith_error(v: &Value) -> LuaError {
    LuaError::new(format!(
        "attempt to perform arithmetic on a {} value",
        v.type_name()
    ))
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, LuaError> {
    let a = to_number(lhs).ok_or_else(|| arith_error(lhs))?;
    let b = to_number(rhs).ok_or_else(|| arith_error(rhs))?;

    let result = match (op, a, b) {
        (BinaryOp::Div, a, b) => Number::Float(a.as_f64() / b.as_f64()),
        (BinaryOp::Pow, a, b) => Number::Float(a.as_f64().powf(b.as_f64())),
        (_, Number::Int(x), Number::Int(y)) => Number::Int(int_arith(op, x, y)?),
        (_, a, b) => Number::Float(float_arith(op, a.as_f64(), b.as_f64())),
    };
    Ok(result.into())
}

fn int_arith(op: BinaryOp, x: i64, y: i64) -> Result<i64, LuaError> {
    Ok(match op {
        BinaryOp::Add => x.wrapping_add(y),
        BinaryOp::Sub => x.wrapping_sub(y),
        BinaryOp::Mul => x.wrapping_mul(y),
        BinaryOp::IDiv => {
            if y == 0 {
                return Err(LuaError::new("attempt to perform 'n//0'"));
            }
            let q = x.wrapping_div(y);
            if x.wrapping_rem(y) != 0 && (x ^ y) < 0 {
                q - 1
            } else {
                q
            }
        }
        BinaryOp::Mod => {
            if y == 0 {
                return Err(LuaError::new("attempt to perform 'n%0'"));
            }
            let r = x.wrapping_rem(y);
            if r != 0 && (r ^ y) < 0 {
                r + y
            } else {
                r
            }
        }
        _ => unreachable!("not an integer arithmetic operator: {:?}", op),
    })
}

fn float_arith(op: BinaryOp, x: f64, y: f64) -> f64 {
    match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::IDiv => (x / y).floor(),
        BinaryOp::Mod => {
            let m = x % y;
            if m != 0.0 && (m < 0.0) != (y < 0.0) {
                m + y
            } else {
                m
            }
        }
        _ => unreachable!("not a float arithmetic operator: {:?}", op),
    }
}

fn to_bit_integer(v: &Value) -> Result<i64, LuaError> {
    match to_number(v) {
        Some(Number::Int(i)) => Ok(i),
        Some(Number::Float(f)) => float_to_integer(f)
            .ok_or_else(|| LuaError::new("number has no integer representation")),
        None => Err(LuaError::new(format!(
            "attempt to perform bitwise operation on a {} value",
            v.type_name()
        ))),
    }
}

fn shift_left(x: i64, n: i64) -> i64 {
    if n <= -64 || n >= 64 {
        0
    } else if n >= 0 {
        ((x as u64) << n) as i64
    } else {
        ((x as u64) >> (-n)) as i64
    }
}

fn bitwise(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, LuaError> {
    let a = to_bit_integer(lhs)?;
    let b = to_bit_integer(rhs)?;
    let r = match op {
        BinaryOp::BAnd => a & b,
        BinaryOp::BOr => a | b,
        BinaryOp::BXor => a ^ b,
        BinaryOp::Shl => shift_left(a, b),
        BinaryOp::Shr => shift_left(a, b.wrapping_neg()),
        _ => unreachable!("not a bitwise operator: {:?}", op),
    };
    Ok(Value::Integer(r))
}

fn concat_piece(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.to_string()),
        Value::Integer(_) | Value::Float(_) => Some(v.to_display()),
        _ => None,
    }
}

fn concat(lhs: &Value, rhs: &Value) -> Result<Value, LuaError> {
    let bad = |v: &Value| {
        LuaError::new(format!("attempt to concatenate a {} value", v.type_name()))
    };
    let mut s = concat_piece(lhs).ok_or_else(|| bad(lhs))?;
    s.push_str(&concat_piece(rhs).ok_or_else(|| bad(rhs))?);
    Ok(Value::from(s))
}

/// Order two values. `None` means unordered (a NaN operand).
pub fn compare(lhs: &Value, rhs: &Value) -> Result<Option<Ordering>, LuaError> {
    match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => Ok(Some(a.cmp(b))),
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            let a = to_number(lhs).map(Number::as_f64).unwrap_or(f64::NAN);
            let b = to_number(rhs).map(Number::as_f64).unwrap_or(f64::NAN);
            Ok(a.partial_cmp(&b))
        }
        (Value::String(a), Value::String(b)) => Ok(Some(a.as_bytes().cmp(b.as_bytes()))),
        (a, b) if a.type_name() == b.type_name() => Err(LuaError::new(format!(
            "attempt to compare two {} values",
            a.type_name()
        ))),
        (a, b) => Err(LuaError::new(format!(
            "attempt to compare {} with {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}
