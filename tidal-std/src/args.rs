//! Argument checking shared by the library functions.
//!
//! Errors follow the `bad argument #n to 'f' (...)` shape.

use tidal_runtime::arith::{to_number, Number};
use tidal_runtime::value::float_to_integer;
use tidal_runtime::{FunctionRef, LuaError, TableRef, Value};

/// The `n`-th argument (0-based), or nil when absent.
pub fn arg(args: &[Value], n: usize) -> Value {
    args.get(n).cloned().unwrap_or_default()
}

pub fn bad_argument(n: usize, func: &str, msg: impl AsRef<str>) -> LuaError {
    LuaError::new(format!("bad argument #{} to '{}' ({})", n + 1, func, msg.as_ref()))
}

fn type_of(args: &[Value], n: usize) -> &'static str {
    args.get(n).map_or("no value", |v| v.type_name())
}

fn expected(args: &[Value], n: usize, func: &str, what: &str) -> LuaError {
    bad_argument(n, func, format!("{} expected, got {}", what, type_of(args, n)))
}

/// Fail unless the argument is present, whatever its value.
pub fn check_any(args: &[Value], n: usize, func: &str) -> Result<Value, LuaError> {
    args.get(n)
        .cloned()
        .ok_or_else(|| bad_argument(n, func, "value expected"))
}

pub fn check_table(args: &[Value], n: usize, func: &str) -> Result<TableRef, LuaError> {
    match args.get(n) {
        Some(Value::Table(t)) => Ok(t.clone()),
        _ => Err(expected(args, n, func, "table")),
    }
}

pub fn check_number(args: &[Value], n: usize, func: &str) -> Result<Number, LuaError> {
    args.get(n)
        .and_then(to_number)
        .ok_or_else(|| expected(args, n, func, "number"))
}

pub fn check_integer(args: &[Value], n: usize, func: &str) -> Result<i64, LuaError> {
    match args.get(n).and_then(to_number) {
        Some(Number::Int(i)) => Ok(i),
        Some(Number::Float(f)) => float_to_integer(f)
            .ok_or_else(|| bad_argument(n, func, "number has no integer representation")),
        None => Err(expected(args, n, func, "number")),
    }
}

/// An optional integer: nil or absent gives `default`.
pub fn opt_integer(args: &[Value], n: usize, func: &str, default: i64) -> Result<i64, LuaError> {
    match args.get(n) {
        None | Some(Value::Nil) => Ok(default),
        Some(_) => check_integer(args, n, func),
    }
}

/// A string argument; numbers convert.
pub fn check_string(args: &[Value], n: usize, func: &str) -> Result<String, LuaError> {
    match args.get(n) {
        Some(Value::String(s)) => Ok(s.to_string()),
        Some(v @ (Value::Integer(_) | Value::Float(_))) => Ok(v.to_display()),
        _ => Err(expected(args, n, func, "string")),
    }
}

pub fn opt_string(
    args: &[Value],
    n: usize,
    func: &str,
    default: &str,
) -> Result<String, LuaError> {
    match args.get(n) {
        None | Some(Value::Nil) => Ok(default.to_string()),
        Some(_) => check_string(args, n, func),
    }
}

/// An optional function: nil or absent gives `None`.
pub fn opt_function(args: &[Value], n: usize, func: &str) -> Result<Option<FunctionRef>, LuaError> {
    match args.get(n) {
        None | Some(Value::Nil) => Ok(None),
        Some(Value::Function(f)) => Ok(Some(f.clone())),
        Some(_) => Err(expected(args, n, func, "function")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_argument_reports_no_value() {
        let err = check_table(&[], 0, "insert").unwrap_err();
        assert_eq!(
            err.message(),
            "bad argument #1 to 'insert' (table expected, got no value)"
        );
    }

    #[test]
    fn test_integer_coercions() {
        let args = [Value::Float(3.0), Value::from("7"), Value::Float(1.5)];
        assert_eq!(check_integer(&args, 0, "f").unwrap(), 3);
        assert_eq!(check_integer(&args, 1, "f").unwrap(), 7);
        assert_eq!(
            check_integer(&args, 2, "f").unwrap_err().message(),
            "bad argument #3 to 'f' (number has no integer representation)"
        );
    }

    #[test]
    fn test_optional_defaults() {
        let args = [Value::Nil];
        assert_eq!(opt_integer(&args, 0, "f", 9).unwrap(), 9);
        assert_eq!(opt_string(&args, 3, "f", ",").unwrap(), ",");
    }

    #[test]
    fn test_numbers_are_strings() {
        assert_eq!(check_string(&[Value::Integer(12)], 0, "f").unwrap(), "12");
        assert!(check_string(&[Value::Boolean(true)], 0, "f").is_err());
    }

    #[test]
    fn test_optional_function() {
        assert!(opt_function(&[Value::Nil], 0, "sort").unwrap().is_none());
        assert_eq!(
            opt_function(&[Value::Nil, Value::Integer(1)], 1, "sort")
                .unwrap_err()
                .message(),
            "bad argument #2 to 'sort' (function expected, got number)"
        );
    }
}
