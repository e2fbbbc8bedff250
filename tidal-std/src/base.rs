//! Base library: the global functions.

use tidal_runtime::arith::parse_number;
use tidal_runtime::function::native;
use tidal_runtime::{ExecutionContext, LuaError, TableRef, Value};

use crate::args::{arg, bad_argument, check_any, check_integer, check_string, check_table, opt_integer};
use crate::Lib;

pub struct BaseLib;

impl Lib for BaseLib {
    fn name(&self) -> &'static str {
        "base"
    }

    fn install(&self, env: &TableRef) {
        env.set_str("_G", env.clone().into());
        env.set_str("print", native("print", print));
        env.set_str("type", native("type", type_));
        env.set_str("tostring", native("tostring", tostring));
        env.set_str("tonumber", native("tonumber", tonumber));
        env.set_str("select", native("select", select));
        env.set_str("error", native("error", error));
        env.set_str("assert", native("assert", assert));
        env.set_str("rawequal", native("rawequal", rawequal));
        env.set_str("rawget", native("rawget", rawget));
        env.set_str("rawset", native("rawset", rawset));
        env.set_str("rawlen", native("rawlen", rawlen));

        let next = native("next", next);
        env.set_str("next", next.clone());
        env.set_str(
            "pairs",
            native("pairs", move |_, args| {
                let t = check_table(&args, 0, "pairs")?;
                Ok(vec![next.clone(), t.into(), Value::Nil])
            }),
        );

        let step = native("ipairs_iterator", ipairs_step);
        env.set_str(
            "ipairs",
            native("ipairs", move |_, args| {
                let t = check_table(&args, 0, "ipairs")?;
                Ok(vec![step.clone(), t.into(), Value::Integer(0)])
            }),
        );
    }
}

/// Write `text` to the context's output handle.
pub(crate) fn write_output(ctx: &ExecutionContext, func: &str, text: &str) -> Result<(), LuaError> {
    ctx.lib_state()
        .output
        .write_str(text)
        .map_err(|e| LuaError::new(format!("{}: {}", func, e)))
}

fn print(ctx: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    let mut line = args
        .iter()
        .map(Value::to_display)
        .collect::<Vec<_>>()
        .join("\t");
    line.push('\n');
    write_output(ctx, "print", &line)?;
    Ok(vec![])
}

fn type_(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    let v = check_any(&args, 0, "type")?;
    Ok(vec![Value::from(v.type_name())])
}

fn tostring(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    let v = check_any(&args, 0, "tostring")?;
    Ok(vec![Value::from(v.to_display())])
}

fn tonumber(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    if matches!(args.get(1), None | Some(Value::Nil)) {
        let v = check_any(&args, 0, "tonumber")?;
        let n = match &v {
            Value::Integer(_) | Value::Float(_) => v,
            Value::String(s) => parse_number(s).map_or(Value::Nil, Value::from),
            _ => Value::Nil,
        };
        return Ok(vec![n]);
    }

    let base = check_integer(&args, 1, "tonumber")?;
    if !(2..=36).contains(&base) {
        return Err(bad_argument(1, "tonumber", "base out of range"));
    }
    let digits = check_string(&args, 0, "tonumber")?;
    Ok(vec![parse_in_base(&digits, base as u32).map_or(Value::Nil, Value::Integer)])
}

/// Parse an integer numeral in `base`, wrapping on overflow.
fn parse_in_base(s: &str, base: u32) -> Option<i64> {
    let s = s.trim();
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if body.is_empty() {
        return None;
    }
    let mut n: i64 = 0;
    for c in body.chars() {
        let digit = c.to_digit(base)?;
        n = n.wrapping_mul(base as i64).wrapping_add(digit as i64);
    }
    Some(if negative { n.wrapping_neg() } else { n })
}

fn select(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    let count = args.len().saturating_sub(1) as i64;
    if let Some(Value::String(s)) = args.first() {
        if &**s == "#" {
            return Ok(vec![Value::Integer(count)]);
        }
    }
    let n = check_integer(&args, 0, "select")?;
    let start = if n < 0 { count + n } else { n - 1 };
    if n == 0 || start < 0 {
        return Err(bad_argument(0, "select", "index out of range"));
    }
    Ok(args.into_iter().skip(1 + start as usize).collect())
}

/// `error(message [, level])`. String messages get the position of the
/// frame `level` steps out; other values are raised as they are.
fn error(ctx: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    let value = arg(&args, 0);
    let level = opt_integer(&args, 1, "error", 1)?;
    let at = usize::try_from(level).ok().and_then(|level| ctx.location(level));
    match (&value, at) {
        (Value::String(msg), Some(at)) => {
            Err(LuaError::from_value(Value::string(format!("{}: {}", at, msg))))
        }
        _ => Err(LuaError::from_value(value)),
    }
}

fn assert(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    let v = check_any(&args, 0, "assert")?;
    if v.is_truthy() {
        return Ok(args);
    }
    match args.get(1) {
        Some(msg) => Err(LuaError::from_value(msg.clone())),
        None => Err(LuaError::new("assertion failed!")),
    }
}

fn rawequal(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    let a = check_any(&args, 0, "rawequal")?;
    let b = check_any(&args, 1, "rawequal")?;
    Ok(vec![Value::Boolean(a.raw_equals(&b))])
}

fn rawget(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    let t = check_table(&args, 0, "rawget")?;
    Ok(vec![t.get(&arg(&args, 1))])
}

fn rawset(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    let t = check_table(&args, 0, "rawset")?;
    check_any(&args, 2, "rawset")?;
    t.set(arg(&args, 1), arg(&args, 2))?;
    Ok(vec![t.into()])
}

fn rawlen(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    match args.first() {
        Some(Value::Table(t)) => Ok(vec![Value::Integer(t.len())]),
        Some(Value::String(s)) => Ok(vec![Value::Integer(s.len() as i64)]),
        _ => Err(bad_argument(0, "rawlen", "table or string expected")),
    }
}

fn next(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    let t = check_table(&args, 0, "next")?;
    match t.next(&arg(&args, 1))? {
        Some((k, v)) => Ok(vec![k, v]),
        None => Ok(vec![Value::Nil]),
    }
}

fn ipairs_step(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    let t = check_table(&args, 0, "ipairs_iterator")?;
    let i = check_integer(&args, 1, "ipairs_iterator")?.wrapping_add(1);
    let v = t.get(&Value::Integer(i));
    if v.is_nil() {
        Ok(vec![Value::Nil])
    } else {
        Ok(vec![Value::Integer(i), v])
    }
}
