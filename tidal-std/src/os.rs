//! The `os` library: clocks and the environment.

use std::time::{SystemTime, UNIX_EPOCH};

use tidal_runtime::arith::Number;
use tidal_runtime::function::native;
use tidal_runtime::{ExecutionContext, LuaError, TableRef, Value};

use crate::args::{bad_argument, check_number, check_string};
use crate::{library_table, Lib};

pub struct OsLib;

impl Lib for OsLib {
    fn name(&self) -> &'static str {
        "os"
    }

    fn install(&self, env: &TableRef) {
        let os = library_table(env, "os");
        os.set_str("clock", native("os.clock", clock));
        os.set_str("time", native("os.time", time));
        os.set_str("difftime", native("os.difftime", difftime));
        os.set_str("getenv", native("os.getenv", getenv));
    }
}

/// Seconds since the context's clock origin.
fn clock(ctx: &mut ExecutionContext, _: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    let elapsed = ctx.lib_state().clock_origin.elapsed();
    Ok(vec![Value::Float(elapsed.as_secs_f64())])
}

fn time(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    if !matches!(args.first(), None | Some(Value::Nil)) {
        return Err(bad_argument(0, "time", "date tables are not supported"));
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| LuaError::new(format!("time: {}", e)))?;
    Ok(vec![Value::Integer(now.as_secs() as i64)])
}

fn as_f64(n: Number) -> f64 {
    match n {
        Number::Int(i) => i as f64,
        Number::Float(f) => f,
    }
}

fn difftime(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    let t2 = as_f64(check_number(&args, 0, "difftime")?);
    let t1 = match args.get(1) {
        None | Some(Value::Nil) => 0.0,
        Some(_) => as_f64(check_number(&args, 1, "difftime")?),
    };
    Ok(vec![Value::Float(t2 - t1)])
}

fn getenv(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    let name = check_string(&args, 0, "getenv")?;
    Ok(vec![std::env::var(name).map_or(Value::Nil, Value::from)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidal_runtime::Executor;

    fn call(name: &str, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
        let env = TableRef::new();
        OsLib.install(&env);
        let lib = env.get_str("os").as_table().cloned().unwrap();
        let f = lib.get_str(name).as_function().cloned().unwrap();
        Executor::call(&mut ExecutionContext::new(), f, args)
            .map_err(|e| e.as_failure().cloned().unwrap())
    }

    #[test]
    fn test_clock_is_non_negative_float() {
        match call("clock", vec![]).unwrap().as_slice() {
            [Value::Float(f)] => assert!(*f >= 0.0),
            other => panic!("unexpected clock result {:?}", other),
        }
    }

    #[test]
    fn test_time_is_after_epoch() {
        match call("time", vec![]).unwrap().as_slice() {
            [Value::Integer(t)] => assert!(*t > 1_600_000_000),
            other => panic!("unexpected time result {:?}", other),
        }
        assert!(call("time", vec![TableRef::new().into()]).is_err());
    }

    #[test]
    fn test_difftime() {
        let d = call("difftime", vec![Value::Integer(10), Value::Float(2.5)]).unwrap();
        assert_eq!(d, vec![Value::Float(7.5)]);
        let err = call("difftime", vec![Value::from("x")]).unwrap_err();
        assert_eq!(
            err.message(),
            "bad argument #1 to 'difftime' (number expected, got string)"
        );
    }

    #[test]
    fn test_getenv() {
        let path = call("getenv", vec![Value::from("PATH")]).unwrap();
        assert_eq!(path.len(), 1);
        let missing = call("getenv", vec![Value::from("TIDAL_SURELY_UNSET_VARIABLE")]).unwrap();
        assert_eq!(missing, vec![Value::Nil]);
    }
}
