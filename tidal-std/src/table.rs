//! The `table` library.

use tidal_runtime::function::native;
use tidal_runtime::{ExecutionContext, LuaError, TableRef, Value};

use crate::args::{arg, bad_argument, check_integer, check_table, opt_integer, opt_string};
use crate::sort::Sort;
use crate::{library_table, Lib};

/// Largest sequence `unpack` will spread.
const MAX_UNPACK: i64 = 1 << 20;

pub struct TableLib;

impl Lib for TableLib {
    fn name(&self) -> &'static str {
        "table"
    }

    fn install(&self, env: &TableRef) {
        let table = library_table(env, "table");
        table.set_str("insert", native("table.insert", insert));
        table.set_str("move", native("table.move", move_elements));
        table.set_str("remove", native("table.remove", remove));
        table.set_str("sort", Sort::new().into_ref().into());
        table.set_str("concat", native("table.concat", concat));
        table.set_str("pack", native("table.pack", pack));
        table.set_str("unpack", native("table.unpack", unpack));
    }
}

fn geti(t: &TableRef, i: i64) -> Value {
    t.get(&Value::Integer(i))
}

fn seti(t: &TableRef, i: i64, v: Value) -> Result<(), LuaError> {
    t.set(Value::Integer(i), v)
}

fn insert(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    let t = check_table(&args, 0, "insert")?;
    let end = t.len().wrapping_add(1);
    match args.len() {
        2 => seti(&t, end, arg(&args, 1))?,
        3 => {
            let pos = check_integer(&args, 1, "insert")?;
            if pos < 1 || pos > end {
                return Err(bad_argument(1, "insert", "position out of bounds"));
            }
            for i in (pos + 1..=end).rev() {
                seti(&t, i, geti(&t, i - 1))?;
            }
            seti(&t, pos, arg(&args, 2))?;
        }
        _ => return Err(LuaError::new("wrong number of arguments to 'insert'")),
    }
    Ok(vec![])
}

/// `table.move(a1, f, e, t [, a2])`: copy `a1[f..=e]` to `a2[t..]`,
/// in an order that is safe when the ranges overlap.
fn move_elements(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    let source = check_table(&args, 0, "move")?;
    let first = check_integer(&args, 1, "move")?;
    let last = check_integer(&args, 2, "move")?;
    let target = check_integer(&args, 3, "move")?;
    let dest = match args.get(4) {
        None | Some(Value::Nil) => source.clone(),
        Some(_) => check_table(&args, 4, "move")?,
    };

    if last >= first {
        if !(first > 0 || last < i64::MAX + first) {
            return Err(bad_argument(2, "move", "too many elements to move"));
        }
        let n = last - first;
        if target > i64::MAX - n {
            return Err(bad_argument(3, "move", "destination wrap around"));
        }
        if target > last || target <= first || !dest.ptr_eq(&source) {
            for i in 0..=n {
                seti(&dest, target + i, geti(&source, first + i))?;
            }
        } else {
            for i in (0..=n).rev() {
                seti(&dest, target + i, geti(&source, first + i))?;
            }
        }
    }
    Ok(vec![dest.into()])
}

fn remove(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    let t = check_table(&args, 0, "remove")?;
    let size = t.len();
    let mut pos = opt_integer(&args, 1, "remove", size)?;
    if args.len() > 1 && size.wrapping_add(1) != pos && (pos < 1 || pos > size.wrapping_add(1)) {
        return Err(bad_argument(1, "remove", "position out of bounds"));
    }
    let removed = geti(&t, pos);
    while pos < size {
        seti(&t, pos, geti(&t, pos + 1))?;
        pos += 1;
    }
    seti(&t, pos, Value::Nil)?;
    Ok(vec![removed])
}

fn concat(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    let t = check_table(&args, 0, "concat")?;
    let sep = opt_string(&args, 1, "concat", "")?;
    let first = opt_integer(&args, 2, "concat", 1)?;
    let last = opt_integer(&args, 3, "concat", t.len())?;

    let mut out = String::new();
    let mut i = first;
    while i <= last {
        match geti(&t, i) {
            v @ (Value::String(_) | Value::Integer(_) | Value::Float(_)) => {
                out.push_str(&v.to_display())
            }
            other => {
                return Err(LuaError::new(format!(
                    "invalid value (at index {}) in table for 'concat' ({})",
                    i,
                    other.type_name()
                )))
            }
        }
        if i == last {
            break;
        }
        out.push_str(&sep);
        i += 1;
    }
    Ok(vec![Value::from(out)])
}

fn pack(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    let n = args.len() as i64;
    let t = TableRef::from_sequence(args);
    t.set_str("n", Value::Integer(n));
    Ok(vec![t.into()])
}

fn unpack(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    let t = check_table(&args, 0, "unpack")?;
    let first = opt_integer(&args, 1, "unpack", 1)?;
    let last = opt_integer(&args, 2, "unpack", t.len())?;
    if first > last {
        return Ok(vec![]);
    }
    match last.checked_sub(first) {
        Some(n) if n < MAX_UNPACK => Ok((first..=last).map(|i| geti(&t, i)).collect()),
        _ => Err(LuaError::new("too many results to unpack")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidal_runtime::Executor;

    fn call(name: &str, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
        let env = TableRef::new();
        TableLib.install(&env);
        let lib = env.get_str("table").as_table().cloned().unwrap();
        let f = lib.get_str(name).as_function().cloned().unwrap();
        Executor::call(&mut ExecutionContext::new(), f, args)
            .map_err(|e| e.as_failure().cloned().unwrap())
    }

    fn seq(items: &[&str]) -> TableRef {
        TableRef::from_sequence(items.iter().map(|s| Value::from(*s)))
    }

    fn items(t: &TableRef) -> Vec<String> {
        (1..=t.len()).map(|i| geti(t, i).to_display()).collect()
    }

    #[test]
    fn test_insert_append_and_shift() {
        let t = seq(&["a", "c"]);
        call("insert", vec![t.clone().into(), Value::from("d")]).unwrap();
        call("insert", vec![t.clone().into(), Value::Integer(2), Value::from("b")]).unwrap();
        assert_eq!(items(&t), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_insert_bounds() {
        let t = seq(&["a"]);
        let err = call("insert", vec![t.clone().into(), Value::Integer(5), Value::from("x")])
            .unwrap_err();
        assert_eq!(err.message(), "bad argument #2 to 'insert' (position out of bounds)");
        let err = call("insert", vec![t.into()]).unwrap_err();
        assert_eq!(err.message(), "wrong number of arguments to 'insert'");
    }

    #[test]
    fn test_remove() {
        let t = seq(&["a", "b", "c"]);
        let last = call("remove", vec![t.clone().into()]).unwrap();
        assert_eq!(last, vec![Value::from("c")]);
        let first = call("remove", vec![t.clone().into(), Value::Integer(1)]).unwrap();
        assert_eq!(first, vec![Value::from("a")]);
        assert_eq!(items(&t), vec!["b"]);
    }

    #[test]
    fn test_move_within_and_across_tables() {
        let t = seq(&["a", "b", "c", "d"]);
        call("move", vec![t.clone().into(), Value::Integer(1), Value::Integer(3), Value::Integer(2)])
            .unwrap();
        assert_eq!(items(&t), vec!["a", "a", "b", "c"]);
        call("move", vec![t.clone().into(), Value::Integer(2), Value::Integer(4), Value::Integer(1)])
            .unwrap();
        assert_eq!(items(&t), vec!["a", "b", "c", "c"]);

        let dest = TableRef::new();
        let result = call(
            "move",
            vec![
                t.into(),
                Value::Integer(2),
                Value::Integer(3),
                Value::Integer(1),
                dest.clone().into(),
            ],
        )
        .unwrap();
        assert!(result[0].as_table().unwrap().ptr_eq(&dest));
        assert_eq!(items(&dest), vec!["b", "c"]);
    }

    #[test]
    fn test_move_range_checks() {
        let t = seq(&["a"]);
        let empty = call("move", vec![t.clone().into(), Value::Integer(3), Value::Integer(1), Value::Integer(1)])
            .unwrap();
        assert!(empty[0].as_table().unwrap().ptr_eq(&t));
        assert_eq!(items(&t), vec!["a"]);

        let err = call(
            "move",
            vec![t.clone().into(), Value::Integer(i64::MIN), Value::Integer(0), Value::Integer(1)],
        )
        .unwrap_err();
        assert_eq!(err.message(), "bad argument #3 to 'move' (too many elements to move)");
        let err = call(
            "move",
            vec![t.into(), Value::Integer(1), Value::Integer(2), Value::Integer(i64::MAX)],
        )
        .unwrap_err();
        assert_eq!(err.message(), "bad argument #4 to 'move' (destination wrap around)");
    }

    #[test]
    fn test_remove_from_empty() {
        let t = TableRef::new();
        assert_eq!(call("remove", vec![t.into()]).unwrap(), vec![Value::Nil]);
    }

    #[test]
    fn test_concat() {
        let t = TableRef::from_sequence(vec![Value::from("x"), Value::Integer(1), Value::Float(2.5)]);
        let all = call("concat", vec![t.clone().into(), Value::from(", ")]).unwrap();
        assert_eq!(all, vec![Value::from("x, 1, 2.5")]);
        let tail = call("concat", vec![t.clone().into(), Value::from("-"), Value::Integer(2)]).unwrap();
        assert_eq!(tail, vec![Value::from("1-2.5")]);
        let empty = call("concat", vec![TableRef::new().into()]).unwrap();
        assert_eq!(empty, vec![Value::from("")]);
    }

    #[test]
    fn test_concat_rejects_non_strings() {
        let t = TableRef::from_sequence(vec![Value::from("x"), Value::Boolean(true)]);
        let err = call("concat", vec![t.into()]).unwrap_err();
        assert_eq!(
            err.message(),
            "invalid value (at index 2) in table for 'concat' (boolean)"
        );
    }

    #[test]
    fn test_pack_and_unpack() {
        let packed = call("pack", vec![Value::Integer(1), Value::Nil, Value::Integer(3)]).unwrap();
        let t = packed[0].as_table().cloned().unwrap();
        assert_eq!(t.get_str("n"), Value::Integer(3));

        let values = call(
            "unpack",
            vec![t.into(), Value::Integer(1), Value::Integer(3)],
        )
        .unwrap();
        assert_eq!(values, vec![Value::Integer(1), Value::Nil, Value::Integer(3)]);
    }

    #[test]
    fn test_unpack_ranges() {
        let t = seq(&["a", "b"]);
        assert!(call("unpack", vec![t.clone().into(), Value::Integer(3)]).unwrap().is_empty());
        let err = call("unpack", vec![t.into(), Value::Integer(i64::MIN), Value::Integer(i64::MAX)])
            .unwrap_err();
        assert_eq!(err.message(), "too many results to unpack");
    }
}
