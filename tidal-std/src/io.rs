//! The `io` library. Only `io.write` on the default output.

use tidal_runtime::function::native;
use tidal_runtime::{ExecutionContext, LuaError, TableRef, Value};

use crate::args::check_string;
use crate::base::write_output;
use crate::{library_table, Lib};

pub struct IoLib;

impl Lib for IoLib {
    fn name(&self) -> &'static str {
        "io"
    }

    fn install(&self, env: &TableRef) {
        let io = library_table(env, "io");
        io.set_str("write", native("io.write", write));
    }
}

fn write(ctx: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, LuaError> {
    let mut text = String::new();
    for n in 0..args.len() {
        text.push_str(&check_string(&args, n, "write")?);
    }
    write_output(ctx, "write", &text)?;
    Ok(vec![])
}
