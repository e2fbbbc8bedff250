//! Loading chunks into callable closures.

use std::sync::Arc;

use tidal_runtime::{FunctionRef, LoadedChunk, LuaClosure, TableRef};

use crate::ast::Chunk;
use crate::codegen::{Backend, CodegenError, FrameBackend};
use crate::error::CompileError;
use crate::pipeline::{compile, CompileOptions};

/// Compiles chunks and instantiates their main function.
#[derive(Debug, Clone, Default)]
pub struct ChunkLoader {
    options: CompileOptions,
}

impl ChunkLoader {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile `chunk` down to frame programs.
    pub fn compile(&self, chunk: &Chunk) -> Result<LoadedChunk, CompileError> {
        let module = compile(chunk, &self.options)?;
        FrameBackend::new(&self.options.chunk_name)
            .generate(module)
            .map_err(|e| CompileError::new(e.into(), chunk.span, self.options.chunk_name.as_str()))
    }

    /// Compile `chunk` and bind its `_ENV` to `env`.
    pub fn load(&self, chunk: &Chunk, env: TableRef) -> Result<FunctionRef, CompileError> {
        let loaded = Arc::new(self.compile(chunk)?);
        LuaClosure::main(loaded, env).ok_or_else(|| {
            CompileError::new(
                CodegenError::EmptyModule.into(),
                chunk.span,
                self.options.chunk_name.as_str(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use tidal_runtime::{ExecutionContext, Executor, Value};

    #[test]
    fn test_load_and_run() {
        // return 1 + 2
        let chunk = chunk(vec![ret(vec![add(int(1), int(2))])]);
        let main = ChunkLoader::default().load(&chunk, TableRef::new()).unwrap();
        let results = Executor::call(&mut ExecutionContext::new(), main, vec![]).unwrap();
        assert_eq!(results, vec![Value::Integer(3)]);
    }

    #[test]
    fn test_globals_resolve_in_env() {
        // answer = 42; return answer
        let env = TableRef::new();
        let chunk = chunk(vec![set("answer", int(42)), ret(vec![name("answer")])]);
        let main = ChunkLoader::default().load(&chunk, env.clone()).unwrap();
        let results = Executor::call(&mut ExecutionContext::new(), main, vec![]).unwrap();
        assert_eq!(results, vec![Value::Integer(42)]);
        assert_eq!(env.get_str("answer"), Value::Integer(42));
    }

    #[test]
    fn test_compile_produces_proto_per_function() {
        let chunk = chunk(vec![local_function("f", &[], vec![])]);
        let loaded = ChunkLoader::new(CompileOptions::new("lib")).compile(&chunk).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(&*loaded.name, "lib");
    }
}
