//! The compile pipeline: lowering, optimisation and module assembly.

use tracing::{debug, info_span};

use crate::ast::Chunk;
use crate::error::CompileError;
use crate::ir::ModuleBuilder;
use crate::ir::Module;
use crate::lower::lower_chunk;
use crate::optimise::{optimize_function, OptConfig};

/// Options for one compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Name used in error messages and frame locations.
    pub chunk_name: String,
    /// Run the IR optimisation passes.
    pub optimize: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            chunk_name: "main".to_string(),
            optimize: true,
        }
    }
}

impl CompileOptions {
    pub fn new(chunk_name: impl Into<String>) -> Self {
        Self {
            chunk_name: chunk_name.into(),
            ..Self::default()
        }
    }

    pub fn optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    /// Defaults, with `TIDAL_OPT=0` disabling optimisation.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(value) = std::env::var("TIDAL_OPT") {
            options.optimize = value.trim() != "0";
        }
        options
    }

    fn opt_config(&self) -> OptConfig {
        if self.optimize {
            OptConfig::all()
        } else {
            OptConfig::none()
        }
    }
}

/// Compile a chunk to a sealed module.
pub fn compile(chunk: &Chunk, options: &CompileOptions) -> Result<Module, CompileError> {
    let _span = info_span!("compile", chunk = %options.chunk_name).entered();

    let config = options.opt_config();
    let mut builder = ModuleBuilder::new();
    for mut func in lower_chunk(chunk, &options.chunk_name)? {
        optimize_function(&mut func, &config)
            .map_err(|e| CompileError::new(e.into(), chunk.span, options.chunk_name.as_str()))?;
        debug!(function = %func.name(), id = %func.id(), "compiled function");
        builder
            .add(func)
            .map_err(|e| CompileError::new(e.into(), chunk.span, options.chunk_name.as_str()))?;
    }
    Ok(builder.finish())
}
