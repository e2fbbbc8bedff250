//! Code generation for Tidal.
//!
//! A [`Backend`] consumes a sealed [`Module`] and produces something
//! loadable. The shipped backend, [`FrameBackend`], lowers each IR function
//! to a [`Proto`] frame program for `tidal-runtime`.
//!
//! # Architecture
//!
//! ```text
//! Module -> FrameBackend -> [Proto] -> LoadedChunk -> LuaClosure
//!              │
//!              ├── liveness: what each call site must save
//!              └── emit: slots to registers, blocks to pcs
//! ```
//!
//! Protos keep module order, so `Closure` ops name their target by its
//! `FunctionId`.

pub mod emit;
pub mod liveness;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info_span};

use tidal_runtime::{LoadedChunk, Proto};

use crate::ir::{FunctionId, Module, Slot};

/// Faults of the backend contract. These indicate a compiler bug, never a
/// problem with the input program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    #[error("cannot generate code for an empty module")]
    EmptyModule,

    #[error("function '{function}' creates a closure of unknown function {target}")]
    UnknownFunction { function: String, target: FunctionId },

    #[error("function '{function}' captures {found} values for {target}, which has {expected} upvalues")]
    CaptureMismatch {
        function: String,
        target: FunctionId,
        expected: usize,
        found: usize,
    },

    #[error("the main function must have at most one upvalue, found {0}")]
    MainUpvalues(usize),

    #[error("slot {slot} in function '{function}' has no register")]
    UnmappedSlot { function: String, slot: Slot },

    #[error("an instruction of function '{function}' is missing its result slot")]
    MissingResult { function: String },

    #[error("failed to dump module: {0}")]
    Dump(String),
}

/// The code generation contract.
pub trait Backend {
    type Output;

    /// Consume `module` and produce the backend's output.
    fn generate(&mut self, module: Module) -> Result<Self::Output, CodegenError>;
}

/// Lowers a module to frame programs.
#[derive(Debug, Clone)]
pub struct FrameBackend {
    chunk_name: Arc<str>,
}

impl FrameBackend {
    pub fn new(chunk_name: impl AsRef<str>) -> Self {
        Self {
            chunk_name: Arc::from(chunk_name.as_ref()),
        }
    }
}

impl Backend for FrameBackend {
    type Output = LoadedChunk;

    fn generate(&mut self, module: Module) -> Result<LoadedChunk, CodegenError> {
        let _span = info_span!("codegen", chunk = %self.chunk_name).entered();
        let main = module.main().ok_or(CodegenError::EmptyModule)?;
        if main.upvalues().len() > 1 {
            return Err(CodegenError::MainUpvalues(main.upvalues().len()));
        }

        let protos = module
            .iter()
            .map(|func| emit::emit_function(func, &module, &self.chunk_name))
            .collect::<Result<Vec<Proto>, _>>()?;

        for proto in &protos {
            debug!(
                function = %proto.name,
                ops = proto.code.len(),
                regs = proto.num_regs,
                lists = proto.num_lists,
                call_sites = proto.call_sites.len(),
                "generated proto"
            );
        }
        Ok(LoadedChunk::new(&*self.chunk_name, protos))
    }
}

/// Renders a module as JSON, for debugging dumps.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBackend;

impl Backend for JsonBackend {
    type Output = String;

    fn generate(&mut self, module: Module) -> Result<String, CodegenError> {
        if module.is_empty() {
            return Err(CodegenError::EmptyModule);
        }
        module
            .to_json()
            .map_err(|e| CodegenError::Dump(e.to_string()))
    }
}
