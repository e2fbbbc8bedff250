//! # Tidal Compiler Library
//!
//! Compiles parsed Lua 5.3 chunks into IR modules and lowers them to
//! resumable frame programs for `tidal-runtime`.
//!
//! ## Compiler Pipeline
//!
//! ```text
//! Chunk (AST) -> lower -> IrFunction* -> optimise -> Module -> Backend -> LoadedChunk
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tidalc::ast::build::*;
//! use tidalc::ChunkLoader;
//! use tidal_runtime::{ExecutionContext, Executor, TableRef, Value};
//!
//! // return 6 * 7
//! let chunk = chunk(vec![ret(vec![mul(int(6), int(7))])]);
//! let main = ChunkLoader::default().load(&chunk, TableRef::new()).unwrap();
//! let results = Executor::call(&mut ExecutionContext::new(), main, vec![]).unwrap();
//! assert_eq!(results, vec![Value::Integer(42)]);
//! ```
//!
//! ## Module Overview
//!
//! - [`ast`] - The syntax tree a parser hands to the compiler
//! - [`span`] - Source locations
//! - [`lower`] - AST to IR lowering
//! - [`ir`] - IR functions, origins, validation and modules
//! - [`optimise`] - IR optimisation passes
//! - [`codegen`] - The backend contract and the frame program backend
//! - [`loader`] - Chunk to callable closure
//! - [`error`] - Compile errors

#![warn(rust_2018_idioms)]

pub mod ast;
pub mod codegen;
pub mod error;
pub mod ir;
pub mod loader;
pub mod lower;
pub mod optimise;
pub mod pipeline;
pub mod span;

pub use codegen::{Backend, CodegenError, FrameBackend, JsonBackend};
pub use error::{CompileError, CompileErrorKind};
pub use ir::{IrError, IrFunction, Module, ModuleBuilder, Origin, OriginKind};
pub use loader::ChunkLoader;
pub use pipeline::{compile, CompileOptions};
pub use span::Span;

/// Compiler version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
