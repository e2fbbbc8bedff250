//! # Intermediate Representation
//!
//! A control-flow graph of basic blocks over SSA slots, one per Lua
//! function.
//!
//! ## Structure
//!
//! ```text
//! IrFunction
//! ├── params, is_vararg
//! ├── constants: [Constant]        deduplicated pool
//! ├── vars: [VarInfo]              mutable locals; captured ones use cells
//! ├── upvalues: [UpvalueInfo]
//! ├── slots: [SlotInfo]            origin + arity per SSA slot
//! └── blocks: [Block]              reverse postorder, entry first
//!     ├── instrs: [Instr]          each defines at most one slot
//!     └── terminator               jump | branch | return | tail call
//! ```
//!
//! Lua locals are mutable, SSA slots are not. Lowering keeps locals in
//! variables and moves values between them and slots with
//! `VarInit`/`VarLoad`/`VarStore`; [`provenance`] recovers what a load can
//! observe.

pub mod analysis;
pub mod builder;
pub mod error;
pub mod function;
pub mod module;
pub mod origin;
pub mod provenance;
pub mod types;
pub mod validate;

pub use builder::FunctionBuilder;
pub use error::IrError;
pub use function::IrFunction;
pub use module::{Module, ModuleBuilder};
pub use origin::{ComputedId, Origin, OriginKind};
pub use types::{
    Arity, BinaryOp, Block, BlockId, Capture, Constant, ForRole, FunctionId, Instr, InstrKind,
    Slot, SlotInfo, Terminator, UnaryOp, UpvalueId, UpvalueInfo, VarId, VarInfo,
};
