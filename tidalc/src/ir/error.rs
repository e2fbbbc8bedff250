//! IR construction and validation errors.

use thiserror::Error;

use super::origin::OriginKind;
use super::types::{Arity, BlockId, Slot};

/// A malformed IR request or structure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrError {
    /// A negative (or unrepresentable) argument or constant index.
    #[error("invalid {kind} index {index}: must be non-negative")]
    InvalidIndex { kind: OriginKind, index: i64 },

    /// An absent function was handed to a module builder.
    #[error("cannot add an absent function to a module")]
    NullFunction,

    #[error("{function}: block {block} has no terminator")]
    UnterminatedBlock { function: String, block: BlockId },

    #[error("{function}: block {block} branches to missing block {target}")]
    InvalidTarget {
        function: String,
        block: BlockId,
        target: BlockId,
    },

    #[error("{function}: slot {slot} is defined more than once")]
    Redefined { function: String, slot: Slot },

    #[error("{function}: slot {slot} used in {block} is not defined on every path to it")]
    UndefinedSlot {
        function: String,
        slot: Slot,
        block: BlockId,
    },

    #[error("{function}: slot {slot} has arity {found}, expected {expected}")]
    ArityMismatch {
        function: String,
        slot: Slot,
        found: Arity,
        expected: Arity,
    },

    #[error("{function}: {what} index {index} is out of range")]
    IndexOutOfRange {
        function: String,
        what: &'static str,
        index: u32,
    },

    #[error("{function}: '...' used in a function that is not vararg")]
    VarargsInFixedFunction { function: String },
}
