//! # Value Origins
//!
//! Every IR slot records where its value came from. Two slots with the same
//! `Argument` or `Constant` origin hold the same value for the whole
//! function, which is what the block-local dedup pass relies on.
//!
//! | Origin | Meaning | Display |
//! |--------|---------|---------|
//! | `Argument(i)` | the i-th declared parameter | `#i` |
//! | `Constant(i)` | the i-th entry of the constant table | `^i` |
//! | `Computed(id)` | an instruction result, unique per definition | `_<hex id>` |
//! | `Entry` | "no assignment yet on some path" in dataflow | `_` |
//!
//! Computed origins are only equal to themselves. Each call to
//! [`Origin::computed`] mints a fresh one.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::error::IrError;

static NEXT_COMPUTED: AtomicU64 = AtomicU64::new(1);

/// Identity of one computed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComputedId(u64);

impl ComputedId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// The kind of an indexed origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OriginKind {
    Argument,
    Constant,
}

impl fmt::Display for OriginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginKind::Argument => write!(f, "argument"),
            OriginKind::Constant => write!(f, "constant"),
        }
    }
}

/// Where a slot's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    Argument(u32),
    Constant(u32),
    Computed(ComputedId),
    Entry,
}

impl Origin {
    /// An indexed origin. Fails for negative indices.
    pub fn of(kind: OriginKind, index: i64) -> Result<Origin, IrError> {
        let i = u32::try_from(index).map_err(|_| IrError::InvalidIndex { kind, index })?;
        Ok(match kind {
            OriginKind::Argument => Origin::Argument(i),
            OriginKind::Constant => Origin::Constant(i),
        })
    }

    pub fn argument(index: i64) -> Result<Origin, IrError> {
        Self::of(OriginKind::Argument, index)
    }

    pub fn constant(index: i64) -> Result<Origin, IrError> {
        Self::of(OriginKind::Constant, index)
    }

    /// A fresh computed origin, distinct from every other.
    pub fn computed() -> Origin {
        Origin::Computed(ComputedId(NEXT_COMPUTED.fetch_add(1, Ordering::Relaxed)))
    }

    /// The entry origin. There is exactly one.
    pub const fn entry() -> Origin {
        Origin::Entry
    }

    pub fn kind(&self) -> Option<OriginKind> {
        match self {
            Origin::Argument(_) => Some(OriginKind::Argument),
            Origin::Constant(_) => Some(OriginKind::Constant),
            _ => None,
        }
    }

    /// Index of an `Argument` or `Constant` origin.
    pub fn index(&self) -> Option<u32> {
        match self {
            Origin::Argument(i) | Origin::Constant(i) => Some(*i),
            _ => None,
        }
    }

    /// Whether equal origins imply equal values across the function.
    pub fn is_stable(&self) -> bool {
        matches!(self, Origin::Argument(_) | Origin::Constant(_))
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Argument(i) => write!(f, "#{}", i),
            Origin::Constant(i) => write!(f, "^{}", i),
            Origin::Computed(id) => write!(f, "_{:x}", id.0),
            Origin::Entry => write!(f, "_"),
        }
    }
}
