//! # Resume States
//!
//! A [`ResumeState`] is the opaque snapshot a callable hands out when it
//! suspends. Only the callable that produced it can read it back.
//!
//! ## One-Shot
//!
//! States are **one-shot**: the payload is taken out on the first resume and
//! a second resume with the same state (or a clone of its handle) reports
//! [`ProtocolViolation::StateConsumed`]. Cloning a state clones the handle,
//! not the snapshot, so stale copies held by an embedder are detected rather
//! than silently replayed.
//!
//! ## Ownership
//!
//! Every state records the [`CallableId`] of its producer. Presenting it to
//! any other callable reports [`ProtocolViolation::ForeignState`].

use std::any::{type_name, Any};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ProtocolViolation;

/// Unique identity of a callable instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallableId(u64);

/// Global callable ID counter.
static NEXT_CALLABLE_ID: AtomicU64 = AtomicU64::new(1);

impl CallableId {
    /// Allocate a fresh, process-wide unique ID.
    pub fn fresh() -> Self {
        CallableId(NEXT_CALLABLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn#{}", self.0)
    }
}

/// Unique identity of a resume state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(u64);

/// Global state ID counter.
static NEXT_STATE_ID: AtomicU64 = AtomicU64::new(1);

impl StateId {
    fn fresh() -> Self {
        StateId(NEXT_STATE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state#{}", self.0)
    }
}

/// The opaque snapshot of a suspended call.
#[derive(Clone)]
pub struct ResumeState {
    id: StateId,
    owner: CallableId,
    payload: Arc<Mutex<Option<Box<dyn Any + Send>>>>,
}

impl ResumeState {
    /// Wrap a callable-defined snapshot.
    pub fn new<T: Any + Send>(owner: CallableId, snapshot: T) -> Self {
        Self {
            id: StateId::fresh(),
            owner,
            payload: Arc::new(Mutex::new(Some(Box::new(snapshot)))),
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    /// The callable that produced this state.
    pub fn owner(&self) -> CallableId {
        self.owner
    }

    /// Check if the snapshot has already been taken.
    pub fn is_consumed(&self) -> bool {
        self.payload.lock().is_none()
    }

    /// Take the snapshot out, checking ownership and type.
    ///
    /// Ownership and type are checked before anything is consumed, so a state
    /// shown to the wrong callable remains usable by its rightful owner.
    pub fn take<T: Any + Send>(&self, caller: CallableId) -> Result<T, ProtocolViolation> {
        if caller != self.owner {
            return Err(ProtocolViolation::ForeignState {
                state: self.id,
                owner: self.owner,
                callee: caller,
            });
        }
        let mut payload = self.payload.lock();
        match payload.as_ref() {
            None => return Err(ProtocolViolation::StateConsumed { state: self.id }),
            Some(boxed) if !boxed.is::<T>() => {
                return Err(ProtocolViolation::StateMismatch {
                    state: self.id,
                    expected: type_name::<T>(),
                })
            }
            Some(_) => {}
        }
        payload
            .take()
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|b| *b)
            .ok_or(ProtocolViolation::StateConsumed { state: self.id })
    }
}

impl fmt::Debug for ResumeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumeState")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("consumed", &self.is_consumed())
            .finish()
    }
}
