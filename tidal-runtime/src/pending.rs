//! Pending operations: a value that some other party will produce later.
//!
//! A primitive that blocks (I/O, timers) suspends with
//! [`Condition::Pending`](crate::function::Condition::Pending) and hands
//! the [`Completer`] to whatever will finish the work, possibly on another
//! thread. The driver resumes the chain only once the operation completes.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::LuaError;
use crate::value::Value;

/// The result a pending operation completes with.
pub type PendingResult = Result<Vec<Value>, LuaError>;

enum Slot {
    Waiting,
    Ready(PendingResult),
    Taken,
}

struct Shared {
    slot: Mutex<Slot>,
    ready: Condvar,
}

/// The waiting side of a pending operation.
#[derive(Clone)]
pub struct PendingOperation {
    label: Arc<str>,
    shared: Arc<Shared>,
}

/// The completing side of a pending operation.
///
/// Dropping a completer without completing it fails the operation, so a
/// waiter is never stranded.
pub struct Completer {
    label: Arc<str>,
    shared: Option<Arc<Shared>>,
}

impl PendingOperation {
    /// Create a new operation and its completer.
    pub fn new(label: impl AsRef<str>) -> (PendingOperation, Completer) {
        let label: Arc<str> = Arc::from(label.as_ref());
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot::Waiting),
            ready: Condvar::new(),
        });
        (
            PendingOperation {
                label: label.clone(),
                shared: shared.clone(),
            },
            Completer {
                label,
                shared: Some(shared),
            },
        )
    }

    /// An operation that is already complete.
    pub fn ready(label: impl AsRef<str>, result: PendingResult) -> PendingOperation {
        let (op, completer) = Self::new(label);
        completer.complete(result);
        op
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the result is available (or was already taken).
    pub fn is_complete(&self) -> bool {
        !matches!(*self.shared.slot.lock(), Slot::Waiting)
    }

    /// Block the current thread until the operation completes.
    pub fn wait(&self) {
        let mut slot = self.shared.slot.lock();
        while matches!(*slot, Slot::Waiting) {
            self.shared.ready.wait(&mut slot);
        }
    }

    /// Take the result. Returns `None` while waiting and after the first take.
    pub fn take_result(&self) -> Option<PendingResult> {
        let mut slot = self.shared.slot.lock();
        match std::mem::replace(&mut *slot, Slot::Taken) {
            Slot::Ready(result) => Some(result),
            other => {
                *slot = other;
                None
            }
        }
    }
}

impl fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("label", &self.label)
            .field("complete", &self.is_complete())
            .finish()
    }
}

impl Completer {
    /// Complete the operation and wake waiters.
    pub fn complete(mut self, result: PendingResult) {
        if let Some(shared) = self.shared.take() {
            Self::fill(&shared, result);
        }
    }

    fn fill(shared: &Shared, result: PendingResult) {
        let mut slot = shared.slot.lock();
        if matches!(*slot, Slot::Waiting) {
            *slot = Slot::Ready(result);
            shared.ready.notify_all();
        }
    }
}

impl Drop for Completer {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            let err = LuaError::new(format!("pending operation '{}' was abandoned", self.label));
            Self::fill(&shared, Err(err));
        }
    }
}
