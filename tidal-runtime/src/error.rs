//! # Runtime Errors
//!
//! Three failure channels never mix:
//!
//! | Type | Meaning | Reaches scripts? |
//! |------|---------|------------------|
//! | [`LuaError`] | A language-level error raised during a call | Yes, as a value |
//! | [`ProtocolViolation`] | The embedder or generated code misused invoke/resume | Never |
//! | [`CallError`] | What the blocking executor reports to its caller | n/a |
//!
//! Suspension is not an error and has no variant here; it is an
//! [`Outcome`](crate::function::Outcome) of its own.

use std::fmt;

use thiserror::Error;

use crate::driver::Continuation;
use crate::state::{CallableId, StateId};
use crate::value::Value;

// ============================================================================
// Script-level failures
// ============================================================================

/// A Lua error: an arbitrary error value raised by a script or a primitive.
///
/// Failures travel outward through every frame unchanged. A frame that
/// raises one from its own instructions prefixes string messages with
/// `chunk:line:` once.
#[derive(Debug, Clone)]
pub struct LuaError {
    value: Value,
    located: bool,
}

impl LuaError {
    /// An error carrying a string message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            value: Value::string(message.into()),
            located: false,
        }
    }

    /// An error carrying an arbitrary value, as raised by `error(v)`.
    ///
    /// The value is taken verbatim and never receives a location prefix.
    pub fn from_value(value: Value) -> Self {
        Self { value, located: true }
    }

    /// Prefix a string message with its source position, once.
    pub fn with_location(mut self, chunk: &str, line: u32) -> Self {
        if self.located {
            return self;
        }
        self.located = true;
        if let Value::String(s) = &self.value {
            self.value = Value::string(format!("{}:{}: {}", chunk, line, s));
        }
        self
    }

    /// The error value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consume the error and return its value.
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Human-readable form of the error value.
    pub fn message(&self) -> String {
        match &self.value {
            Value::String(s) => s.to_string(),
            v @ (Value::Integer(_) | Value::Float(_)) => v.to_display(),
            Value::Nil => "nil".to_string(),
            other => format!("(error object is a {} value)", other.type_name()),
        }
    }
}

impl fmt::Display for LuaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for LuaError {}

// ============================================================================
// Protocol violations
// ============================================================================

/// Misuse of the invoke/resume contract.
///
/// These are fatal to the call chain and are never converted into Lua
/// values: a script can not observe or catch them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// `resume` was called on a callable that never suspends.
    #[error("'{function}' never suspends and cannot be resumed")]
    NonSuspendable { function: String },

    /// The state was produced by a different callable.
    #[error("resume state {state} belongs to callable {owner}, not {callee}")]
    ForeignState {
        state: StateId,
        owner: CallableId,
        callee: CallableId,
    },

    /// The state has already been used to resume once.
    #[error("resume state {state} was already consumed")]
    StateConsumed { state: StateId },

    /// The state's payload is not the snapshot type the callable expects.
    #[error("resume state {state} does not hold a {expected} snapshot")]
    StateMismatch {
        state: StateId,
        expected: &'static str,
    },

    /// The state names a resumption point the callable does not have.
    #[error("resume state points at pc {pc}, which is not a call site of '{function}'")]
    InvalidResumePoint { function: String, pc: usize },

    /// A frame expected the driver-supplied continuation value but none was given.
    #[error("resumed without a continuation value for the suspended call")]
    MissingContinuation,

    /// The resumed chain returned without consuming the continuation value.
    #[error("continuation value was not consumed by the resumed chain")]
    UnconsumedContinuation,

    /// A continuation value is already waiting in the context.
    #[error("a continuation value was already supplied")]
    AlreadySupplied,

    /// A continuation value was offered while no call is suspended.
    #[error("call is not suspended")]
    NotSuspended,

    /// A value was supplied for a condition that only its operation may satisfy.
    #[error("suspension is waiting on pending operation '{label}'")]
    OperationPending { label: String },

    /// The driven call has already produced its final outcome.
    #[error("call already finished")]
    CallFinished,
}

// ============================================================================
// Executor errors
// ============================================================================

/// Error returned by the blocking executor.
#[derive(Debug, Error)]
pub enum CallError {
    /// The script failed.
    #[error("{0}")]
    Failed(LuaError),

    /// The call yielded to its embedder; resume it with
    /// [`Executor::resume`](crate::driver::Executor::resume).
    #[error("call paused by '{}'", .0.origin())]
    Paused(Box<Continuation>),

    /// The call protocol was violated.
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
}

impl CallError {
    /// The Lua error, if the script failed.
    pub fn as_failure(&self) -> Option<&LuaError> {
        match self {
            CallError::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Take the continuation, if the call paused.
    pub fn into_continuation(self) -> Option<Continuation> {
        match self {
            CallError::Paused(k) => Some(*k),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_prefix_applied_once() {
        let err = LuaError::new("boom")
            .with_location("main", 3)
            .with_location("outer", 9);
        assert_eq!(err.message(), "main:3: boom");
    }

    #[test]
    fn test_error_value_kept_verbatim() {
        let err = LuaError::from_value(Value::Integer(42)).with_location("main", 1);
        assert!(matches!(err.value(), Value::Integer(42)));
        assert_eq!(err.to_string(), "42");
    }

    #[test]
    fn test_non_string_error_message() {
        let err = LuaError::from_value(Value::Boolean(true));
        assert_eq!(err.message(), "(error object is a boolean value)");
    }

    #[test]
    fn test_violation_display() {
        let v = ProtocolViolation::NonSuspendable {
            function: "clock".into(),
        };
        assert_eq!(v.to_string(), "'clock' never suspends and cannot be resumed");
    }
}
