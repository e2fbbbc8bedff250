//! # The Resumable Calling Convention
//!
//! Every callable, compiled or native, implements [`LuaFunction`]:
//!
//! ```text
//! invoke(ctx, args) ──► Ok(Return)          results in ctx's return buffer
//!                   ├─► Ok(Suspend(s))      s carries the condition and state chain
//!                   ├─► Ok(Fail(err))       a Lua error, propagated unchanged
//!                   └─► Err(violation)      protocol misuse, fatal
//!
//! resume(ctx, state) ─► same outcome space as invoke
//! ```
//!
//! ## Suspension Chains
//!
//! The callable that starts a suspension (the *origin*, e.g. a yield or an
//! I/O primitive) returns a [`Suspension`] that usually carries no state of
//! its own. Each frame it unwinds through wraps the inner state in its own
//! snapshot with [`Suspension::capture`]:
//!
//! ```text
//!   A calls B calls C; C suspends
//!
//!   C: Suspension { state: None,                 links: 0 }
//!   B: Suspension { state: B{ C: None },         links: 1 }
//!   A: Suspension { state: A{ B{ C: None } },    links: 2 }
//! ```
//!
//! Resuming walks back down the chain: the driver resumes A, A resumes B
//! with the state it saved, and B, which called the stateless origin,
//! consumes the driver-supplied continuation value instead.

use std::fmt;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::{LuaError, ProtocolViolation};
use crate::pending::PendingOperation;
use crate::state::{CallableId, ResumeState};
use crate::value::Value;

/// A shared callable.
pub type FunctionRef = Arc<dyn LuaFunction>;

/// Outcome of one invoke or resume step.
pub type CallResult = Result<Outcome, ProtocolViolation>;

/// A callable implementing the resumable protocol.
pub trait LuaFunction: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Identity checked against [`ResumeState::owner`].
    fn id(&self) -> CallableId;

    /// Begin a fresh call.
    fn invoke(&self, ctx: &mut ExecutionContext, args: Vec<Value>) -> CallResult;

    /// Continue a suspended call from the state it produced.
    ///
    /// The default is for callables that never suspend.
    fn resume(&self, ctx: &mut ExecutionContext, state: ResumeState) -> CallResult {
        let _ = (ctx, state);
        Err(ProtocolViolation::NonSuspendable {
            function: self.name().to_string(),
        })
    }
}

impl fmt::Debug for dyn LuaFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {} {}>", self.name(), self.id())
    }
}

/// The result of a step that did not violate the protocol.
#[derive(Debug)]
pub enum Outcome {
    /// Finished; results are in the context's return buffer.
    Return,
    /// Suspended; the chain's state is inside.
    Suspend(Suspension),
    /// A Lua error.
    Fail(LuaError),
}

/// What a suspended chain is waiting for.
#[derive(Debug, Clone)]
pub enum Condition {
    /// A language-level yield carrying values to the embedder.
    Yield(Vec<Value>),
    /// Blocked until an operation completes.
    Pending(PendingOperation),
    /// Preempted at a call boundary by the scheduling policy.
    Pause,
}

impl Condition {
    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            Condition::Yield(values) => format!("yield({} values)", values.len()),
            Condition::Pending(op) => format!("pending({})", op.label()),
            Condition::Pause => "pause".to_string(),
        }
    }
}

/// An unwinding suspension.
#[derive(Debug)]
pub struct Suspension {
    condition: Condition,
    origin: String,
    state: Option<ResumeState>,
    links: usize,
}

impl Suspension {
    /// Start a suspension at an origin that keeps no state.
    pub fn new(condition: Condition, origin: impl Into<String>) -> Self {
        Self {
            condition,
            origin: origin.into(),
            state: None,
            links: 0,
        }
    }

    /// Start a suspension at an origin that will be resumed itself.
    pub fn with_state(condition: Condition, origin: impl Into<String>, state: ResumeState) -> Self {
        Self {
            condition,
            origin: origin.into(),
            state: Some(state),
            links: 1,
        }
    }

    /// Wrap the current state in an outer frame's own snapshot.
    pub fn capture(mut self, wrap: impl FnOnce(Option<ResumeState>) -> ResumeState) -> Self {
        let inner = self.state.take();
        self.state = Some(wrap(inner));
        self.links += 1;
        self
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Name of the callable that started the suspension.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The outermost captured state.
    pub fn state(&self) -> Option<&ResumeState> {
        self.state.as_ref()
    }

    /// Number of resumable states captured along the chain.
    pub fn links(&self) -> usize {
        self.links
    }

    pub fn into_parts(self) -> (Condition, String, Option<ResumeState>) {
        (self.condition, self.origin, self.state)
    }
}

// ============================================================================
// Primitive callables
// ============================================================================

type NativeBody =
    dyn Fn(&mut ExecutionContext, Vec<Value>) -> Result<Vec<Value>, LuaError> + Send + Sync;

/// A primitive that always runs to completion.
///
/// Its `resume` is the default protocol violation.
pub struct NativeFunction {
    id: CallableId,
    name: String,
    body: Box<NativeBody>,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut ExecutionContext, Vec<Value>) -> Result<Vec<Value>, LuaError> + Send + Sync + 'static,
    {
        Self {
            id: CallableId::fresh(),
            name: name.into(),
            body: Box::new(body),
        }
    }

    /// Box into a [`FunctionRef`].
    pub fn into_ref(self) -> FunctionRef {
        Arc::new(self)
    }
}

impl LuaFunction for NativeFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> CallableId {
        self.id
    }

    fn invoke(&self, ctx: &mut ExecutionContext, args: Vec<Value>) -> CallResult {
        match (self.body)(ctx, args) {
            Ok(results) => {
                ctx.set_returns(results);
                Ok(Outcome::Return)
            }
            Err(err) => Ok(Outcome::Fail(err)),
        }
    }
}

/// Shorthand for a native function value.
pub fn native<F>(name: &str, body: F) -> Value
where
    F: Fn(&mut ExecutionContext, Vec<Value>) -> Result<Vec<Value>, LuaError> + Send + Sync + 'static,
{
    Value::Function(NativeFunction::new(name, body).into_ref())
}

type TriggerBody =
    dyn Fn(&mut ExecutionContext, Vec<Value>) -> Result<Condition, LuaError> + Send + Sync;

/// A primitive that starts a suspension and keeps no state.
///
/// Its caller receives the continuation value as the call's results.
pub struct Suspender {
    id: CallableId,
    name: String,
    trigger: Box<TriggerBody>,
}

impl Suspender {
    pub fn new<F>(name: impl Into<String>, trigger: F) -> Self
    where
        F: Fn(&mut ExecutionContext, Vec<Value>) -> Result<Condition, LuaError> + Send + Sync + 'static,
    {
        Self {
            id: CallableId::fresh(),
            name: name.into(),
            trigger: Box::new(trigger),
        }
    }

    /// A suspender that yields its arguments to the embedder.
    pub fn yielding(name: impl Into<String>) -> Self {
        Self::new(name, |_, args| Ok(Condition::Yield(args)))
    }

    pub fn into_ref(self) -> FunctionRef {
        Arc::new(self)
    }
}

impl LuaFunction for Suspender {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> CallableId {
        self.id
    }

    fn invoke(&self, ctx: &mut ExecutionContext, args: Vec<Value>) -> CallResult {
        match (self.trigger)(ctx, args) {
            Ok(condition) => Ok(Outcome::Suspend(Suspension::new(condition, self.name.clone()))),
            Err(err) => Ok(Outcome::Fail(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_returns_into_buffer() {
        let mut ctx = ExecutionContext::new();
        let f = NativeFunction::new("add", |_, args| {
            let sum = args.iter().filter_map(Value::as_integer).sum::<i64>();
            Ok(vec![Value::Integer(sum)])
        });
        let outcome = f.invoke(&mut ctx, vec![Value::Integer(2), Value::Integer(3)]).unwrap();
        assert!(matches!(outcome, Outcome::Return));
        assert_eq!(ctx.take_returns(), vec![Value::Integer(5)]);
    }

    #[test]
    fn test_native_resume_is_violation() {
        let mut ctx = ExecutionContext::new();
        let f = NativeFunction::new("now", |_, _| Ok(vec![]));
        let state = ResumeState::new(f.id(), ());
        assert_eq!(
            f.resume(&mut ctx, state).unwrap_err(),
            ProtocolViolation::NonSuspendable {
                function: "now".into()
            }
        );
    }

    #[test]
    fn test_capture_counts_links() {
        let outer = CallableId::fresh();
        let s = Suspension::new(Condition::Pause, "hook");
        assert_eq!(s.links(), 0);
        let s = s.capture(|inner| {
            assert!(inner.is_none());
            ResumeState::new(outer, 1u32)
        });
        let s = s.capture(|inner| ResumeState::new(outer, inner));
        assert_eq!(s.links(), 2);
        assert_eq!(s.origin(), "hook");
    }

    #[test]
    fn test_suspender_reports_origin() {
        let mut ctx = ExecutionContext::new();
        let y = Suspender::yielding("yield");
        match y.invoke(&mut ctx, vec![Value::Integer(1)]).unwrap() {
            Outcome::Suspend(s) => {
                assert_eq!(s.origin(), "yield");
                assert!(s.state().is_none());
                assert!(matches!(s.condition(), Condition::Yield(v) if v.len() == 1));
            }
            other => panic!("expected suspension, got {:?}", other),
        }
    }
}
