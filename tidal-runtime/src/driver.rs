//! # Call Driver
//!
//! Drives one top-level call to its final outcome.
//!
//! - [`CallDriver::step`] is the non-blocking entry point: it invokes or
//!   resumes at most once and reports where the call stands.
//! - [`Executor::call`] is the blocking entry point. It waits on pending
//!   operations, resumes pauses immediately and hands yields back to the
//!   embedder as a [`Continuation`].
//!
//! ## Ordering
//!
//! The driver holds exactly one outstanding [`ResumeState`]: the outermost
//! state of the current suspension. Resuming always starts there and each
//! frame resumes the next link itself, so links are resumed in unwind order
//! by construction.
//!
//! ```text
//!            step()                 resume(v) / operation completes
//!   Start ─────────► Suspended ◄────────────────┐
//!     │                 │  step()               │
//!     │                 └──────────► (resume chain) ─┘
//!     └──► Finished ◄───────────────────┘
//! ```

use std::fmt;

use tracing::{debug, trace};

use crate::context::ExecutionContext;
use crate::dispatch;
use crate::error::{CallError, LuaError, ProtocolViolation};
use crate::function::{CallResult, Condition, FunctionRef, Outcome};
use crate::pending::PendingResult;
use crate::state::ResumeState;
use crate::value::Value;

/// Where a driven call stands after a step.
#[derive(Debug)]
pub enum Poll {
    /// Returned with these results.
    Complete(Vec<Value>),
    /// Failed with a Lua error.
    Failed(LuaError),
    /// Suspended on this condition.
    Suspended(Condition),
}

struct Parked {
    condition: Condition,
    origin: String,
    callee: FunctionRef,
    state: Option<ResumeState>,
    supplied: Option<PendingResult>,
}

enum Phase {
    Start(Vec<Value>),
    Suspended(Parked),
    Finished,
}

/// A single top-level call, advanced one step at a time.
pub struct CallDriver {
    target: FunctionRef,
    phase: Phase,
    steps: u64,
}

impl CallDriver {
    pub fn new(target: FunctionRef, args: Vec<Value>) -> Self {
        Self {
            target,
            phase: Phase::Start(args),
            steps: 0,
        }
    }

    /// Advance the call once.
    ///
    /// While the current condition is unsatisfied this returns
    /// `Poll::Suspended` again without touching the call chain.
    pub fn step(&mut self, ctx: &mut ExecutionContext) -> Result<Poll, ProtocolViolation> {
        match std::mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Start(args) => {
                self.steps += 1;
                trace!(target_fn = self.target.name(), "invoke");
                let mut callee = self.target.clone();
                let result = dispatch::call(ctx, &mut callee, args);
                self.settle(ctx, callee, result)
            }
            Phase::Suspended(mut parked) => {
                if parked.supplied.is_none() {
                    if let Condition::Pending(op) = &parked.condition {
                        parked.supplied = op.take_result();
                    }
                }
                let Some(value) = parked.supplied.take() else {
                    let condition = parked.condition.clone();
                    self.phase = Phase::Suspended(parked);
                    return Ok(Poll::Suspended(condition));
                };

                self.steps += 1;
                let Some(state) = parked.state else {
                    // The target itself was the origin: the continuation is
                    // the call's outcome.
                    debug!(origin = %parked.origin, "stateless origin resumed");
                    return Ok(match value {
                        Ok(values) => Poll::Complete(values),
                        Err(err) => Poll::Failed(err),
                    });
                };

                debug!(
                    origin = %parked.origin,
                    state = %state.id(),
                    step = self.steps,
                    "resuming chain"
                );
                ctx.supply_continuation(value)?;
                let mut callee = parked.callee;
                let result = dispatch::resume(ctx, &mut callee, state);
                if ctx.has_continuation() {
                    ctx.discard_continuation();
                    if result.is_ok() {
                        return Err(ProtocolViolation::UnconsumedContinuation);
                    }
                }
                self.settle(ctx, callee, result)
            }
            Phase::Finished => Err(ProtocolViolation::CallFinished),
        }
    }

    fn settle(
        &mut self,
        ctx: &mut ExecutionContext,
        callee: FunctionRef,
        result: CallResult,
    ) -> Result<Poll, ProtocolViolation> {
        match result? {
            Outcome::Return => Ok(Poll::Complete(ctx.take_returns())),
            Outcome::Fail(err) => {
                debug!(error = %err, "call failed");
                Ok(Poll::Failed(err))
            }
            Outcome::Suspend(suspension) => {
                debug!(
                    origin = suspension.origin(),
                    condition = %suspension.condition().describe(),
                    links = suspension.links(),
                    "call suspended"
                );
                let (condition, origin, state) = suspension.into_parts();
                self.phase = Phase::Suspended(Parked {
                    condition: condition.clone(),
                    origin,
                    callee,
                    state,
                    supplied: None,
                });
                Ok(Poll::Suspended(condition))
            }
        }
    }

    fn parked_mut(&mut self) -> Result<&mut Parked, ProtocolViolation> {
        match &mut self.phase {
            Phase::Suspended(parked) => Ok(parked),
            Phase::Finished => Err(ProtocolViolation::CallFinished),
            Phase::Start(_) => Err(ProtocolViolation::NotSuspended),
        }
    }

    fn supply(&mut self, value: PendingResult) -> Result<(), ProtocolViolation> {
        let parked = self.parked_mut()?;
        if let Condition::Pending(op) = &parked.condition {
            return Err(ProtocolViolation::OperationPending {
                label: op.label().to_string(),
            });
        }
        if parked.supplied.is_some() {
            return Err(ProtocolViolation::AlreadySupplied);
        }
        parked.supplied = Some(value);
        Ok(())
    }

    /// Supply the values a yield or pause continues with.
    pub fn resume(&mut self, values: Vec<Value>) -> Result<(), ProtocolViolation> {
        self.supply(Ok(values))
    }

    /// Resume a yield or pause by raising `err` at the suspension point.
    pub fn fail(&mut self, err: LuaError) -> Result<(), ProtocolViolation> {
        self.supply(Err(err))
    }

    /// The condition the call is suspended on, if any.
    pub fn condition(&self) -> Option<&Condition> {
        match &self.phase {
            Phase::Suspended(parked) => Some(&parked.condition),
            _ => None,
        }
    }

    /// Name of the callable that started the current suspension.
    pub fn origin(&self) -> Option<&str> {
        match &self.phase {
            Phase::Suspended(parked) => Some(&parked.origin),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished)
    }

    /// Number of invoke and resume steps taken so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }
}

impl fmt::Debug for CallDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match &self.phase {
            Phase::Start(_) => "start".to_string(),
            Phase::Suspended(p) => format!("suspended on {}", p.condition.describe()),
            Phase::Finished => "finished".to_string(),
        };
        f.debug_struct("CallDriver")
            .field("target", &self.target.name())
            .field("phase", &phase)
            .field("steps", &self.steps)
            .finish()
    }
}

// ============================================================================
// Blocking executor
// ============================================================================

/// A call that yielded to the embedder.
#[derive(Debug)]
pub struct Continuation {
    driver: CallDriver,
    yielded: Vec<Value>,
}

impl Continuation {
    /// Values passed to the yield.
    pub fn yielded(&self) -> &[Value] {
        &self.yielded
    }

    /// Name of the callable that yielded.
    pub fn origin(&self) -> &str {
        self.driver.origin().unwrap_or("?")
    }
}

/// Blocking call entry points.
pub struct Executor;

impl Executor {
    /// Call `f` and block until it returns, fails or yields.
    pub fn call(
        ctx: &mut ExecutionContext,
        f: FunctionRef,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, CallError> {
        Self::drive(ctx, CallDriver::new(f, args))
    }

    /// Continue a yielded call with `values` as the yield's results.
    pub fn resume(
        ctx: &mut ExecutionContext,
        k: Continuation,
        values: Vec<Value>,
    ) -> Result<Vec<Value>, CallError> {
        let mut driver = k.driver;
        driver.resume(values)?;
        Self::drive(ctx, driver)
    }

    fn drive(ctx: &mut ExecutionContext, mut driver: CallDriver) -> Result<Vec<Value>, CallError> {
        loop {
            match driver.step(ctx)? {
                Poll::Complete(values) => return Ok(values),
                Poll::Failed(err) => return Err(CallError::Failed(err)),
                Poll::Suspended(Condition::Pending(op)) => {
                    trace!(operation = op.label(), "waiting");
                    op.wait();
                }
                Poll::Suspended(Condition::Pause) => driver.resume(Vec::new())?,
                Poll::Suspended(Condition::Yield(yielded)) => {
                    return Err(CallError::Paused(Box::new(Continuation { driver, yielded })));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{native, NativeFunction, Suspender};
    use crate::pending::PendingOperation;

    #[test]
    fn test_non_suspending_call_completes_in_one_step() {
        let f = NativeFunction::new("id", |_, args| Ok(args)).into_ref();
        let mut ctx = ExecutionContext::new();
        let mut driver = CallDriver::new(f, vec![Value::Integer(1)]);
        match driver.step(&mut ctx).unwrap() {
            Poll::Complete(v) => assert_eq!(v, vec![Value::Integer(1)]),
            other => panic!("expected completion, got {:?}", other),
        }
        assert_eq!(driver.steps(), 1);
        assert_eq!(driver.step(&mut ctx).unwrap_err(), ProtocolViolation::CallFinished);
    }

    #[test]
    fn test_stateless_origin_as_target() {
        let y = Suspender::yielding("yield").into_ref();
        let mut ctx = ExecutionContext::new();
        let mut driver = CallDriver::new(y, vec![Value::Integer(3)]);
        assert!(matches!(driver.step(&mut ctx).unwrap(), Poll::Suspended(Condition::Yield(_))));
        // Unsatisfied: no progress.
        assert!(matches!(driver.step(&mut ctx).unwrap(), Poll::Suspended(_)));
        assert_eq!(driver.steps(), 1);
        driver.resume(vec![Value::from("back")]).unwrap();
        assert_eq!(
            driver.resume(vec![]).unwrap_err(),
            ProtocolViolation::AlreadySupplied
        );
        match driver.step(&mut ctx).unwrap() {
            Poll::Complete(v) => assert_eq!(v, vec![Value::from("back")]),
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_pending_rejects_manual_resume() {
        let (op, completer) = PendingOperation::new("read");
        let op_for_fn = op.clone();
        let f = Suspender::new("read", move |_, _| Ok(Condition::Pending(op_for_fn.clone())))
            .into_ref();
        let mut ctx = ExecutionContext::new();
        let mut driver = CallDriver::new(f, vec![]);
        driver.step(&mut ctx).unwrap();
        assert_eq!(
            driver.resume(vec![]).unwrap_err(),
            ProtocolViolation::OperationPending {
                label: "read".into()
            }
        );
        completer.complete(Ok(vec![Value::Integer(7)]));
        match driver.step(&mut ctx).unwrap() {
            Poll::Complete(v) => assert_eq!(v, vec![Value::Integer(7)]),
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_resume_before_start() {
        let f = NativeFunction::new("f", |_, _| Ok(vec![])).into_ref();
        let mut driver = CallDriver::new(f, vec![]);
        assert_eq!(driver.resume(vec![]).unwrap_err(), ProtocolViolation::NotSuspended);
    }

    #[test]
    fn test_executor_yield_round_trip() {
        let y = Suspender::yielding("yield").into_ref();
        let mut ctx = ExecutionContext::new();
        let k = Executor::call(&mut ctx, y, vec![Value::Integer(1)])
            .unwrap_err()
            .into_continuation()
            .unwrap();
        assert_eq!(k.yielded(), &[Value::Integer(1)]);
        assert_eq!(k.origin(), "yield");
        let out = Executor::resume(&mut ctx, k, vec![Value::Integer(2)]).unwrap();
        assert_eq!(out, vec![Value::Integer(2)]);
    }

    #[test]
    fn test_executor_reports_failure() {
        let f = native("boom", |_, _| Err(LuaError::new("boom")));
        let mut ctx = ExecutionContext::new();
        let err = Executor::call(&mut ctx, f.as_function().unwrap().clone(), vec![]).unwrap_err();
        assert_eq!(err.as_failure().unwrap().message(), "boom");
    }
}
