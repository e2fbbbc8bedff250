//! Call dispatch with tail-call resolution.
//!
//! A callable that ends in a tail call deposits the request in the return
//! buffer and returns. The dispatcher performs the call in a loop, so tail
//! recursion runs in constant host stack. `callee` is updated to whichever
//! callable actually produced the outcome: a suspension's state belongs to
//! that callable and must be resumed on it.

use tracing::trace;

use crate::context::ExecutionContext;
use crate::error::ProtocolViolation;
use crate::function::{CallResult, FunctionRef, Outcome};
use crate::state::ResumeState;
use crate::value::Value;

/// Invoke `callee` and resolve tail calls.
pub fn call(ctx: &mut ExecutionContext, callee: &mut FunctionRef, args: Vec<Value>) -> CallResult {
    let outcome = callee.invoke(ctx, args)?;
    resolve(ctx, callee, outcome)
}

/// Resume `callee` from `state` and resolve tail calls.
pub fn resume(ctx: &mut ExecutionContext, callee: &mut FunctionRef, state: ResumeState) -> CallResult {
    if state.owner() != callee.id() {
        return Err(ProtocolViolation::ForeignState {
            state: state.id(),
            owner: state.owner(),
            callee: callee.id(),
        });
    }
    trace!(callee = callee.name(), state = %state.id(), "resume");
    let outcome = callee.resume(ctx, state)?;
    resolve(ctx, callee, outcome)
}

fn resolve(ctx: &mut ExecutionContext, callee: &mut FunctionRef, mut outcome: Outcome) -> CallResult {
    loop {
        match outcome {
            Outcome::Return => match ctx.take_tail_call() {
                Some((target, args)) => {
                    trace!(from = callee.name(), to = target.name(), "tail call");
                    *callee = target;
                    outcome = callee.invoke(ctx, args)?;
                }
                None => return Ok(Outcome::Return),
            },
            other => return Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{LuaFunction, NativeFunction};
    use crate::state::CallableId;
    use std::sync::Arc;

    struct Trampoline {
        id: CallableId,
        target: FunctionRef,
    }

    impl LuaFunction for Trampoline {
        fn name(&self) -> &str {
            "trampoline"
        }

        fn id(&self) -> CallableId {
            self.id
        }

        fn invoke(&self, ctx: &mut ExecutionContext, args: Vec<Value>) -> CallResult {
            ctx.set_tail_call(self.target.clone(), args);
            Ok(Outcome::Return)
        }
    }

    #[test]
    fn test_tail_calls_resolved() {
        let last = NativeFunction::new("last", |_, args| Ok(args)).into_ref();
        let mut callee: FunctionRef = Arc::new(Trampoline {
            id: CallableId::fresh(),
            target: last.clone(),
        });
        let mut ctx = ExecutionContext::new();
        let outcome = call(&mut ctx, &mut callee, vec![Value::Integer(9)]).unwrap();
        assert!(matches!(outcome, Outcome::Return));
        assert_eq!(ctx.take_returns(), vec![Value::Integer(9)]);
        assert_eq!(callee.id(), last.id());
    }

    #[test]
    fn test_resume_checks_owner() {
        let mut callee = NativeFunction::new("f", |_, _| Ok(vec![])).into_ref();
        let stranger = CallableId::fresh();
        let state = ResumeState::new(stranger, ());
        let mut ctx = ExecutionContext::new();
        assert!(matches!(
            resume(&mut ctx, &mut callee, state),
            Err(ProtocolViolation::ForeignState { .. })
        ));
    }
}
