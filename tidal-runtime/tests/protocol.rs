//! Resumable call protocol tests.
//!
//! Uses hand-written callables so each frame's invoke and resume can be
//! observed directly.

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use tidal_runtime::dispatch;
use tidal_runtime::{
    CallDriver, CallError, CallableId, Condition, ExecutionContext, Executor, FunctionRef,
    LuaError, LuaFunction, NativeFunction, Outcome, PendingOperation, Poll, ProtocolViolation,
    ResumeState, Suspender, Value,
};

type Log = Arc<Mutex<Vec<String>>>;

/// Calls `inner` and appends its own name to the results.
struct Relay {
    id: CallableId,
    name: &'static str,
    inner: FunctionRef,
    log: Log,
}

struct RelayState {
    inner: FunctionRef,
    inner_state: Option<ResumeState>,
}

impl Relay {
    fn new(name: &'static str, inner: FunctionRef, log: &Log) -> FunctionRef {
        Arc::new(Relay {
            id: CallableId::fresh(),
            name,
            inner,
            log: log.clone(),
        })
    }

    fn finish(
        &self,
        ctx: &mut ExecutionContext,
        callee: FunctionRef,
        outcome: Outcome,
    ) -> Result<Outcome, ProtocolViolation> {
        match outcome {
            Outcome::Return => {
                let mut values = ctx.take_returns();
                values.push(Value::from(self.name));
                ctx.set_returns(values);
                Ok(Outcome::Return)
            }
            Outcome::Fail(err) => Ok(Outcome::Fail(err)),
            Outcome::Suspend(s) => {
                self.log.lock().push(format!("capture {}", self.name));
                Ok(Outcome::Suspend(s.capture(|inner_state| {
                    ResumeState::new(
                        self.id,
                        RelayState {
                            inner: callee,
                            inner_state,
                        },
                    )
                })))
            }
        }
    }
}

impl LuaFunction for Relay {
    fn name(&self) -> &str {
        self.name
    }

    fn id(&self) -> CallableId {
        self.id
    }

    fn invoke(&self, ctx: &mut ExecutionContext, args: Vec<Value>) -> Result<Outcome, ProtocolViolation> {
        let mut callee = self.inner.clone();
        let outcome = dispatch::call(ctx, &mut callee, args)?;
        self.finish(ctx, callee, outcome)
    }

    fn resume(&self, ctx: &mut ExecutionContext, state: ResumeState) -> Result<Outcome, ProtocolViolation> {
        let saved: RelayState = state.take(self.id)?;
        self.log.lock().push(format!("resume {}", self.name));
        let mut callee = saved.inner;
        let outcome = match saved.inner_state {
            Some(inner) => dispatch::resume(ctx, &mut callee, inner)?,
            None => match ctx.take_continuation() {
                Some(Ok(values)) => {
                    ctx.set_returns(values);
                    Outcome::Return
                }
                Some(Err(err)) => Outcome::Fail(err),
                None => return Err(ProtocolViolation::MissingContinuation),
            },
        };
        self.finish(ctx, callee, outcome)
    }
}

/// Yields `remaining` times, keeping its own state, then returns.
struct Ticker {
    id: CallableId,
}

impl LuaFunction for Ticker {
    fn name(&self) -> &str {
        "ticker"
    }

    fn id(&self) -> CallableId {
        self.id
    }

    fn invoke(&self, ctx: &mut ExecutionContext, args: Vec<Value>) -> Result<Outcome, ProtocolViolation> {
        let remaining = args.first().and_then(Value::as_integer).unwrap_or(0);
        self.tick(ctx, remaining)
    }

    fn resume(&self, ctx: &mut ExecutionContext, state: ResumeState) -> Result<Outcome, ProtocolViolation> {
        let remaining: i64 = state.take(self.id)?;
        match ctx.take_continuation() {
            Some(Ok(_)) => self.tick(ctx, remaining - 1),
            Some(Err(err)) => Ok(Outcome::Fail(err)),
            None => Err(ProtocolViolation::MissingContinuation),
        }
    }
}

impl Ticker {
    fn tick(&self, ctx: &mut ExecutionContext, remaining: i64) -> Result<Outcome, ProtocolViolation> {
        if remaining <= 0 {
            ctx.set_returns(vec![Value::from("done")]);
            return Ok(Outcome::Return);
        }
        Ok(Outcome::Suspend(tidal_runtime::Suspension::with_state(
            Condition::Yield(vec![Value::Integer(remaining)]),
            "ticker",
            ResumeState::new(self.id, remaining),
        )))
    }
}

fn chain(inner: FunctionRef) -> (FunctionRef, Log) {
    let log = Log::default();
    let b = Relay::new("B", inner, &log);
    let a = Relay::new("A", b, &log);
    (a, log)
}

fn expect_suspension(outcome: Outcome) -> tidal_runtime::Suspension {
    match outcome {
        Outcome::Suspend(s) => s,
        other => panic!("expected suspension, got {:?}", other),
    }
}

#[test]
fn test_non_suspending_call_completes_in_one_invoke() {
    let (a, log) = chain(NativeFunction::new("C", |_, _| Ok(vec![Value::Integer(0)])).into_ref());
    let mut ctx = ExecutionContext::new();
    let mut driver = CallDriver::new(a, vec![]);
    match driver.step(&mut ctx).unwrap() {
        Poll::Complete(values) => assert_eq!(
            values,
            vec![Value::Integer(0), Value::from("B"), Value::from("A")]
        ),
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(driver.steps(), 1);
    assert!(log.lock().is_empty());
}

#[test]
fn test_nested_chain_captures_two_states() {
    let (a, log) = chain(Suspender::yielding("C").into_ref());
    let mut ctx = ExecutionContext::new();
    let s = expect_suspension(a.invoke(&mut ctx, vec![Value::Integer(1)]).unwrap());
    assert_eq!(s.links(), 2);
    assert_eq!(s.origin(), "C");
    assert_eq!(s.state().unwrap().owner(), a.id());
    assert_eq!(*log.lock(), vec!["capture B", "capture A"]);
}

#[test]
fn test_nested_chain_resumes_outer_to_inner() {
    let (a, log) = chain(Suspender::yielding("C").into_ref());
    let mut ctx = ExecutionContext::new();
    let mut driver = CallDriver::new(a, vec![Value::Integer(1)]);

    match driver.step(&mut ctx).unwrap() {
        Poll::Suspended(Condition::Yield(values)) => assert_eq!(values, vec![Value::Integer(1)]),
        other => panic!("expected yield, got {:?}", other),
    }
    log.lock().clear();

    driver.resume(vec![Value::from("k")]).unwrap();
    match driver.step(&mut ctx).unwrap() {
        Poll::Complete(values) => assert_eq!(
            values,
            vec![Value::from("k"), Value::from("B"), Value::from("A")]
        ),
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(*log.lock(), vec!["resume A", "resume B"]);
}

#[test]
fn test_resume_before_inner_condition_satisfied_is_rejected() {
    let (a, _log) = chain(Suspender::yielding("C").into_ref());
    let mut ctx = ExecutionContext::new();
    let s = expect_suspension(a.invoke(&mut ctx, vec![]).unwrap());
    let state = s.state().unwrap().clone();

    let mut callee = a.clone();
    assert_eq!(
        dispatch::resume(&mut ctx, &mut callee, state).unwrap_err(),
        ProtocolViolation::MissingContinuation
    );
}

#[test]
fn test_second_resume_with_consumed_state() {
    let ticker: FunctionRef = Arc::new(Ticker {
        id: CallableId::fresh(),
    });
    let mut ctx = ExecutionContext::new();
    let s = expect_suspension(ticker.invoke(&mut ctx, vec![Value::Integer(1)]).unwrap());
    let state = s.state().unwrap().clone();

    ctx.supply_continuation(Ok(vec![])).unwrap();
    assert!(matches!(ticker.resume(&mut ctx, state.clone()).unwrap(), Outcome::Return));
    assert_eq!(ctx.take_returns(), vec![Value::from("done")]);

    ctx.supply_continuation(Ok(vec![])).unwrap();
    assert_eq!(
        ticker.resume(&mut ctx, state.clone()).unwrap_err(),
        ProtocolViolation::StateConsumed { state: state.id() }
    );
}

#[test]
fn test_foreign_state_is_rejected() {
    let (a, _log) = chain(Suspender::yielding("C").into_ref());
    let ticker: FunctionRef = Arc::new(Ticker {
        id: CallableId::fresh(),
    });
    let mut ctx = ExecutionContext::new();
    let s = expect_suspension(a.invoke(&mut ctx, vec![]).unwrap());
    let state = s.state().unwrap().clone();
    assert!(matches!(
        ticker.resume(&mut ctx, state.clone()),
        Err(ProtocolViolation::ForeignState { .. })
    ));
    assert!(!state.is_consumed());
}

#[test]
fn test_failure_propagates_without_states() {
    let failing = NativeFunction::new("C", |_, _| Err(LuaError::new("C failed"))).into_ref();
    let (a, log) = chain(failing);
    let mut ctx = ExecutionContext::new();
    match a.invoke(&mut ctx, vec![]).unwrap() {
        Outcome::Fail(err) => assert_eq!(err.message(), "C failed"),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(log.lock().is_empty());
}

#[test]
fn test_failure_after_resume_propagates() {
    let (a, _log) = chain(Suspender::yielding("C").into_ref());
    let mut ctx = ExecutionContext::new();
    let mut driver = CallDriver::new(a, vec![]);
    driver.step(&mut ctx).unwrap();
    driver.fail(LuaError::new("cancelled")).unwrap();
    match driver.step(&mut ctx).unwrap() {
        Poll::Failed(err) => assert_eq!(err.message(), "cancelled"),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(driver.is_finished());
}

#[test]
fn test_unbounded_round_trips() {
    let ticker: FunctionRef = Arc::new(Ticker {
        id: CallableId::fresh(),
    });
    let (a, _log) = chain(ticker);
    let mut ctx = ExecutionContext::new();
    let mut driver = CallDriver::new(a, vec![Value::Integer(500)]);
    let mut yields = 0;
    loop {
        match driver.step(&mut ctx).unwrap() {
            Poll::Suspended(Condition::Yield(_)) => {
                yields += 1;
                driver.resume(vec![]).unwrap();
            }
            Poll::Complete(values) => {
                assert_eq!(values[0], Value::from("done"));
                break;
            }
            other => panic!("unexpected poll {:?}", other),
        }
    }
    assert_eq!(yields, 500);
    assert_eq!(driver.steps(), 501);
}

#[test]
fn test_pending_operation_completed_from_another_thread() {
    let (op, completer) = PendingOperation::new("fetch");
    let c = Suspender::new("fetch", move |_, _| Ok(Condition::Pending(op.clone()))).into_ref();
    let (a, _log) = chain(c);

    let worker = thread::spawn(move || {
        thread::sleep(std::time::Duration::from_millis(10));
        completer.complete(Ok(vec![Value::Integer(200)]));
    });
    let mut ctx = ExecutionContext::new();
    let values = Executor::call(&mut ctx, a, vec![]).unwrap();
    worker.join().unwrap();
    assert_eq!(values, vec![Value::Integer(200), Value::from("B"), Value::from("A")]);
}

#[test]
fn test_pending_failure_reaches_top() {
    let op = PendingOperation::ready("open", Err(LuaError::new("no such file")));
    let c = Suspender::new("open", move |_, _| Ok(Condition::Pending(op.clone()))).into_ref();
    let (a, _log) = chain(c);
    let mut ctx = ExecutionContext::new();
    match Executor::call(&mut ctx, a, vec![]) {
        Err(CallError::Failed(err)) => assert_eq!(err.message(), "no such file"),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn test_executor_yield_hands_back_continuation() {
    let (a, _log) = chain(Suspender::yielding("C").into_ref());
    let mut ctx = ExecutionContext::new();
    let k = match Executor::call(&mut ctx, a, vec![Value::Integer(9)]) {
        Err(CallError::Paused(k)) => *k,
        other => panic!("expected pause, got {:?}", other),
    };
    assert_eq!(k.yielded(), &[Value::Integer(9)]);
    let values = Executor::resume(&mut ctx, k, vec![Value::Integer(10)]).unwrap();
    assert_eq!(values[0], Value::Integer(10));
}

#[test]
fn test_independent_chains_on_threads() {
    let handles: Vec<_> = (0..4)
        .map(|n| {
            thread::spawn(move || {
                let ticker: FunctionRef = Arc::new(Ticker {
                    id: CallableId::fresh(),
                });
                let (a, _log) = chain(ticker);
                let mut ctx = ExecutionContext::new();
                let mut driver = CallDriver::new(a, vec![Value::Integer(n + 1)]);
                let mut yields = 0;
                while let Poll::Suspended(_) = driver.step(&mut ctx).unwrap() {
                    yields += 1;
                    driver.resume(vec![]).unwrap();
                }
                yields
            })
        })
        .collect();
    let counts: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(counts, vec![1, 2, 3, 4]);
}
