//! # Compiled Closures
//!
//! A [`LuaClosure`] runs a [`Proto`] frame program and implements the
//! resumable protocol for it.
//!
//! ## Suspending
//!
//! Calls are the only suspension points. When a callee suspends, the frame
//! saves the live values its [`CallSite`] names, plus the callee and its
//! nested state, and returns the suspension outward. A frame can also pause
//! itself before a call when the context's scheduling policy asks it to.
//!
//! ## Resuming
//!
//! ```text
//! saved pending        on resume
//! ─────────────────    ─────────────────────────────────────────────
//! Call { state: s }    resume the callee with s, then continue
//! Call { state: - }    take the continuation value as the call's results
//! Pause                take the continuation, then make the call
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::arith::{self, Number};
use crate::context::ExecutionContext;
use crate::dispatch;
use crate::error::{LuaError, ProtocolViolation};
use crate::function::{CallResult, Condition, FunctionRef, LuaFunction, Outcome, Suspension};
use crate::proto::{CallSite, CaptureSource, ForRole, ListReg, LoadedChunk, Op, Proto, Reg};
use crate::state::{CallableId, ResumeState};
use crate::table::TableRef;
use crate::value::Value;

/// A shared variable cell, as captured by closures.
pub type Cell = Arc<Mutex<Value>>;

/// Turn a Lua error raised by the op at `pc` into a located failure.
macro_rules! lua_try {
    ($closure:expr, $pc:expr, $e:expr) => {
        match $e {
            Ok(v) => v,
            Err(err) => return Ok(Outcome::Fail($closure.locate($pc, err))),
        }
    };
}

#[derive(Clone)]
enum VarSlot {
    Plain(Value),
    Shared(Cell),
}

impl VarSlot {
    fn get(&self) -> Value {
        match self {
            VarSlot::Plain(v) => v.clone(),
            VarSlot::Shared(cell) => cell.lock().clone(),
        }
    }

    fn set(&mut self, value: Value) {
        match self {
            VarSlot::Plain(v) => *v = value,
            VarSlot::Shared(cell) => *cell.lock() = value,
        }
    }

    /// The cell backing this variable, promoting a plain slot if needed.
    fn cell(&mut self) -> Cell {
        match self {
            VarSlot::Shared(cell) => cell.clone(),
            VarSlot::Plain(v) => {
                let cell = Arc::new(Mutex::new(std::mem::take(v)));
                *self = VarSlot::Shared(cell.clone());
                cell
            }
        }
    }
}

struct Frame {
    regs: Vec<Value>,
    lists: Vec<Vec<Value>>,
    vars: Vec<VarSlot>,
    args: Vec<Value>,
    varargs: Vec<Value>,
    pc: usize,
    skip_pause: bool,
}

impl Frame {
    fn blank(proto: &Proto) -> Self {
        Self {
            regs: vec![Value::Nil; proto.num_regs as usize],
            lists: vec![Vec::new(); proto.num_lists as usize],
            vars: vec![VarSlot::Plain(Value::Nil); proto.vars.len()],
            args: Vec::new(),
            varargs: Vec::new(),
            pc: 0,
            skip_pause: false,
        }
    }

    fn new(proto: &Proto, mut args: Vec<Value>) -> Self {
        let mut frame = Self::blank(proto);
        let params = proto.num_params as usize;
        if proto.is_vararg && args.len() > params {
            frame.varargs = args.split_off(params);
        } else {
            args.truncate(params);
        }
        frame.args = args;
        frame
    }

    fn call_args(&self, args: &[Reg], spread: Option<ListReg>) -> Vec<Value> {
        let mut out: Vec<Value> = args.iter().map(|&r| self.regs[r as usize].clone()).collect();
        if let Some(list) = spread {
            out.extend(self.lists[list as usize].iter().cloned());
        }
        out
    }

    /// Keep only what `site` says is live, plus `extra` operands.
    fn into_saved(
        mut self,
        site: u32,
        live: &CallSite,
        extra_regs: &[Reg],
        extra_lists: &[ListReg],
        pending: Pending,
    ) -> SavedFrame {
        let mut regs: Vec<Reg> = live.regs.iter().chain(extra_regs).copied().collect();
        regs.sort_unstable();
        regs.dedup();
        let mut lists: Vec<ListReg> = live.lists.iter().chain(extra_lists).copied().collect();
        lists.sort_unstable();
        lists.dedup();

        SavedFrame {
            pc: self.pc,
            site,
            regs: regs
                .into_iter()
                .map(|r| (r, std::mem::take(&mut self.regs[r as usize])))
                .collect(),
            lists: lists
                .into_iter()
                .map(|l| (l, std::mem::take(&mut self.lists[l as usize])))
                .collect(),
            vars: live
                .vars
                .iter()
                .map(|&v| (v, self.vars[v as usize].clone()))
                .collect(),
            args: live
                .args
                .iter()
                .filter_map(|&a| self.args.get(a as usize).map(|v| (a, v.clone())))
                .collect(),
            varargs: live.varargs.then(|| std::mem::take(&mut self.varargs)),
            pending,
        }
    }
}

/// What a suspended frame was doing at its call site.
enum Pending {
    /// The callee suspended; `state` is its own state, if it keeps one.
    Call {
        callee: FunctionRef,
        state: Option<ResumeState>,
    },
    /// The frame paused itself before making the call.
    Pause,
}

/// The snapshot a [`LuaClosure`] stores in its resume state.
struct SavedFrame {
    pc: usize,
    site: u32,
    regs: Vec<(Reg, Value)>,
    lists: Vec<(ListReg, Vec<Value>)>,
    vars: Vec<(u32, VarSlot)>,
    args: Vec<(u32, Value)>,
    varargs: Option<Vec<Value>>,
    pending: Pending,
}

impl SavedFrame {
    fn restore(self, proto: &Proto) -> (Frame, Pending, u32) {
        let mut frame = Frame::blank(proto);
        frame.pc = self.pc;
        for (r, v) in self.regs {
            frame.regs[r as usize] = v;
        }
        for (l, v) in self.lists {
            frame.lists[l as usize] = v;
        }
        for (i, slot) in self.vars {
            frame.vars[i as usize] = slot;
        }
        if let Some(max) = self.args.iter().map(|(a, _)| *a as usize + 1).max() {
            frame.args = vec![Value::Nil; max];
            for (a, v) in self.args {
                frame.args[a as usize] = v;
            }
        }
        frame.varargs = self.varargs.unwrap_or_default();
        (frame, self.pending, self.site)
    }
}

/// A compiled Lua function together with its upvalues.
pub struct LuaClosure {
    id: CallableId,
    proto: Arc<Proto>,
    chunk: Arc<LoadedChunk>,
    upvalues: Vec<Cell>,
}

impl LuaClosure {
    /// Instantiate proto `index` of `chunk` with the given upvalue cells.
    pub fn new(chunk: Arc<LoadedChunk>, index: usize, upvalues: Vec<Cell>) -> Option<Self> {
        let proto = chunk.protos.get(index)?.clone();
        if upvalues.len() != proto.num_upvalues as usize {
            return None;
        }
        Some(Self {
            id: CallableId::fresh(),
            proto,
            chunk,
            upvalues,
        })
    }

    /// Instantiate the main function of `chunk` with `_ENV` bound to `env`.
    pub fn main(chunk: Arc<LoadedChunk>, env: TableRef) -> Option<FunctionRef> {
        let wants_env = chunk.main()?.num_upvalues > 0;
        let upvalues = if wants_env {
            vec![Arc::new(Mutex::new(Value::Table(env)))]
        } else {
            Vec::new()
        };
        let closure = Self::new(chunk, 0, upvalues)?;
        Some(Arc::new(closure))
    }

    pub fn proto(&self) -> &Proto {
        &self.proto
    }

    fn locate(&self, pc: usize, err: LuaError) -> LuaError {
        err.with_location(&self.proto.chunk, self.proto.line(pc))
    }

    fn site(&self, site: u32) -> &CallSite {
        &self.proto.call_sites[site as usize]
    }

    fn suspend_in_call(
        &self,
        frame: Frame,
        site: u32,
        callee: FunctionRef,
        suspension: Suspension,
    ) -> Outcome {
        trace!(
            function = %self.proto.name,
            pc = frame.pc,
            origin = suspension.origin(),
            "capturing frame"
        );
        let id = self.id;
        let live = self.site(site);
        Outcome::Suspend(suspension.capture(|inner| {
            let pending = Pending::Call {
                callee,
                state: inner,
            };
            ResumeState::new(id, frame.into_saved(site, live, &[], &[], pending))
        }))
    }

    fn pause_before_call(&self, frame: Frame, site: u32) -> Outcome {
        let (operands, spread) = match &self.proto.code[frame.pc] {
            Op::Call {
                callee, args, spread, ..
            } => {
                let mut regs = args.clone();
                regs.push(*callee);
                (regs, spread.iter().copied().collect::<Vec<_>>())
            }
            _ => (Vec::new(), Vec::new()),
        };
        trace!(function = %self.proto.name, pc = frame.pc, "pausing before call");
        let saved = frame.into_saved(site, self.site(site), &operands, &spread, Pending::Pause);
        Outcome::Suspend(Suspension::with_state(
            Condition::Pause,
            self.proto.name.clone(),
            ResumeState::new(self.id, saved),
        ))
    }

    fn continue_call(&self, ctx: &mut ExecutionContext, saved: SavedFrame) -> CallResult {
        let (mut frame, pending, site) = saved.restore(&self.proto);
        let dst = match &self.proto.code[frame.pc] {
            Op::Call { dst, .. } => *dst,
            _ => {
                return Err(ProtocolViolation::InvalidResumePoint {
                    function: self.proto.name.clone(),
                    pc: frame.pc,
                })
            }
        };

        let results = match pending {
            Pending::Pause => {
                match ctx.take_continuation() {
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Ok(Outcome::Fail(err)),
                    None => return Err(ProtocolViolation::MissingContinuation),
                }
                frame.skip_pause = true;
                return self.run(ctx, frame);
            }
            Pending::Call {
                mut callee,
                state: Some(inner),
            } => {
                ctx.set_line(self.proto.line(frame.pc));
                match dispatch::resume(ctx, &mut callee, inner)? {
                    Outcome::Return => ctx.take_returns(),
                    Outcome::Fail(err) => return Ok(Outcome::Fail(err)),
                    Outcome::Suspend(s) => return Ok(self.suspend_in_call(frame, site, callee, s)),
                }
            }
            Pending::Call { state: None, .. } => match ctx.take_continuation() {
                Some(Ok(values)) => values,
                Some(Err(err)) => return Ok(Outcome::Fail(err)),
                None => return Err(ProtocolViolation::MissingContinuation),
            },
        };

        frame.lists[dst as usize] = results;
        frame.pc += 1;
        self.run(ctx, frame)
    }

    fn run(&self, ctx: &mut ExecutionContext, mut frame: Frame) -> CallResult {
        let proto = &*self.proto;
        loop {
            let pc = frame.pc;
            frame.pc += 1;
            match &proto.code[pc] {
                Op::LoadArg { dst, index } => {
                    frame.regs[*dst as usize] =
                        frame.args.get(*index as usize).cloned().unwrap_or_default();
                }
                Op::LoadConst { dst, index } => {
                    frame.regs[*dst as usize] = proto.constants[*index as usize].clone();
                }
                Op::Varargs { dst } => {
                    frame.lists[*dst as usize] = frame.varargs.clone();
                }
                Op::VarInit { var, src } => {
                    let value = frame.regs[*src as usize].clone();
                    frame.vars[*var as usize] = if proto.vars[*var as usize] {
                        VarSlot::Shared(Arc::new(Mutex::new(value)))
                    } else {
                        VarSlot::Plain(value)
                    };
                }
                Op::VarLoad { dst, var } => {
                    frame.regs[*dst as usize] = frame.vars[*var as usize].get();
                }
                Op::VarStore { var, src } => {
                    let value = frame.regs[*src as usize].clone();
                    frame.vars[*var as usize].set(value);
                }
                Op::UpLoad { dst, upvalue } => {
                    frame.regs[*dst as usize] = self.upvalues[*upvalue as usize].lock().clone();
                }
                Op::UpStore { upvalue, src } => {
                    *self.upvalues[*upvalue as usize].lock() = frame.regs[*src as usize].clone();
                }
                Op::Binary { dst, op, lhs, rhs } => {
                    let value = lua_try!(
                        self,
                        pc,
                        arith::binary(*op, &frame.regs[*lhs as usize], &frame.regs[*rhs as usize])
                    );
                    frame.regs[*dst as usize] = value;
                }
                Op::Unary { dst, op, operand } => {
                    let value = lua_try!(self, pc, arith::unary(*op, &frame.regs[*operand as usize]));
                    frame.regs[*dst as usize] = value;
                }
                Op::Index { dst, table, key } => {
                    let value = match &frame.regs[*table as usize] {
                        Value::Table(t) => t.get(&frame.regs[*key as usize]),
                        other => lua_try!(self, pc, Err(index_error(other))),
                    };
                    frame.regs[*dst as usize] = value;
                }
                Op::SetIndex { table, key, value } => match &frame.regs[*table as usize] {
                    Value::Table(t) => {
                        let key = frame.regs[*key as usize].clone();
                        let value = frame.regs[*value as usize].clone();
                        lua_try!(self, pc, t.set(key, value));
                    }
                    other => lua_try!(self, pc, Err(index_error(other))),
                },
                Op::NewTable {
                    dst,
                    array,
                    fields,
                    spread,
                } => {
                    let table = TableRef::new();
                    for (k, v) in fields {
                        let key = frame.regs[*k as usize].clone();
                        let value = frame.regs[*v as usize].clone();
                        lua_try!(self, pc, table.set(key, value));
                    }
                    for (i, value) in frame.call_args(array, *spread).into_iter().enumerate() {
                        lua_try!(self, pc, table.set(Value::Integer(i as i64 + 1), value));
                    }
                    frame.regs[*dst as usize] = Value::Table(table);
                }
                Op::Closure {
                    dst,
                    proto: index,
                    captures,
                } => {
                    let upvalues = captures
                        .iter()
                        .map(|capture| match capture {
                            CaptureSource::Var(v) => frame.vars[*v as usize].cell(),
                            CaptureSource::Upvalue(u) => self.upvalues[*u as usize].clone(),
                        })
                        .collect();
                    let closure = LuaClosure::new(self.chunk.clone(), *index as usize, upvalues)
                        .map(|c| Value::Function(Arc::new(c)));
                    let closure = lua_try!(
                        self,
                        pc,
                        closure.ok_or_else(|| LuaError::new("malformed closure prototype"))
                    );
                    frame.regs[*dst as usize] = closure;
                }
                Op::Call {
                    dst,
                    callee,
                    args,
                    spread,
                    site,
                } => {
                    if !std::mem::take(&mut frame.skip_pause) && ctx.should_pause() {
                        frame.pc = pc;
                        return Ok(self.pause_before_call(frame, *site));
                    }
                    let mut target = match &frame.regs[*callee as usize] {
                        Value::Function(f) => f.clone(),
                        other => lua_try!(self, pc, Err(call_error(other))),
                    };
                    let argv = frame.call_args(args, *spread);
                    ctx.set_line(proto.line(pc));
                    match dispatch::call(ctx, &mut target, argv)? {
                        Outcome::Return => frame.lists[*dst as usize] = ctx.take_returns(),
                        Outcome::Fail(err) => return Ok(Outcome::Fail(err)),
                        Outcome::Suspend(s) => {
                            frame.pc = pc;
                            return Ok(self.suspend_in_call(frame, *site, target, s));
                        }
                    }
                }
                Op::Select { dst, list, index } => {
                    frame.regs[*dst as usize] = frame.lists[*list as usize]
                        .get(*index as usize)
                        .cloned()
                        .unwrap_or_default();
                }
                Op::ForCoerce { dst, src, role } => {
                    let value = lua_try!(self, pc, for_coerce(&frame.regs[*src as usize], *role));
                    frame.regs[*dst as usize] = value;
                }
                Op::ForPrep {
                    dst,
                    src,
                    initial,
                    step,
                    role,
                } => {
                    let regs = &frame.regs;
                    let value = for_prep(
                        &regs[*src as usize],
                        &regs[*initial as usize],
                        &regs[*step as usize],
                        *role,
                    );
                    frame.regs[*dst as usize] = value;
                }
                Op::ForStep {
                    dst,
                    index,
                    limit,
                    step,
                } => {
                    let regs = &frame.regs;
                    let next = lua_try!(
                        self,
                        pc,
                        for_step(
                            &regs[*index as usize],
                            &regs[*limit as usize],
                            &regs[*step as usize],
                        )
                    );
                    frame.regs[*dst as usize] = next.unwrap_or(Value::Boolean(false));
                }
                Op::ForTest {
                    dst,
                    index,
                    limit,
                    step,
                } => {
                    let ascending = match &frame.regs[*step as usize] {
                        Value::Integer(i) => *i > 0,
                        Value::Float(f) => *f > 0.0,
                        _ => true,
                    };
                    let (a, b) = if ascending {
                        (&frame.regs[*index as usize], &frame.regs[*limit as usize])
                    } else {
                        (&frame.regs[*limit as usize], &frame.regs[*index as usize])
                    };
                    let in_range = lua_try!(self, pc, arith::compare(a, b))
                        .map_or(false, |o| o != std::cmp::Ordering::Greater);
                    frame.regs[*dst as usize] = Value::Boolean(in_range);
                }
                Op::Jump { target } => frame.pc = *target as usize,
                Op::Branch {
                    cond,
                    then_pc,
                    else_pc,
                } => {
                    frame.pc = if frame.regs[*cond as usize].is_truthy() {
                        *then_pc as usize
                    } else {
                        *else_pc as usize
                    };
                }
                Op::Return { values, spread } => {
                    ctx.set_returns(frame.call_args(values, *spread));
                    return Ok(Outcome::Return);
                }
                Op::TailCall {
                    callee,
                    args,
                    spread,
                } => {
                    let target = match &frame.regs[*callee as usize] {
                        Value::Function(f) => f.clone(),
                        other => lua_try!(self, pc, Err(call_error(other))),
                    };
                    ctx.set_tail_call(target, frame.call_args(args, *spread));
                    return Ok(Outcome::Return);
                }
            }
        }
    }
}

fn index_error(v: &Value) -> LuaError {
    LuaError::new(format!("attempt to index a {} value", v.type_name()))
}

fn call_error(v: &Value) -> LuaError {
    LuaError::new(format!("attempt to call a {} value", v.type_name()))
}

fn for_coerce(v: &Value, role: ForRole) -> Result<Value, LuaError> {
    let n = arith::to_number(v)
        .ok_or_else(|| LuaError::new(format!("'for' {} must be a number", role.describe())))?;
    if role == ForRole::Step && matches!(n, Number::Int(0)) {
        return Err(LuaError::new("'for' step is zero"));
    }
    Ok(n.into())
}

/// Convert one coerced control value to the loop's kind.
fn for_prep(value: &Value, initial: &Value, step: &Value, role: ForRole) -> Value {
    let integer_loop = matches!((initial, step), (Value::Integer(_), Value::Integer(_)));
    match (value, integer_loop) {
        (Value::Integer(i), false) => Value::Float(*i as f64),
        (Value::Float(f), true) if role == ForRole::Limit => {
            let ascending = matches!(step, Value::Integer(s) if *s > 0);
            integer_limit(*f, ascending)
        }
        (other, _) => other.clone(),
    }
}

/// Round a float limit toward the loop start. Limits past the integer range
/// saturate when the loop runs toward them, and stay floats otherwise, where
/// the first test already fails.
fn integer_limit(limit: f64, ascending: bool) -> Value {
    const BOUND: f64 = 9_223_372_036_854_775_808.0;
    let rounded = if ascending { limit.floor() } else { limit.ceil() };
    if rounded.is_nan() {
        Value::Float(rounded)
    } else if rounded >= BOUND {
        if ascending {
            Value::Integer(i64::MAX)
        } else {
            Value::Float(rounded)
        }
    } else if rounded < -BOUND {
        if ascending {
            Value::Float(rounded)
        } else {
            Value::Integer(i64::MIN)
        }
    } else {
        Value::Integer(rounded as i64)
    }
}

/// Advance a numeric loop; `None` once the next index would pass the limit.
fn for_step(index: &Value, limit: &Value, step: &Value) -> Result<Option<Value>, LuaError> {
    let next = match (index, step) {
        (Value::Integer(i), Value::Integer(s)) => match i.checked_add(*s) {
            Some(n) => Value::Integer(n),
            None => return Ok(None),
        },
        _ => arith::binary(arith::BinaryOp::Add, index, step)?,
    };
    let ascending = match step {
        Value::Integer(s) => *s > 0,
        Value::Float(f) => *f > 0.0,
        _ => true,
    };
    let (a, b) = if ascending { (&next, limit) } else { (limit, &next) };
    let in_range = arith::compare(a, b)?.map_or(false, |o| o != std::cmp::Ordering::Greater);
    Ok(in_range.then_some(next))
}

impl LuaFunction for LuaClosure {
    fn name(&self) -> &str {
        &self.proto.name
    }

    fn id(&self) -> CallableId {
        self.id
    }

    fn invoke(&self, ctx: &mut ExecutionContext, args: Vec<Value>) -> CallResult {
        if let Err(err) = ctx.enter(&self.proto.chunk) {
            return Ok(Outcome::Fail(self.locate(0, err)));
        }
        let result = self.run(ctx, Frame::new(&self.proto, args));
        ctx.leave();
        result
    }

    fn resume(&self, ctx: &mut ExecutionContext, state: ResumeState) -> CallResult {
        let saved: SavedFrame = state.take(self.id)?;
        if !matches!(self.proto.code.get(saved.pc), Some(Op::Call { .. })) {
            return Err(ProtocolViolation::InvalidResumePoint {
                function: self.proto.name.clone(),
                pc: saved.pc,
            });
        }
        if let Err(err) = ctx.enter(&self.proto.chunk) {
            return Ok(Outcome::Fail(self.locate(saved.pc, err)));
        }
        let result = self.continue_call(ctx, saved);
        ctx.leave();
        result
    }
}
