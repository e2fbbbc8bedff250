//! # Frame Programs
//!
//! A [`Proto`] is the executable form of one compiled function. Its code
//! operates over three register files:
//!
//! | File | Holds | Indexed by |
//! |------|-------|------------|
//! | registers | single values | [`Reg`] |
//! | lists | value lists from calls and `...` | [`ListReg`] |
//! | variables | Lua locals; captured ones live in shared cells | var index |
//!
//! Every `Call` op names a [`CallSite`] listing exactly the registers, lists,
//! variables and arguments that are read after the call returns. A frame
//! that suspends at that call saves those and nothing else.

use std::sync::Arc;

use crate::arith::{BinaryOp, UnaryOp};
use crate::value::Value;

/// Index into a frame's single-value registers.
pub type Reg = u32;

/// Index into a frame's value-list registers.
pub type ListReg = u32;

/// Which numeric `for` control value a coercion checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForRole {
    Initial,
    Limit,
    Step,
}

impl ForRole {
    pub fn describe(self) -> &'static str {
        match self {
            ForRole::Initial => "initial value",
            ForRole::Limit => "limit",
            ForRole::Step => "step",
        }
    }
}

/// Where a new closure's upvalue comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    /// A captured variable of the enclosing frame.
    Var(u32),
    /// One of the enclosing closure's own upvalues.
    Upvalue(u32),
}

/// One frame instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    LoadArg { dst: Reg, index: u32 },
    LoadConst { dst: Reg, index: u32 },
    Varargs { dst: ListReg },
    VarInit { var: u32, src: Reg },
    VarLoad { dst: Reg, var: u32 },
    VarStore { var: u32, src: Reg },
    UpLoad { dst: Reg, upvalue: u32 },
    UpStore { upvalue: u32, src: Reg },
    Binary { dst: Reg, op: BinaryOp, lhs: Reg, rhs: Reg },
    Unary { dst: Reg, op: UnaryOp, operand: Reg },
    Index { dst: Reg, table: Reg, key: Reg },
    SetIndex { table: Reg, key: Reg, value: Reg },
    NewTable {
        dst: Reg,
        array: Vec<Reg>,
        fields: Vec<(Reg, Reg)>,
        spread: Option<ListReg>,
    },
    Closure { dst: Reg, proto: u32, captures: Vec<CaptureSource> },
    Call {
        dst: ListReg,
        callee: Reg,
        args: Vec<Reg>,
        spread: Option<ListReg>,
        site: u32,
    },
    Select { dst: Reg, list: ListReg, index: u32 },
    ForCoerce { dst: Reg, src: Reg, role: ForRole },
    ForPrep {
        dst: Reg,
        src: Reg,
        initial: Reg,
        step: Reg,
        role: ForRole,
    },
    ForTest { dst: Reg, index: Reg, limit: Reg, step: Reg },
    ForStep { dst: Reg, index: Reg, limit: Reg, step: Reg },
    Jump { target: u32 },
    Branch { cond: Reg, then_pc: u32, else_pc: u32 },
    Return { values: Vec<Reg>, spread: Option<ListReg> },
    TailCall { callee: Reg, args: Vec<Reg>, spread: Option<ListReg> },
}

/// Values read after a call returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallSite {
    /// Program counter of the `Call` op.
    pub pc: u32,
    pub regs: Vec<Reg>,
    pub lists: Vec<ListReg>,
    pub vars: Vec<u32>,
    pub args: Vec<u32>,
    pub varargs: bool,
}

/// An executable function.
#[derive(Debug, Clone)]
pub struct Proto {
    pub name: String,
    pub chunk: Arc<str>,
    pub num_params: u32,
    pub is_vararg: bool,
    pub num_regs: u32,
    pub num_lists: u32,
    /// One entry per variable: `true` if captured by a nested closure.
    pub vars: Vec<bool>,
    pub num_upvalues: u32,
    pub constants: Vec<Value>,
    pub code: Vec<Op>,
    /// Source line per op.
    pub lines: Vec<u32>,
    pub call_sites: Vec<CallSite>,
}

impl Proto {
    /// Source line of the op at `pc`.
    pub fn line(&self, pc: usize) -> u32 {
        self.lines.get(pc).copied().unwrap_or(0)
    }
}

/// The protos of one compiled chunk, in module order. Proto 0 is the main
/// chunk; `Closure` ops refer to siblings by index.
#[derive(Debug, Clone)]
pub struct LoadedChunk {
    pub name: Arc<str>,
    pub protos: Vec<Arc<Proto>>,
}

impl LoadedChunk {
    pub fn new(name: impl AsRef<str>, protos: Vec<Proto>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            protos: protos.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn main(&self) -> Option<&Arc<Proto>> {
        self.protos.first()
    }

    pub fn len(&self) -> usize {
        self.protos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protos.is_empty()
    }
}
