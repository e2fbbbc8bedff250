//! A finished IR function.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::origin::Origin;
use super::types::{
    Block, BlockId, Constant, FunctionId, Instr, InstrKind, Slot, SlotInfo, Terminator,
    UpvalueInfo, VarInfo,
};

/// One function's control-flow graph.
///
/// Blocks are numbered in reverse postorder with the entry at
/// [`BlockId::ENTRY`]; every block is reachable. The only way to obtain an
/// `IrFunction` is through [`FunctionBuilder::finish`](super::FunctionBuilder::finish)
/// or an optimisation pass over a finished one, so the invariants checked
/// there hold for every value of this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrFunction {
    pub(crate) id: FunctionId,
    pub(crate) name: String,
    pub(crate) params: Vec<String>,
    pub(crate) is_vararg: bool,
    pub(crate) line: u32,
    pub(crate) blocks: Vec<Block>,
    pub(crate) slots: Vec<SlotInfo>,
    pub(crate) vars: Vec<VarInfo>,
    pub(crate) upvalues: Vec<UpvalueInfo>,
    pub(crate) constants: Vec<Constant>,
}

impl IrFunction {
    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn num_params(&self) -> u32 {
        self.params.len() as u32
    }

    pub fn is_vararg(&self) -> bool {
        self.is_vararg
    }

    /// Line the function was defined on.
    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn entry(&self) -> &Block {
        self.block(BlockId::ENTRY)
    }

    pub fn slots(&self) -> &[SlotInfo] {
        &self.slots
    }

    pub fn origin(&self, slot: Slot) -> Origin {
        self.slots[slot.index()].origin
    }

    pub fn vars(&self) -> &[VarInfo] {
        &self.vars
    }

    pub fn upvalues(&self) -> &[UpvalueInfo] {
        &self.upvalues
    }

    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    /// All instructions, with their block.
    pub fn instrs(&self) -> impl Iterator<Item = (BlockId, &Instr)> {
        self.blocks.iter().enumerate().flat_map(|(i, block)| {
            block
                .instrs
                .iter()
                .map(move |instr| (BlockId::new(i as u32), instr))
        })
    }

    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.block(block).terminator.successors()
    }
}

fn list(slots: &[Slot], spread: Option<Slot>) -> String {
    let mut parts: Vec<String> = slots.iter().map(|s| s.to_string()).collect();
    if let Some(s) = spread {
        parts.push(format!("{}...", s));
    }
    parts.join(", ")
}

impl fmt::Display for InstrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrKind::LoadArg(i) => write!(f, "arg #{}", i),
            InstrKind::LoadConst(i) => write!(f, "const ^{}", i),
            InstrKind::Varargs => write!(f, "..."),
            InstrKind::VarInit { var, value } => write!(f, "init {} = {}", var, value),
            InstrKind::VarLoad(var) => write!(f, "load {}", var),
            InstrKind::VarStore { var, value } => write!(f, "store {} = {}", var, value),
            InstrKind::UpLoad(u) => write!(f, "upload {}", u),
            InstrKind::UpStore { upvalue, value } => write!(f, "upstore {} = {}", upvalue, value),
            InstrKind::Binary { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op.symbol(), rhs),
            InstrKind::Unary { op, operand } => write!(f, "{}{}", op.symbol(), operand),
            InstrKind::Index { table, key } => write!(f, "{}[{}]", table, key),
            InstrKind::SetIndex { table, key, value } => {
                write!(f, "{}[{}] = {}", table, key, value)
            }
            InstrKind::NewTable {
                array,
                fields,
                spread,
            } => {
                let fields: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| format!("[{}] = {}", k, v))
                    .collect();
                write!(f, "{{{}; {}}}", fields.join(", "), list(array, *spread))
            }
            InstrKind::Closure { function, captures } => {
                write!(f, "closure {} ({} upvalues)", function, captures.len())
            }
            InstrKind::Call {
                callee,
                args,
                spread,
            } => write!(f, "call {}({})", callee, list(args, *spread)),
            InstrKind::Select { list, index } => write!(f, "{}[{}]", list, index),
            InstrKind::ForCoerce { value, role } => write!(f, "for_coerce {:?} {}", role, value),
            InstrKind::ForPrep {
                value,
                initial,
                step,
                role,
            } => write!(f, "for_prep {:?} {} ({} {})", role, value, initial, step),
            InstrKind::ForTest { index, limit, step } => {
                write!(f, "for_test {} {} {}", index, limit, step)
            }
            InstrKind::ForStep { index, limit, step } => {
                write!(f, "for_step {} {} {}", index, limit, step)
            }
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Jump(target) => write!(f, "jump {}", target),
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => write!(f, "branch {} ? {} : {}", cond, then_block, else_block),
            Terminator::Return { values, spread } => write!(f, "return {}", list(values, *spread)),
            Terminator::TailCall {
                callee,
                args,
                spread,
            } => write!(f, "tailcall {}({})", callee, list(args, *spread)),
        }
    }
}

impl fmt::Display for IrFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut params = self.params.join(", ");
        if self.is_vararg {
            if !params.is_empty() {
                params.push_str(", ");
            }
            params.push_str("...");
        }
        writeln!(f, "function {} {}({}) {{", self.id, self.name, params)?;
        for (i, c) in self.constants.iter().enumerate() {
            writeln!(f, "    const ^{} = {}", i, c)?;
        }
        for (i, block) in self.blocks.iter().enumerate() {
            writeln!(f, "  bb{}:", i)?;
            for instr in &block.instrs {
                match instr.dest {
                    Some(dest) => writeln!(
                        f,
                        "    {} <{}> = {}",
                        dest,
                        self.origin(dest),
                        instr.kind
                    )?,
                    None => writeln!(f, "    {}", instr.kind)?,
                }
            }
            writeln!(f, "    {}", block.terminator)?;
        }
        writeln!(f, "}}")
    }
}
