//! IR to frame program lowering.
//!
//! Every defined slot gets its own register: single values in the register
//! file, lists in the list file. Blocks are laid out in order, and a jump
//! to the block that follows is dropped. Block pcs are known before any op
//! is emitted, so branches need no patching.

use std::sync::Arc;

use tidal_runtime::arith;
use tidal_runtime::proto::{self, CallSite, CaptureSource, ListReg, Op, Proto, Reg};
use tidal_runtime::Value;

use crate::ir::{
    Arity, BinaryOp, BlockId, Capture, Constant, ForRole, Instr, InstrKind, IrFunction, Module,
    Slot, Terminator, UnaryOp,
};

use super::liveness::{CallLiveness, LiveSet, Place};
use super::CodegenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Reg(Reg),
    List(ListReg),
}

fn binary_op(op: BinaryOp) -> arith::BinaryOp {
    match op {
        BinaryOp::Add => arith::BinaryOp::Add,
        BinaryOp::Sub => arith::BinaryOp::Sub,
        BinaryOp::Mul => arith::BinaryOp::Mul,
        BinaryOp::Div => arith::BinaryOp::Div,
        BinaryOp::IDiv => arith::BinaryOp::IDiv,
        BinaryOp::Mod => arith::BinaryOp::Mod,
        BinaryOp::Pow => arith::BinaryOp::Pow,
        BinaryOp::Concat => arith::BinaryOp::Concat,
        BinaryOp::Eq => arith::BinaryOp::Eq,
        BinaryOp::Ne => arith::BinaryOp::Ne,
        BinaryOp::Lt => arith::BinaryOp::Lt,
        BinaryOp::Le => arith::BinaryOp::Le,
        BinaryOp::BAnd => arith::BinaryOp::BAnd,
        BinaryOp::BOr => arith::BinaryOp::BOr,
        BinaryOp::BXor => arith::BinaryOp::BXor,
        BinaryOp::Shl => arith::BinaryOp::Shl,
        BinaryOp::Shr => arith::BinaryOp::Shr,
    }
}

fn unary_op(op: UnaryOp) -> arith::UnaryOp {
    match op {
        UnaryOp::Neg => arith::UnaryOp::Neg,
        UnaryOp::Not => arith::UnaryOp::Not,
        UnaryOp::Len => arith::UnaryOp::Len,
        UnaryOp::BNot => arith::UnaryOp::BNot,
    }
}

fn for_role(role: ForRole) -> proto::ForRole {
    match role {
        ForRole::Initial => proto::ForRole::Initial,
        ForRole::Limit => proto::ForRole::Limit,
        ForRole::Step => proto::ForRole::Step,
    }
}

fn constant_value(c: &Constant) -> Value {
    match c {
        Constant::Nil => Value::Nil,
        Constant::Bool(b) => Value::Boolean(*b),
        Constant::Integer(i) => Value::Integer(*i),
        Constant::Float(x) => Value::Float(x.0),
        Constant::Str(s) => Value::string(s),
    }
}

/// Whether block `b` ends in a jump to the block laid out after it.
fn falls_through(b: usize, term: &Terminator) -> bool {
    matches!(term, Terminator::Jump(target) if target.index() == b + 1)
}

struct Emitter<'a> {
    func: &'a IrFunction,
    module: &'a Module,
    locations: Vec<Option<Location>>,
    block_pcs: Vec<u32>,
    liveness: CallLiveness,
    code: Vec<Op>,
    lines: Vec<u32>,
    call_sites: Vec<CallSite>,
    num_regs: u32,
    num_lists: u32,
}

/// Lower one IR function of `module` to a frame program.
pub fn emit_function(
    func: &IrFunction,
    module: &Module,
    chunk: &Arc<str>,
) -> Result<Proto, CodegenError> {
    let mut emitter = Emitter::new(func, module);
    for (b, block) in func.blocks().iter().enumerate() {
        let id = BlockId::new(b as u32);
        for (i, instr) in block.instrs.iter().enumerate() {
            emitter.instr(id, i, instr)?;
        }
        if !falls_through(b, &block.terminator) {
            emitter.terminator(&block.terminator, block.line)?;
        }
    }

    Ok(Proto {
        name: func.name().to_string(),
        chunk: chunk.clone(),
        num_params: func.num_params(),
        is_vararg: func.is_vararg(),
        num_regs: emitter.num_regs,
        num_lists: emitter.num_lists,
        vars: func.vars().iter().map(|v| v.captured).collect(),
        num_upvalues: func.upvalues().len() as u32,
        constants: func.constants().iter().map(constant_value).collect(),
        code: emitter.code,
        lines: emitter.lines,
        call_sites: emitter.call_sites,
    })
}

impl<'a> Emitter<'a> {
    fn new(func: &'a IrFunction, module: &'a Module) -> Self {
        let mut locations = vec![None; func.slots().len()];
        let (mut num_regs, mut num_lists) = (0, 0);
        for (_, instr) in func.instrs() {
            let Some(dest) = instr.dest else { continue };
            let location = match func.slots()[dest.index()].arity {
                Arity::Single => {
                    num_regs += 1;
                    Location::Reg(num_regs - 1)
                }
                Arity::Multi => {
                    num_lists += 1;
                    Location::List(num_lists - 1)
                }
            };
            locations[dest.index()] = Some(location);
        }

        let mut block_pcs = Vec::with_capacity(func.blocks().len());
        let mut pc = 0u32;
        for (b, block) in func.blocks().iter().enumerate() {
            block_pcs.push(pc);
            pc += block.instrs.len() as u32;
            if !falls_through(b, &block.terminator) {
                pc += 1;
            }
        }

        Self {
            func,
            module,
            locations,
            block_pcs,
            liveness: CallLiveness::compute(func),
            code: Vec::with_capacity(pc as usize),
            lines: Vec::with_capacity(pc as usize),
            call_sites: Vec::new(),
            num_regs,
            num_lists,
        }
    }

    fn unmapped(&self, slot: Slot) -> CodegenError {
        CodegenError::UnmappedSlot {
            function: self.func.name().to_string(),
            slot,
        }
    }

    fn reg(&self, slot: Slot) -> Result<Reg, CodegenError> {
        match self.locations.get(slot.index()).copied().flatten() {
            Some(Location::Reg(r)) => Ok(r),
            _ => Err(self.unmapped(slot)),
        }
    }

    fn list(&self, slot: Slot) -> Result<ListReg, CodegenError> {
        match self.locations.get(slot.index()).copied().flatten() {
            Some(Location::List(l)) => Ok(l),
            _ => Err(self.unmapped(slot)),
        }
    }

    fn regs(&self, slots: &[Slot]) -> Result<Vec<Reg>, CodegenError> {
        slots.iter().map(|s| self.reg(*s)).collect()
    }

    fn spread(&self, spread: Option<Slot>) -> Result<Option<ListReg>, CodegenError> {
        spread.map(|s| self.list(s)).transpose()
    }

    fn dest(&self, instr: &Instr) -> Result<Slot, CodegenError> {
        instr.dest.ok_or_else(|| CodegenError::MissingResult {
            function: self.func.name().to_string(),
        })
    }

    fn push(&mut self, op: Op, line: u32) {
        self.code.push(op);
        self.lines.push(line);
    }

    fn call_site(&self, pc: u32, live: Option<&LiveSet>) -> CallSite {
        let mut site = CallSite {
            pc,
            ..CallSite::default()
        };
        for place in live.into_iter().flatten() {
            match *place {
                Place::Slot(s) => match self.locations.get(s.index()).copied().flatten() {
                    Some(Location::Reg(r)) => site.regs.push(r),
                    Some(Location::List(l)) => site.lists.push(l),
                    None => {}
                },
                Place::Var(v) => site.vars.push(v.0),
                Place::Arg(a) => site.args.push(a),
                Place::Varargs => site.varargs = true,
            }
        }
        site
    }

    fn instr(&mut self, block: BlockId, index: usize, instr: &Instr) -> Result<(), CodegenError> {
        let op = match &instr.kind {
            InstrKind::LoadArg(i) => Op::LoadArg {
                dst: self.reg(self.dest(instr)?)?,
                index: *i,
            },
            InstrKind::LoadConst(i) => Op::LoadConst {
                dst: self.reg(self.dest(instr)?)?,
                index: *i,
            },
            InstrKind::Varargs => Op::Varargs {
                dst: self.list(self.dest(instr)?)?,
            },
            InstrKind::VarInit { var, value } => Op::VarInit {
                var: var.0,
                src: self.reg(*value)?,
            },
            InstrKind::VarLoad(var) => Op::VarLoad {
                dst: self.reg(self.dest(instr)?)?,
                var: var.0,
            },
            InstrKind::VarStore { var, value } => Op::VarStore {
                var: var.0,
                src: self.reg(*value)?,
            },
            InstrKind::UpLoad(upvalue) => Op::UpLoad {
                dst: self.reg(self.dest(instr)?)?,
                upvalue: upvalue.0,
            },
            InstrKind::UpStore { upvalue, value } => Op::UpStore {
                upvalue: upvalue.0,
                src: self.reg(*value)?,
            },
            InstrKind::Binary { op, lhs, rhs } => Op::Binary {
                dst: self.reg(self.dest(instr)?)?,
                op: binary_op(*op),
                lhs: self.reg(*lhs)?,
                rhs: self.reg(*rhs)?,
            },
            InstrKind::Unary { op, operand } => Op::Unary {
                dst: self.reg(self.dest(instr)?)?,
                op: unary_op(*op),
                operand: self.reg(*operand)?,
            },
            InstrKind::Index { table, key } => Op::Index {
                dst: self.reg(self.dest(instr)?)?,
                table: self.reg(*table)?,
                key: self.reg(*key)?,
            },
            InstrKind::SetIndex { table, key, value } => Op::SetIndex {
                table: self.reg(*table)?,
                key: self.reg(*key)?,
                value: self.reg(*value)?,
            },
            InstrKind::NewTable {
                array,
                fields,
                spread,
            } => Op::NewTable {
                dst: self.reg(self.dest(instr)?)?,
                array: self.regs(array)?,
                fields: fields
                    .iter()
                    .map(|(k, v)| Ok((self.reg(*k)?, self.reg(*v)?)))
                    .collect::<Result<_, CodegenError>>()?,
                spread: self.spread(*spread)?,
            },
            InstrKind::Closure { function, captures } => {
                let target = self.module.get(*function).ok_or_else(|| {
                    CodegenError::UnknownFunction {
                        function: self.func.name().to_string(),
                        target: *function,
                    }
                })?;
                if target.upvalues().len() != captures.len() {
                    return Err(CodegenError::CaptureMismatch {
                        function: self.func.name().to_string(),
                        target: *function,
                        expected: target.upvalues().len(),
                        found: captures.len(),
                    });
                }
                Op::Closure {
                    dst: self.reg(self.dest(instr)?)?,
                    proto: function.0,
                    captures: captures
                        .iter()
                        .map(|c| match c {
                            Capture::Var(v) => CaptureSource::Var(v.0),
                            Capture::Upvalue(u) => CaptureSource::Upvalue(u.0),
                        })
                        .collect(),
                }
            }
            InstrKind::Call {
                callee,
                args,
                spread,
            } => {
                let pc = self.code.len() as u32;
                let site = self.call_sites.len() as u32;
                let live = self.call_site(pc, self.liveness.after_call(block, index));
                self.call_sites.push(live);
                Op::Call {
                    dst: self.list(self.dest(instr)?)?,
                    callee: self.reg(*callee)?,
                    args: self.regs(args)?,
                    spread: self.spread(*spread)?,
                    site,
                }
            }
            InstrKind::Select { list, index } => Op::Select {
                dst: self.reg(self.dest(instr)?)?,
                list: self.list(*list)?,
                index: *index,
            },
            InstrKind::ForCoerce { value, role } => Op::ForCoerce {
                dst: self.reg(self.dest(instr)?)?,
                src: self.reg(*value)?,
                role: for_role(*role),
            },
            InstrKind::ForPrep {
                value,
                initial,
                step,
                role,
            } => Op::ForPrep {
                dst: self.reg(self.dest(instr)?)?,
                src: self.reg(*value)?,
                initial: self.reg(*initial)?,
                step: self.reg(*step)?,
                role: for_role(*role),
            },
            InstrKind::ForTest { index, limit, step } => Op::ForTest {
                dst: self.reg(self.dest(instr)?)?,
                index: self.reg(*index)?,
                limit: self.reg(*limit)?,
                step: self.reg(*step)?,
            },
            InstrKind::ForStep { index, limit, step } => Op::ForStep {
                dst: self.reg(self.dest(instr)?)?,
                index: self.reg(*index)?,
                limit: self.reg(*limit)?,
                step: self.reg(*step)?,
            },
        };
        self.push(op, instr.line);
        Ok(())
    }

    fn terminator(&mut self, term: &Terminator, line: u32) -> Result<(), CodegenError> {
        let op = match term {
            Terminator::Jump(target) => Op::Jump {
                target: self.block_pcs[target.index()],
            },
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => Op::Branch {
                cond: self.reg(*cond)?,
                then_pc: self.block_pcs[then_block.index()],
                else_pc: self.block_pcs[else_block.index()],
            },
            Terminator::Return { values, spread } => Op::Return {
                values: self.regs(values)?,
                spread: self.spread(*spread)?,
            },
            Terminator::TailCall {
                callee,
                args,
                spread,
            } => Op::TailCall {
                callee: self.reg(*callee)?,
                args: self.regs(args)?,
                spread: self.spread(*spread)?,
            },
        };
        self.push(op, line);
        Ok(())
    }
}
