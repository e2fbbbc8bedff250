//! Structural validation of finished IR functions.
//!
//! Checks, in one pass over the blocks:
//!
//! - every index (argument, constant, variable, upvalue, slot) is in range
//! - `...` only appears in vararg functions
//! - each slot is defined at most once
//! - each use is dominated by its definition; a use in the defining block
//!   must come after it
//! - each use sees the arity it needs (single value or value list)

use std::collections::HashMap;

use super::analysis::Dominators;
use super::error::IrError;
use super::function::IrFunction;
use super::types::{Arity, BlockId, Capture, InstrKind, Slot};

pub fn validate(func: &IrFunction) -> Result<(), IrError> {
    let checker = Checker { func };
    checker.check_indices()?;
    let defs = checker.definitions()?;
    checker.check_uses(&defs)
}

struct Checker<'a> {
    func: &'a IrFunction,
}

impl Checker<'_> {
    fn out_of_range(&self, what: &'static str, index: u32) -> IrError {
        IrError::IndexOutOfRange {
            function: self.func.name.clone(),
            what,
            index,
        }
    }

    fn in_range(&self, what: &'static str, index: u32, len: usize) -> Result<(), IrError> {
        if (index as usize) < len {
            Ok(())
        } else {
            Err(self.out_of_range(what, index))
        }
    }

    fn check_indices(&self) -> Result<(), IrError> {
        let f = self.func;
        for (_, instr) in f.instrs() {
            match &instr.kind {
                InstrKind::LoadArg(i) => self.in_range("argument", *i, f.params.len())?,
                InstrKind::LoadConst(i) => self.in_range("constant", *i, f.constants.len())?,
                InstrKind::Varargs if !f.is_vararg => {
                    return Err(IrError::VarargsInFixedFunction {
                        function: f.name.clone(),
                    })
                }
                InstrKind::VarInit { var, .. }
                | InstrKind::VarStore { var, .. }
                | InstrKind::VarLoad(var) => self.in_range("variable", var.0, f.vars.len())?,
                InstrKind::UpLoad(u) | InstrKind::UpStore { upvalue: u, .. } => {
                    self.in_range("upvalue", u.0, f.upvalues.len())?
                }
                InstrKind::Closure { captures, .. } => {
                    for capture in captures {
                        match capture {
                            Capture::Var(v) => self.in_range("variable", v.0, f.vars.len())?,
                            Capture::Upvalue(u) => {
                                self.in_range("upvalue", u.0, f.upvalues.len())?
                            }
                        }
                    }
                }
                _ => {}
            }
            if let Some(dest) = instr.dest {
                self.in_range("slot", dest.0, f.slots.len())?;
            }
            for (slot, _) in instr.kind.operands() {
                self.in_range("slot", slot.0, f.slots.len())?;
            }
        }
        for block in &f.blocks {
            for (slot, _) in block.terminator.operands() {
                self.in_range("slot", slot.0, f.slots.len())?;
            }
        }
        Ok(())
    }

    /// Definition site of every defined slot.
    fn definitions(&self) -> Result<HashMap<Slot, (BlockId, usize)>, IrError> {
        let f = self.func;
        let mut defs = HashMap::new();
        for (b, block) in f.blocks.iter().enumerate() {
            for (i, instr) in block.instrs.iter().enumerate() {
                let Some(dest) = instr.dest else { continue };
                if defs.insert(dest, (BlockId::new(b as u32), i)).is_some() {
                    return Err(IrError::Redefined {
                        function: f.name.clone(),
                        slot: dest,
                    });
                }
                if let Some(arity) = instr.kind.result_arity() {
                    let declared = f.slots[dest.index()].arity;
                    if declared != arity {
                        return Err(IrError::ArityMismatch {
                            function: f.name.clone(),
                            slot: dest,
                            found: declared,
                            expected: arity,
                        });
                    }
                }
            }
        }
        Ok(defs)
    }

    fn check_uses(&self, defs: &HashMap<Slot, (BlockId, usize)>) -> Result<(), IrError> {
        let f = self.func;
        let dom = Dominators::compute(f);

        let check = |slot: Slot, need: Arity, block: BlockId, pos: usize| -> Result<(), IrError> {
            let undefined = || IrError::UndefinedSlot {
                function: f.name.clone(),
                slot,
                block,
            };
            let &(def_block, def_pos) = defs.get(&slot).ok_or_else(undefined)?;
            let visible = if def_block == block {
                def_pos < pos
            } else {
                dom.dominates(def_block, block)
            };
            if !visible {
                return Err(undefined());
            }
            let found = f.slots[slot.index()].arity;
            if found != need {
                return Err(IrError::ArityMismatch {
                    function: f.name.clone(),
                    slot,
                    found,
                    expected: need,
                });
            }
            Ok(())
        };

        for (b, block) in f.blocks.iter().enumerate() {
            let id = BlockId::new(b as u32);
            for (i, instr) in block.instrs.iter().enumerate() {
                for (slot, need) in instr.kind.operands() {
                    check(slot, need, id, i)?;
                }
            }
            for (slot, need) in block.terminator.operands() {
                check(slot, need, id, block.instrs.len())?;
            }
        }
        Ok(())
    }
}
