//! Liveness at call sites.
//!
//! A frame that suspends inside a call keeps only what is read after the
//! call returns. This is a backward dataflow over four kinds of place:
//! slots, variables, arguments and the vararg list.
//!
//! | Instruction | Uses | Defines |
//! |-------------|------|---------|
//! | `LoadArg(i)` | argument `i` | its slot |
//! | `Varargs` | the vararg list | its slot |
//! | `VarLoad(v)` | `v` | its slot |
//! | `VarInit(v)` | operand | `v` |
//! | `VarStore(v)`, `v` plain | operand | `v` |
//! | `VarStore(v)`, `v` captured | operand, `v` (its cell) | - |
//! | `Closure` capturing `v` | `v` (its cell) | its slot |
//!
//! Arguments and varargs are never redefined, so once read after a call
//! they stay live back to the entry.

use std::collections::{BTreeSet, HashMap};

use crate::ir::{BlockId, Capture, InstrKind, IrFunction, Slot, VarId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Place {
    Slot(Slot),
    Var(VarId),
    Arg(u32),
    Varargs,
}

pub type LiveSet = BTreeSet<Place>;

/// Places live after each call instruction, keyed by block and index,
/// excluding the call's own result.
#[derive(Debug, Default)]
pub struct CallLiveness {
    after: HashMap<(BlockId, usize), LiveSet>,
}

impl CallLiveness {
    pub fn compute(func: &IrFunction) -> Self {
        let live_in = solve(func);
        let mut after = HashMap::new();
        for (b, block) in func.blocks().iter().enumerate() {
            let id = BlockId::new(b as u32);
            let mut live = live_out(func, id, &live_in);
            for (i, instr) in block.instrs.iter().enumerate().rev() {
                if let InstrKind::Call { .. } = instr.kind {
                    let mut set = live.clone();
                    if let Some(dest) = instr.dest {
                        set.remove(&Place::Slot(dest));
                    }
                    after.insert((id, i), set);
                }
                transfer(func, &instr.kind, instr.dest, &mut live);
            }
        }
        Self { after }
    }

    pub fn after_call(&self, block: BlockId, index: usize) -> Option<&LiveSet> {
        self.after.get(&(block, index))
    }
}

fn is_captured(func: &IrFunction, var: VarId) -> bool {
    func.vars().get(var.index()).map_or(false, |v| v.captured)
}

/// Step `live` backwards over one instruction.
fn transfer(func: &IrFunction, kind: &InstrKind, dest: Option<Slot>, live: &mut LiveSet) {
    if let Some(dest) = dest {
        live.remove(&Place::Slot(dest));
    }
    match kind {
        InstrKind::VarInit { var, .. } => {
            live.remove(&Place::Var(*var));
        }
        InstrKind::VarStore { var, .. } => {
            if is_captured(func, *var) {
                live.insert(Place::Var(*var));
            } else {
                live.remove(&Place::Var(*var));
            }
        }
        InstrKind::VarLoad(var) => {
            live.insert(Place::Var(*var));
        }
        InstrKind::LoadArg(index) => {
            live.insert(Place::Arg(*index));
        }
        InstrKind::Varargs => {
            live.insert(Place::Varargs);
        }
        InstrKind::Closure { captures, .. } => {
            for capture in captures {
                if let Capture::Var(var) = capture {
                    live.insert(Place::Var(*var));
                }
            }
        }
        _ => {}
    }
    for (slot, _) in kind.operands() {
        live.insert(Place::Slot(slot));
    }
}

fn live_out(func: &IrFunction, block: BlockId, live_in: &[LiveSet]) -> LiveSet {
    let term = &func.block(block).terminator;
    let mut live: LiveSet = term
        .successors()
        .into_iter()
        .flat_map(|s| live_in[s.index()].iter().copied())
        .collect();
    live.extend(term.operands().into_iter().map(|(s, _)| Place::Slot(s)));
    live
}

fn solve(func: &IrFunction) -> Vec<LiveSet> {
    let n = func.blocks().len();
    let mut live_in = vec![LiveSet::new(); n];
    let mut changed = true;
    while changed {
        changed = false;
        // blocks are in reverse postorder; walking them backwards converges fast
        for b in (0..n).rev() {
            let id = BlockId::new(b as u32);
            let mut live = live_out(func, id, &live_in);
            for instr in func.block(id).instrs.iter().rev() {
                transfer(func, &instr.kind, instr.dest, &mut live);
            }
            if live != live_in[b] {
                live_in[b] = live;
                changed = true;
            }
        }
    }
    live_in
}
