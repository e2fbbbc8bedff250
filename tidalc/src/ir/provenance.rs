//! Reaching origins of variable loads.
//!
//! For each `VarLoad` of a variable that no closure captures, computes the
//! set of slot origins whose stores may reach it. [`Origin::Entry`] in the
//! set means some path from function entry reaches the load without any
//! store, so the variable may still be unset there.
//!
//! Captured variables are not tracked: a closure can write them at any
//! call.

use std::collections::{HashMap, HashSet};

use super::analysis::predecessors;
use super::function::IrFunction;
use super::origin::Origin;
use super::types::{BlockId, InstrKind};

type State = Vec<HashSet<Origin>>;

/// Reaching-origin sets, keyed by load position.
#[derive(Debug, Clone, Default)]
pub struct Provenance {
    loads: HashMap<(BlockId, usize), HashSet<Origin>>,
}

impl Provenance {
    pub fn compute(func: &IrFunction) -> Self {
        let nvars = func.vars().len();
        let n = func.blocks().len();
        if n == 0 {
            return Self::default();
        }
        let tracked: Vec<bool> = func.vars().iter().map(|v| !v.captured).collect();
        let entry_state: State = vec![HashSet::from([Origin::Entry]); nvars];
        let preds = predecessors(func);

        let transfer = |block: BlockId, state: &mut State| {
            for instr in &func.block(block).instrs {
                if let InstrKind::VarInit { var, value } | InstrKind::VarStore { var, value } =
                    &instr.kind
                {
                    if tracked[var.index()] {
                        state[var.index()] = HashSet::from([func.origin(*value)]);
                    }
                }
            }
        };

        let mut outs: Vec<Option<State>> = vec![None; n];
        let mut ins: Vec<Option<State>> = vec![None; n];
        let mut changed = true;
        while changed {
            changed = false;
            for b in 0..n {
                let mut state: Option<State> = (b == 0).then(|| entry_state.clone());
                for p in &preds[b] {
                    let Some(out) = &outs[p.index()] else { continue };
                    state = Some(match state.take() {
                        None => out.clone(),
                        Some(mut s) => {
                            for (into, from) in s.iter_mut().zip(out) {
                                into.extend(from.iter().copied());
                            }
                            s
                        }
                    });
                }
                let Some(input) = state else { continue };
                if ins[b].as_ref() == Some(&input) {
                    continue;
                }
                let mut out = input.clone();
                transfer(BlockId::new(b as u32), &mut out);
                ins[b] = Some(input);
                outs[b] = Some(out);
                changed = true;
            }
        }

        let mut loads = HashMap::new();
        for (b, input) in ins.into_iter().enumerate() {
            let Some(mut state) = input else { continue };
            let id = BlockId::new(b as u32);
            for (i, instr) in func.block(id).instrs.iter().enumerate() {
                match &instr.kind {
                    InstrKind::VarLoad(var) if tracked[var.index()] => {
                        loads.insert((id, i), state[var.index()].clone());
                    }
                    InstrKind::VarInit { var, value } | InstrKind::VarStore { var, value }
                        if tracked[var.index()] =>
                    {
                        state[var.index()] = HashSet::from([func.origin(*value)]);
                    }
                    _ => {}
                }
            }
        }
        Self { loads }
    }

    /// Origins that may reach the load at `index` in `block`. `None` if that
    /// instruction is not a tracked load.
    pub fn reaching(&self, block: BlockId, index: usize) -> Option<&HashSet<Origin>> {
        self.loads.get(&(block, index))
    }

    /// The only origin reaching a load, if there is exactly one.
    pub fn unique(&self, block: BlockId, index: usize) -> Option<Origin> {
        let set = self.reaching(block, index)?;
        if set.len() == 1 {
            set.iter().next().copied()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::FunctionBuilder;
    use crate::ir::types::{Constant, FunctionId, Slot, Terminator};

    fn ret(values: Vec<Slot>) -> Terminator {
        Terminator::Return {
            values,
            spread: None,
        }
    }

    #[test]
    fn test_straight_line_store() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", vec![], false);
        let x = b.new_var("x");
        let k = b.load_constant(Constant::Integer(7));
        b.effect(InstrKind::VarInit { var: x, value: k });
        let load = b.value(InstrKind::VarLoad(x));
        b.terminate(ret(vec![load]));
        let f = b.finish().unwrap();
        let p = Provenance::compute(&f);
        assert_eq!(p.unique(BlockId::ENTRY, 2), Some(Origin::Constant(0)));
    }

    #[test]
    fn test_merge_includes_entry_when_one_path_skips_store() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", vec!["c".into()], false);
        let x = b.new_var("x");
        let cond = b.value(InstrKind::LoadArg(0));
        let store_b = b.new_block();
        let join = b.new_block();
        b.terminate(Terminator::Branch {
            cond,
            then_block: store_b,
            else_block: join,
        });
        b.switch_to(store_b);
        let k = b.load_constant(Constant::Bool(true));
        b.effect(InstrKind::VarStore { var: x, value: k });
        b.terminate(Terminator::Jump(join));
        b.switch_to(join);
        let load = b.value(InstrKind::VarLoad(x));
        b.terminate(ret(vec![load]));
        let f = b.finish().unwrap();

        let p = Provenance::compute(&f);
        let join = f
            .blocks()
            .iter()
            .position(|blk| matches!(blk.terminator, Terminator::Return { .. }))
            .unwrap();
        let set = p.reaching(BlockId(join as u32), 0).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&Origin::Entry));
        assert!(set.contains(&Origin::Constant(0)));
        assert_eq!(p.unique(BlockId(join as u32), 0), None);
    }

    #[test]
    fn test_captured_vars_not_tracked() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", vec![], false);
        let x = b.new_var("x");
        b.mark_captured(x);
        let k = b.load_constant(Constant::Nil);
        b.effect(InstrKind::VarInit { var: x, value: k });
        let load = b.value(InstrKind::VarLoad(x));
        b.terminate(ret(vec![load]));
        let f = b.finish().unwrap();
        assert!(Provenance::compute(&f).reaching(BlockId::ENTRY, 2).is_none());
    }
}
