//! Origin Deduplication Pass
//!
//! Two `LoadArg`/`LoadConst` slots with the same origin hold the same
//! value. Walking the dominator tree with a scoped `Origin -> Slot` table,
//! each later load is dropped and its uses are renamed to the dominating
//! one. Computed origins never match anything but themselves, so no other
//! instruction is merged.
//!
//! # Algorithm
//!
//! 1. Compute dominators
//! 2. Pre-order walk of the dominator tree; a load whose origin is in scope
//!    is recorded for removal, otherwise it enters scope for its subtree
//! 3. Remove recorded loads and rename every operand

use std::collections::HashMap;

use tracing::trace;

use crate::ir::analysis::Dominators;
use crate::ir::{BlockId, InstrKind, IrFunction, Origin, Slot};

/// Returns true if any load was removed.
pub fn dedup_loads(func: &mut IrFunction) -> bool {
    if func.blocks.is_empty() {
        return false;
    }
    let children = Dominators::compute(func).children();
    let mut scope: HashMap<Origin, Slot> = HashMap::new();
    let mut rename: HashMap<Slot, Slot> = HashMap::new();
    let mut removed: Vec<Vec<usize>> = vec![Vec::new(); func.blocks.len()];

    fn walk(
        func: &IrFunction,
        block: BlockId,
        children: &[Vec<BlockId>],
        scope: &mut HashMap<Origin, Slot>,
        rename: &mut HashMap<Slot, Slot>,
        removed: &mut [Vec<usize>],
    ) {
        let mut entered = Vec::new();
        for (i, instr) in func.block(block).instrs.iter().enumerate() {
            let Some(dest) = instr.dest else { continue };
            if !matches!(instr.kind, InstrKind::LoadArg(_) | InstrKind::LoadConst(_)) {
                continue;
            }
            let origin = func.origin(dest);
            match scope.get(&origin) {
                Some(&keep) => {
                    rename.insert(dest, keep);
                    removed[block.index()].push(i);
                }
                None => {
                    scope.insert(origin, dest);
                    entered.push(origin);
                }
            }
        }
        for &child in &children[block.index()] {
            walk(func, child, children, scope, rename, removed);
        }
        for origin in entered {
            scope.remove(&origin);
        }
    }

    walk(
        func,
        BlockId::ENTRY,
        &children,
        &mut scope,
        &mut rename,
        &mut removed,
    );

    if rename.is_empty() {
        return false;
    }
    trace!(function = %func.name, merged = rename.len(), "deduplicated loads");

    let apply = |s: Slot| rename.get(&s).copied().unwrap_or(s);
    for (block, dead) in func.blocks.iter_mut().zip(&removed) {
        let mut index = 0;
        block.instrs.retain(|_| {
            let keep = !dead.contains(&index);
            index += 1;
            keep
        });
        for instr in &mut block.instrs {
            instr.kind.map_slots(apply);
        }
        block.terminator.map_slots(apply);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, Constant, FunctionBuilder, FunctionId, Terminator};

    #[test]
    fn test_same_constant_merged() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", vec![], false);
        let a = b.load_constant(Constant::Integer(2));
        let c = b.load_constant(Constant::Integer(2));
        let sum = b.value(InstrKind::Binary {
            op: BinaryOp::Add,
            lhs: a,
            rhs: c,
        });
        b.terminate(Terminator::Return {
            values: vec![sum],
            spread: None,
        });
        let mut f = b.finish().unwrap();

        assert!(dedup_loads(&mut f));
        assert_eq!(f.entry().instrs.len(), 2);
        assert_eq!(
            f.entry().instrs[1].kind,
            InstrKind::Binary {
                op: BinaryOp::Add,
                lhs: a,
                rhs: a
            }
        );
    }

    #[test]
    fn test_sibling_branches_not_merged() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", vec!["c".into()], false);
        let cond = b.value(InstrKind::LoadArg(0));
        let left = b.new_block();
        let right = b.new_block();
        b.terminate(Terminator::Branch {
            cond,
            then_block: left,
            else_block: right,
        });
        for block in [left, right] {
            b.switch_to(block);
            let k = b.load_constant(Constant::Str("x".into()));
            b.terminate(Terminator::Return {
                values: vec![k],
                spread: None,
            });
        }
        let mut f = b.finish().unwrap();
        assert!(!dedup_loads(&mut f));
    }

    #[test]
    fn test_dominating_argument_reused_in_successor() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", vec!["a".into()], false);
        let first = b.value(InstrKind::LoadArg(0));
        let next = b.new_block();
        b.terminate(Terminator::Jump(next));
        b.switch_to(next);
        let second = b.value(InstrKind::LoadArg(0));
        b.terminate(Terminator::Return {
            values: vec![first, second],
            spread: None,
        });
        let mut f = b.finish().unwrap();

        assert!(dedup_loads(&mut f));
        assert!(f.block(BlockId(1)).instrs.is_empty());
        assert_eq!(
            f.block(BlockId(1)).terminator,
            Terminator::Return {
                values: vec![first, first],
                spread: None
            }
        );
    }
}
