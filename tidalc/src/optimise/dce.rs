//! Dead Slot Elimination Pass
//!
//! Removes instructions whose slot is never read and whose only effect is
//! producing it. Loads, `...`, list selection and closure creation qualify;
//! arithmetic, indexing and calls can raise errors and are always kept.
//!
//! Iterates until no more changes (removing one dead slot may make its
//! operands dead).

use std::collections::HashSet;

use crate::ir::{IrFunction, Slot};

fn used_slots(func: &IrFunction) -> HashSet<Slot> {
    let mut used = HashSet::new();
    for block in &func.blocks {
        for instr in &block.instrs {
            used.extend(instr.kind.operands().into_iter().map(|(s, _)| s));
        }
        used.extend(block.terminator.operands().into_iter().map(|(s, _)| s));
    }
    used
}

/// Returns true if any instruction was removed.
pub fn eliminate_dead_slots(func: &mut IrFunction) -> bool {
    let mut changed = false;
    loop {
        let used = used_slots(func);
        let mut removed = false;
        for block in &mut func.blocks {
            let before = block.instrs.len();
            block.instrs.retain(|instr| match instr.dest {
                Some(dest) => used.contains(&dest) || !instr.kind.is_removable(),
                None => true,
            });
            removed |= block.instrs.len() != before;
        }
        if !removed {
            return changed;
        }
        changed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, Constant, FunctionBuilder, FunctionId, InstrKind, Terminator};

    #[test]
    fn test_unused_loads_removed() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", vec!["a".into()], true);
        let _arg = b.value(InstrKind::LoadArg(0));
        let list = b.value(InstrKind::Varargs);
        let _first = b.value(InstrKind::Select { list, index: 0 });
        let k = b.load_constant(Constant::Integer(1));
        b.terminate(Terminator::Return {
            values: vec![k],
            spread: None,
        });
        let mut f = b.finish().unwrap();

        assert!(eliminate_dead_slots(&mut f));
        assert_eq!(f.entry().instrs.len(), 1);
        assert_eq!(f.entry().instrs[0].dest, Some(k));
    }

    #[test]
    fn test_fallible_instructions_kept() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", vec!["a".into()], false);
        let a = b.value(InstrKind::LoadArg(0));
        let _unused = b.value(InstrKind::Binary {
            op: BinaryOp::Add,
            lhs: a,
            rhs: a,
        });
        b.terminate(Terminator::Return {
            values: vec![],
            spread: None,
        });
        let mut f = b.finish().unwrap();

        assert!(!eliminate_dead_slots(&mut f));
        assert_eq!(f.entry().instrs.len(), 2);
    }
}
