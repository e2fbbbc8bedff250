//! Load Propagation Pass
//!
//! Replaces a `VarLoad` with `LoadConst`/`LoadArg` when the only origin
//! that can reach it is a single constant or argument. The rewritten slot
//! takes that origin, which lets [`dedup`](super::dedup) merge it with
//! other loads of the same value.
//!
//! ```text
//! v0 = init ^0            v0 = init ^0
//! ...                ──►  ...
//! %5 = load v0            %5 <^0> = const ^0
//! ```

use tracing::trace;

use crate::ir::provenance::Provenance;
use crate::ir::{BlockId, InstrKind, IrFunction, Origin};

/// Returns true if any load was rewritten.
pub fn propagate_loads(func: &mut IrFunction) -> bool {
    let provenance = Provenance::compute(func);
    let mut changed = false;

    for (b, block) in func.blocks.iter_mut().enumerate() {
        for (i, instr) in block.instrs.iter_mut().enumerate() {
            let (InstrKind::VarLoad(_), Some(dest)) = (&instr.kind, instr.dest) else {
                continue;
            };
            let origin = provenance.unique(BlockId::new(b as u32), i);
            let replacement = match origin {
                Some(Origin::Constant(k)) => InstrKind::LoadConst(k),
                Some(Origin::Argument(a)) => InstrKind::LoadArg(a),
                _ => continue,
            };
            trace!(function = %func.name, slot = %dest, "propagated variable load");
            instr.kind = replacement;
            if let Some(origin) = origin {
                func.slots[dest.index()].origin = origin;
            }
            changed = true;
        }
    }

    changed
}
