//! Control-flow analyses over IR functions.
//!
//! Finished functions number their blocks in reverse postorder, so a
//! block's index doubles as its RPO position. The dominator computation is
//! the iterative algorithm of Cooper, Harvey and Kennedy, which relies on
//! exactly that numbering.

use super::function::IrFunction;
use super::types::BlockId;

/// Predecessor lists, indexed by block.
pub fn predecessors(func: &IrFunction) -> Vec<Vec<BlockId>> {
    let mut preds = vec![Vec::new(); func.blocks().len()];
    for (i, block) in func.blocks().iter().enumerate() {
        for succ in block.terminator.successors() {
            preds[succ.index()].push(BlockId::new(i as u32));
        }
    }
    preds
}

/// Blocks reachable from the entry, in reverse postorder.
///
/// `successors` must only return ids below `num_blocks`.
pub fn reverse_postorder(
    num_blocks: usize,
    successors: &dyn Fn(BlockId) -> Vec<BlockId>,
) -> Vec<BlockId> {
    let mut visited = vec![false; num_blocks];
    let mut postorder = Vec::new();

    fn visit(
        bb: BlockId,
        successors: &dyn Fn(BlockId) -> Vec<BlockId>,
        visited: &mut [bool],
        postorder: &mut Vec<BlockId>,
    ) {
        if visited[bb.index()] {
            return;
        }
        visited[bb.index()] = true;
        for succ in successors(bb) {
            visit(succ, successors, visited, postorder);
        }
        postorder.push(bb);
    }

    if num_blocks > 0 {
        visit(BlockId::ENTRY, successors, &mut visited, &mut postorder);
    }
    postorder.reverse();
    postorder
}

/// The dominator tree of a finished function.
#[derive(Debug, Clone)]
pub struct Dominators {
    idom: Vec<BlockId>,
}

impl Dominators {
    pub fn compute(func: &IrFunction) -> Self {
        let n = func.blocks().len();
        let preds = predecessors(func);
        let mut idom: Vec<Option<BlockId>> = vec![None; n];
        if n == 0 {
            return Self { idom: Vec::new() };
        }
        idom[0] = Some(BlockId::ENTRY);

        let intersect = |idom: &[Option<BlockId>], mut a: BlockId, mut b: BlockId| {
            while a != b {
                while a > b {
                    a = idom[a.index()].unwrap_or(BlockId::ENTRY);
                }
                while b > a {
                    b = idom[b.index()].unwrap_or(BlockId::ENTRY);
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;
            for b in 1..n {
                let mut new_idom: Option<BlockId> = None;
                for &p in &preds[b] {
                    if idom[p.index()].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(current) => intersect(&idom, p, current),
                    });
                }
                if new_idom.is_some() && idom[b] != new_idom {
                    idom[b] = new_idom;
                    changed = true;
                }
            }
        }

        Self {
            idom: idom
                .into_iter()
                .map(|d| d.unwrap_or(BlockId::ENTRY))
                .collect(),
        }
    }

    /// Immediate dominator; `None` for the entry.
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        if block == BlockId::ENTRY {
            None
        } else {
            self.idom.get(block.index()).copied()
        }
    }

    /// Whether `a` dominates `b`. Every block dominates itself.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.idom(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Dominator-tree children, indexed by block.
    pub fn children(&self) -> Vec<Vec<BlockId>> {
        let mut children = vec![Vec::new(); self.idom.len()];
        for b in 1..self.idom.len() {
            children[self.idom[b].index()].push(BlockId::new(b as u32));
        }
        children
    }
}
