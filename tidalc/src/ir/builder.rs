//! Incremental construction of IR functions.
//!
//! The builder keeps a cursor on one block. Instructions are appended at
//! the cursor; a terminator closes the block. Anything emitted after a
//! terminator lands in a fresh block that nothing jumps to, which
//! [`FunctionBuilder::finish`] then drops. This is how code following
//! `return` or `break` disappears.

use std::collections::HashMap;

use tracing::debug;

use super::analysis::reverse_postorder;
use super::error::IrError;
use super::function::IrFunction;
use super::origin::Origin;
use super::types::{
    Arity, Block, BlockId, Constant, FunctionId, Instr, InstrKind, Slot, SlotInfo, Terminator,
    UpvalueId, UpvalueInfo, VarId, VarInfo,
};
use super::validate;

struct PartialBlock {
    instrs: Vec<Instr>,
    terminator: Option<(Terminator, u32)>,
}

impl PartialBlock {
    fn new() -> Self {
        Self {
            instrs: Vec::new(),
            terminator: None,
        }
    }
}

/// Builder for one [`IrFunction`].
pub struct FunctionBuilder {
    id: FunctionId,
    name: String,
    params: Vec<String>,
    is_vararg: bool,
    first_line: u32,
    line: u32,
    blocks: Vec<PartialBlock>,
    current: BlockId,
    slots: Vec<SlotInfo>,
    vars: Vec<VarInfo>,
    upvalues: Vec<UpvalueInfo>,
    constants: Vec<Constant>,
    constant_index: HashMap<Constant, u32>,
}

impl FunctionBuilder {
    pub fn new(id: FunctionId, name: impl Into<String>, params: Vec<String>, is_vararg: bool) -> Self {
        Self {
            id,
            name: name.into(),
            params,
            is_vararg,
            first_line: 0,
            line: 0,
            blocks: vec![PartialBlock::new()],
            current: BlockId::ENTRY,
            slots: Vec::new(),
            vars: Vec::new(),
            upvalues: Vec::new(),
            constants: Vec::new(),
            constant_index: HashMap::new(),
        }
    }

    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub fn is_vararg(&self) -> bool {
        self.is_vararg
    }

    /// Line attached to subsequently emitted instructions.
    pub fn set_line(&mut self, line: u32) {
        if self.first_line == 0 {
            self.first_line = line;
        }
        self.line = line;
    }

    // --- blocks ---

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId::new(self.blocks.len() as u32);
        self.blocks.push(PartialBlock::new());
        id
    }

    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    pub fn current_block(&self) -> BlockId {
        self.current
    }

    /// Whether the current block already has its terminator.
    pub fn is_terminated(&self) -> bool {
        self.blocks
            .get(self.current.index())
            .map_or(false, |b| b.terminator.is_some())
    }

    fn open_block(&mut self) -> &mut PartialBlock {
        if self.is_terminated() || self.current.index() >= self.blocks.len() {
            let fresh = self.new_block();
            self.current = fresh;
        }
        &mut self.blocks[self.current.index()]
    }

    // --- instructions ---

    /// Append an instruction that defines a new slot.
    ///
    /// Arguments and constants get their indexed origin; everything else a
    /// fresh computed one.
    pub fn value(&mut self, kind: InstrKind) -> Slot {
        let arity = kind.result_arity().unwrap_or(Arity::Single);
        let origin = match kind {
            InstrKind::LoadArg(i) => Origin::Argument(i),
            InstrKind::LoadConst(i) => Origin::Constant(i),
            _ => Origin::computed(),
        };
        let slot = Slot::new(self.slots.len() as u32);
        self.slots.push(SlotInfo { origin, arity });
        let line = self.line;
        self.open_block().instrs.push(Instr {
            dest: Some(slot),
            kind,
            line,
        });
        slot
    }

    /// Append an instruction with no result.
    pub fn effect(&mut self, kind: InstrKind) {
        let line = self.line;
        self.open_block().instrs.push(Instr {
            dest: None,
            kind,
            line,
        });
    }

    pub fn terminate(&mut self, terminator: Terminator) {
        let line = self.line;
        self.open_block().terminator = Some((terminator, line));
    }

    // --- pools ---

    /// Index of `c` in the constant pool, adding it if new.
    pub fn constant(&mut self, c: Constant) -> u32 {
        if let Some(&i) = self.constant_index.get(&c) {
            return i;
        }
        let i = self.constants.len() as u32;
        self.constants.push(c.clone());
        self.constant_index.insert(c, i);
        i
    }

    pub fn load_constant(&mut self, c: Constant) -> Slot {
        let index = self.constant(c);
        self.value(InstrKind::LoadConst(index))
    }

    pub fn new_var(&mut self, name: impl Into<String>) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(VarInfo {
            name: name.into(),
            captured: false,
        });
        id
    }

    pub fn mark_captured(&mut self, var: VarId) {
        if let Some(info) = self.vars.get_mut(var.index()) {
            info.captured = true;
        }
    }

    pub fn add_upvalue(&mut self, name: impl Into<String>) -> UpvalueId {
        let id = UpvalueId(self.upvalues.len() as u32);
        self.upvalues.push(UpvalueInfo { name: name.into() });
        id
    }

    pub fn find_upvalue(&self, name: &str) -> Option<UpvalueId> {
        self.upvalues
            .iter()
            .position(|u| u.name == name)
            .map(|i| UpvalueId(i as u32))
    }

    // --- finishing ---

    /// Check the graph, drop dead blocks, renumber in reverse postorder and
    /// validate the result.
    pub fn finish(self) -> Result<IrFunction, IrError> {
        let num_blocks = self.blocks.len();
        let successors = |b: BlockId| -> Vec<BlockId> {
            match &self.blocks[b.index()].terminator {
                Some((t, _)) => t
                    .successors()
                    .into_iter()
                    .filter(|s| s.index() < num_blocks)
                    .collect(),
                None => Vec::new(),
            }
        };
        let order = reverse_postorder(num_blocks, &successors);

        for &b in &order {
            let Some((terminator, _)) = &self.blocks[b.index()].terminator else {
                return Err(IrError::UnterminatedBlock {
                    function: self.name.clone(),
                    block: b,
                });
            };
            if let Some(target) = terminator
                .successors()
                .into_iter()
                .find(|s| s.index() >= num_blocks)
            {
                return Err(IrError::InvalidTarget {
                    function: self.name.clone(),
                    block: b,
                    target,
                });
            }
        }

        let mut renumber = vec![None; num_blocks];
        for (new, old) in order.iter().enumerate() {
            renumber[old.index()] = Some(BlockId::new(new as u32));
        }

        let dead = num_blocks - order.len();
        if dead > 0 {
            debug!(function = %self.name, dead, "eliminated unreachable blocks");
        }

        let mut partial: Vec<Option<PartialBlock>> = self.blocks.into_iter().map(Some).collect();
        let mut blocks = Vec::with_capacity(order.len());
        for old in &order {
            let Some(PartialBlock {
                instrs,
                terminator: Some((mut terminator, line)),
            }) = partial[old.index()].take()
            else {
                continue;
            };
            terminator.map_targets(|t| renumber[t.index()].unwrap_or(t));
            blocks.push(Block {
                instrs,
                terminator,
                line,
            });
        }

        let func = IrFunction {
            id: self.id,
            name: self.name,
            params: self.params,
            is_vararg: self.is_vararg,
            line: self.first_line,
            blocks,
            slots: self.slots,
            vars: self.vars,
            upvalues: self.upvalues,
            constants: self.constants,
        };
        validate::validate(&func)?;
        Ok(func)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ret(values: Vec<Slot>) -> Terminator {
        Terminator::Return {
            values,
            spread: None,
        }
    }

    #[test]
    fn test_constants_deduplicated() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", vec![], false);
        let a = b.constant(Constant::Str("x".into()));
        let c = b.constant(Constant::Integer(1));
        let a2 = b.constant(Constant::Str("x".into()));
        assert_eq!(a, a2);
        assert_ne!(a, c);
    }

    #[test]
    fn test_load_origins() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", vec!["x".into()], false);
        let arg = b.value(InstrKind::LoadArg(0));
        let k = b.load_constant(Constant::Integer(5));
        let sum = b.value(InstrKind::Binary {
            op: crate::ir::types::BinaryOp::Add,
            lhs: arg,
            rhs: k,
        });
        b.terminate(ret(vec![sum]));
        let f = b.finish().unwrap();
        assert_eq!(f.origin(arg), Origin::Argument(0));
        assert_eq!(f.origin(k), Origin::Constant(0));
        assert!(matches!(f.origin(sum), Origin::Computed(_)));
    }

    #[test]
    fn test_code_after_terminator_is_dropped() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", vec![], false);
        b.terminate(ret(vec![]));
        let k = b.load_constant(Constant::Integer(1));
        b.terminate(ret(vec![k]));
        let f = b.finish().unwrap();
        assert_eq!(f.blocks().len(), 1);
        assert!(f.entry().instrs.is_empty());
    }

    #[test]
    fn test_unterminated_block_rejected() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", vec![], false);
        let next = b.new_block();
        b.terminate(Terminator::Jump(next));
        assert_eq!(
            b.finish().unwrap_err(),
            IrError::UnterminatedBlock {
                function: "f".into(),
                block: BlockId(1)
            }
        );
    }

    #[test]
    fn test_unreachable_unterminated_block_is_fine() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", vec![], false);
        let _orphan = b.new_block();
        b.terminate(ret(vec![]));
        assert!(b.finish().is_ok());
    }

    #[test]
    fn test_invalid_target_rejected() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", vec![], false);
        b.terminate(Terminator::Jump(BlockId(9)));
        assert!(matches!(
            b.finish(),
            Err(IrError::InvalidTarget {
                target: BlockId(9),
                ..
            })
        ));
    }

    #[test]
    fn test_blocks_renumbered_in_reverse_postorder() {
        let mut b = FunctionBuilder::new(FunctionId(0), "f", vec![], false);
        let dead = b.new_block();
        let exit = b.new_block();
        b.terminate(Terminator::Jump(exit));
        b.switch_to(dead);
        b.terminate(Terminator::Jump(exit));
        b.switch_to(exit);
        b.terminate(ret(vec![]));
        let f = b.finish().unwrap();
        assert_eq!(f.blocks().len(), 2);
        assert_eq!(f.entry().terminator, Terminator::Jump(BlockId(1)));
    }

    #[test]
    fn test_upvalues_by_name() {
        let mut b = FunctionBuilder::new(FunctionId(1), "f", vec![], false);
        let env = b.add_upvalue("_ENV");
        assert_eq!(b.find_upvalue("_ENV"), Some(env));
        assert_eq!(b.find_upvalue("x"), None);
    }
}
