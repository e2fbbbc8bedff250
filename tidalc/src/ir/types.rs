//! IR identifiers, constants, instructions and terminators.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::OrderedFloat;

use super::origin::Origin;

// ============================================================================
// Identifiers
// ============================================================================

/// A virtual SSA slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slot(pub u32);

impl Slot {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A mutable Lua local or compiler temporary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub u32);

impl VarId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A variable captured from an enclosing function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UpvalueId(pub u32);

impl UpvalueId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for UpvalueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.0)
    }
}

/// Basic block identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl BlockId {
    /// The entry block of a function.
    pub const ENTRY: BlockId = BlockId(0);

    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Position of a function in its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

impl FunctionId {
    pub const MAIN: FunctionId = FunctionId(0);

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

// ============================================================================
// Constants and slot metadata
// ============================================================================

/// An entry of a function's constant pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constant {
    Nil,
    Bool(bool),
    Integer(i64),
    Float(OrderedFloat),
    Str(String),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Nil => write!(f, "nil"),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Integer(i) => write!(f, "{}", i),
            Constant::Float(x) => write!(f, "{:?}", x.0),
            Constant::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// How many values a slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arity {
    Single,
    /// A value list produced by a call or `...`.
    Multi,
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Single => write!(f, "single"),
            Arity::Multi => write!(f, "multi"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInfo {
    pub origin: Origin,
    pub arity: Arity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarInfo {
    pub name: String,
    /// Referenced by a nested closure; lives in a shared cell.
    pub captured: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpvalueInfo {
    pub name: String,
}

// ============================================================================
// Operators
// ============================================================================

/// Binary operators after lowering. `>`/`>=` become swapped `<`/`<=`, and
/// `and`/`or` become control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::IDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Concat => "..",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "~=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::BAnd => "&",
            BinaryOp::BOr => "|",
            BinaryOp::BXor => "~",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    Len,
    BNot,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "not ",
            UnaryOp::Len => "#",
            UnaryOp::BNot => "~",
        }
    }
}

/// Which numeric `for` control value a coercion checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForRole {
    Initial,
    Limit,
    Step,
}

/// Source of one upvalue of a new closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capture {
    Var(VarId),
    Upvalue(UpvalueId),
}

// ============================================================================
// Instructions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instr {
    pub dest: Option<Slot>,
    pub kind: InstrKind,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstrKind {
    LoadArg(u32),
    LoadConst(u32),
    /// The function's extra arguments, as a list.
    Varargs,
    /// Start a new lifetime of a variable: a fresh cell if captured.
    VarInit { var: VarId, value: Slot },
    VarLoad(VarId),
    VarStore { var: VarId, value: Slot },
    UpLoad(UpvalueId),
    UpStore { upvalue: UpvalueId, value: Slot },
    Binary { op: BinaryOp, lhs: Slot, rhs: Slot },
    Unary { op: UnaryOp, operand: Slot },
    Index { table: Slot, key: Slot },
    SetIndex { table: Slot, key: Slot, value: Slot },
    NewTable {
        array: Vec<Slot>,
        fields: Vec<(Slot, Slot)>,
        spread: Option<Slot>,
    },
    Closure {
        function: FunctionId,
        captures: Vec<Capture>,
    },
    /// Produces a list of results.
    Call {
        callee: Slot,
        args: Vec<Slot>,
        spread: Option<Slot>,
    },
    /// Element `index` of a list, or nil.
    Select { list: Slot, index: u32 },
    ForCoerce { value: Slot, role: ForRole },
    /// The control value for `role`, converted by the loop's kind: every
    /// control becomes a float unless `initial` and `step` are both
    /// integers, in which case a float limit is rounded toward the start.
    ForPrep {
        value: Slot,
        initial: Slot,
        step: Slot,
        role: ForRole,
    },
    /// Whether a numeric loop index is still within its limit.
    ForTest { index: Slot, limit: Slot, step: Slot },
    /// The next loop index, or `false` once the loop is done. Integer
    /// loops stop instead of wrapping.
    ForStep { index: Slot, limit: Slot, step: Slot },
}

impl InstrKind {
    /// Arity of the defined slot, or `None` for pure effects.
    pub fn result_arity(&self) -> Option<Arity> {
        match self {
            InstrKind::Varargs | InstrKind::Call { .. } => Some(Arity::Multi),
            InstrKind::VarInit { .. }
            | InstrKind::VarStore { .. }
            | InstrKind::UpStore { .. }
            | InstrKind::SetIndex { .. } => None,
            _ => Some(Arity::Single),
        }
    }

    /// Whether the instruction can be deleted when its result is unused.
    pub fn is_removable(&self) -> bool {
        matches!(
            self,
            InstrKind::LoadArg(_)
                | InstrKind::LoadConst(_)
                | InstrKind::Varargs
                | InstrKind::VarLoad(_)
                | InstrKind::UpLoad(_)
                | InstrKind::Select { .. }
                | InstrKind::Closure { .. }
        )
    }

    /// Slots read, paired with the arity each position requires.
    pub fn operands(&self) -> Vec<(Slot, Arity)> {
        use Arity::*;
        match self {
            InstrKind::LoadArg(_)
            | InstrKind::LoadConst(_)
            | InstrKind::Varargs
            | InstrKind::VarLoad(_)
            | InstrKind::UpLoad(_)
            | InstrKind::Closure { .. } => vec![],
            InstrKind::VarInit { value, .. }
            | InstrKind::VarStore { value, .. }
            | InstrKind::UpStore { value, .. } => vec![(*value, Single)],
            InstrKind::Binary { lhs, rhs, .. } => vec![(*lhs, Single), (*rhs, Single)],
            InstrKind::Unary { operand, .. } => vec![(*operand, Single)],
            InstrKind::Index { table, key } => vec![(*table, Single), (*key, Single)],
            InstrKind::SetIndex { table, key, value } => {
                vec![(*table, Single), (*key, Single), (*value, Single)]
            }
            InstrKind::NewTable {
                array,
                fields,
                spread,
            } => {
                let mut ops: Vec<_> = fields
                    .iter()
                    .flat_map(|(k, v)| [(*k, Single), (*v, Single)])
                    .collect();
                ops.extend(array.iter().map(|s| (*s, Single)));
                ops.extend(spread.iter().map(|s| (*s, Multi)));
                ops
            }
            InstrKind::Call {
                callee,
                args,
                spread,
            } => call_operands(*callee, args, *spread),
            InstrKind::Select { list, .. } => vec![(*list, Multi)],
            InstrKind::ForCoerce { value, .. } => vec![(*value, Single)],
            InstrKind::ForPrep {
                value,
                initial,
                step,
                ..
            } => vec![(*value, Single), (*initial, Single), (*step, Single)],
            InstrKind::ForTest { index, limit, step } | InstrKind::ForStep { index, limit, step } => {
                vec![(*index, Single), (*limit, Single), (*step, Single)]
            }
        }
    }

    /// Rewrite every slot operand through `f`.
    pub fn map_slots(&mut self, mut f: impl FnMut(Slot) -> Slot) {
        fn each(slots: &mut [Slot], f: &mut impl FnMut(Slot) -> Slot) {
            for s in slots {
                *s = f(*s);
            }
        }
        match self {
            InstrKind::LoadArg(_)
            | InstrKind::LoadConst(_)
            | InstrKind::Varargs
            | InstrKind::VarLoad(_)
            | InstrKind::UpLoad(_)
            | InstrKind::Closure { .. } => {}
            InstrKind::VarInit { value, .. }
            | InstrKind::VarStore { value, .. }
            | InstrKind::UpStore { value, .. } => *value = f(*value),
            InstrKind::Binary { lhs, rhs, .. } => {
                *lhs = f(*lhs);
                *rhs = f(*rhs);
            }
            InstrKind::Unary { operand, .. } => *operand = f(*operand),
            InstrKind::Index { table, key } => {
                *table = f(*table);
                *key = f(*key);
            }
            InstrKind::SetIndex { table, key, value } => {
                *table = f(*table);
                *key = f(*key);
                *value = f(*value);
            }
            InstrKind::NewTable {
                array,
                fields,
                spread,
            } => {
                for (k, v) in fields.iter_mut() {
                    *k = f(*k);
                    *v = f(*v);
                }
                each(array, &mut f);
                if let Some(s) = spread {
                    *s = f(*s);
                }
            }
            InstrKind::Call {
                callee,
                args,
                spread,
            } => {
                *callee = f(*callee);
                each(args, &mut f);
                if let Some(s) = spread {
                    *s = f(*s);
                }
            }
            InstrKind::Select { list, .. } => *list = f(*list),
            InstrKind::ForCoerce { value, .. } => *value = f(*value),
            InstrKind::ForPrep {
                value,
                initial,
                step,
                ..
            } => {
                *value = f(*value);
                *initial = f(*initial);
                *step = f(*step);
            }
            InstrKind::ForTest { index, limit, step } | InstrKind::ForStep { index, limit, step } => {
                *index = f(*index);
                *limit = f(*limit);
                *step = f(*step);
            }
        }
    }
}

fn call_operands(callee: Slot, args: &[Slot], spread: Option<Slot>) -> Vec<(Slot, Arity)> {
    let mut ops = vec![(callee, Arity::Single)];
    ops.extend(args.iter().map(|s| (*s, Arity::Single)));
    ops.extend(spread.map(|s| (s, Arity::Multi)));
    ops
}

// ============================================================================
// Terminators
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Terminator {
    Jump(BlockId),
    Branch {
        cond: Slot,
        then_block: BlockId,
        else_block: BlockId,
    },
    Return {
        values: Vec<Slot>,
        spread: Option<Slot>,
    },
    /// Replace this call with a call to `callee`.
    TailCall {
        callee: Slot,
        args: Vec<Slot>,
        spread: Option<Slot>,
    },
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Jump(target) => vec![*target],
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => {
                if then_block == else_block {
                    vec![*then_block]
                } else {
                    vec![*then_block, *else_block]
                }
            }
            Terminator::Return { .. } | Terminator::TailCall { .. } => vec![],
        }
    }

    pub fn operands(&self) -> Vec<(Slot, Arity)> {
        match self {
            Terminator::Jump(_) => vec![],
            Terminator::Branch { cond, .. } => vec![(*cond, Arity::Single)],
            Terminator::Return { values, spread } => {
                let mut ops: Vec<_> = values.iter().map(|s| (*s, Arity::Single)).collect();
                ops.extend(spread.map(|s| (s, Arity::Multi)));
                ops
            }
            Terminator::TailCall {
                callee,
                args,
                spread,
            } => call_operands(*callee, args, *spread),
        }
    }

    pub fn map_slots(&mut self, mut f: impl FnMut(Slot) -> Slot) {
        match self {
            Terminator::Jump(_) => {}
            Terminator::Branch { cond, .. } => *cond = f(*cond),
            Terminator::Return { values, spread } => {
                for v in values.iter_mut() {
                    *v = f(*v);
                }
                if let Some(s) = spread {
                    *s = f(*s);
                }
            }
            Terminator::TailCall {
                callee,
                args,
                spread,
            } => {
                *callee = f(*callee);
                for a in args.iter_mut() {
                    *a = f(*a);
                }
                if let Some(s) = spread {
                    *s = f(*s);
                }
            }
        }
    }

    pub fn map_targets(&mut self, mut f: impl FnMut(BlockId) -> BlockId) {
        match self {
            Terminator::Jump(target) => *target = f(*target),
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => {
                *then_block = f(*then_block);
                *else_block = f(*else_block);
            }
            Terminator::Return { .. } | Terminator::TailCall { .. } => {}
        }
    }
}

/// A finished basic block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub instrs: Vec<Instr>,
    pub terminator: Terminator,
    /// Source line of the terminator.
    pub line: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display() {
        assert_eq!(Slot(3).to_string(), "%3");
        assert_eq!(BlockId::ENTRY.to_string(), "bb0");
        assert_eq!(VarId(1).to_string(), "v1");
        assert_eq!(FunctionId(2).to_string(), "fn2");
    }

    #[test]
    fn test_call_operands_and_arity() {
        let call = InstrKind::Call {
            callee: Slot(0),
            args: vec![Slot(1)],
            spread: Some(Slot(2)),
        };
        assert_eq!(call.result_arity(), Some(Arity::Multi));
        assert_eq!(
            call.operands(),
            vec![
                (Slot(0), Arity::Single),
                (Slot(1), Arity::Single),
                (Slot(2), Arity::Multi)
            ]
        );
        assert!(!call.is_removable());
    }

    #[test]
    fn test_map_slots() {
        let mut kind = InstrKind::Binary {
            op: BinaryOp::Add,
            lhs: Slot(1),
            rhs: Slot(1),
        };
        kind.map_slots(|s| Slot(s.0 + 10));
        assert_eq!(
            kind,
            InstrKind::Binary {
                op: BinaryOp::Add,
                lhs: Slot(11),
                rhs: Slot(11)
            }
        );
    }

    #[test]
    fn test_branch_successors_dedup() {
        let t = Terminator::Branch {
            cond: Slot(0),
            then_block: BlockId(1),
            else_block: BlockId(1),
        };
        assert_eq!(t.successors(), vec![BlockId(1)]);
        assert!(Terminator::Return {
            values: vec![],
            spread: None
        }
        .successors()
        .is_empty());
    }

    #[test]
    fn test_effects_have_no_result() {
        let store = InstrKind::VarStore {
            var: VarId(0),
            value: Slot(0),
        };
        assert_eq!(store.result_arity(), None);
        assert_eq!(InstrKind::LoadConst(0).result_arity(), Some(Arity::Single));
    }
}
