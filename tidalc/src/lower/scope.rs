//! Name resolution.
//!
//! A name resolves, in order, to a local of the current function, an
//! upvalue it already has, a local or upvalue of an enclosing function
//! (creating upvalues along the way), or a field of `_ENV`.

use crate::ir::{Capture, UpvalueId, VarId};

use super::Lowerer;

/// Lexical scopes of one function.
#[derive(Debug, Default)]
pub(crate) struct Scopes {
    frames: Vec<Vec<(String, VarId)>>,
}

impl Scopes {
    pub(crate) fn push(&mut self) {
        self.frames.push(Vec::new());
    }

    pub(crate) fn pop(&mut self) {
        self.frames.pop();
    }

    pub(crate) fn declare(&mut self, name: &str, var: VarId) {
        if self.frames.is_empty() {
            self.frames.push(Vec::new());
        }
        let last = self.frames.len() - 1;
        self.frames[last].push((name.to_string(), var));
    }

    /// The innermost visible local named `name`.
    pub(crate) fn lookup(&self, name: &str) -> Option<VarId> {
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolved {
    Local(VarId),
    Upvalue(UpvalueId),
    Global,
}

impl Lowerer<'_> {
    pub(crate) fn resolve(&mut self, name: &str) -> Resolved {
        let level = self.stack.len() - 1;
        self.resolve_at(level, name).unwrap_or(Resolved::Global)
    }

    fn resolve_at(&mut self, level: usize, name: &str) -> Option<Resolved> {
        let state = &self.stack[level];
        if let Some(var) = state.scopes.lookup(name) {
            return Some(Resolved::Local(var));
        }
        if let Some(upvalue) = state.builder.find_upvalue(name) {
            return Some(Resolved::Upvalue(upvalue));
        }
        if level == 0 {
            return None;
        }
        let capture = match self.resolve_at(level - 1, name)? {
            Resolved::Local(var) => {
                self.stack[level - 1].builder.mark_captured(var);
                Capture::Var(var)
            }
            Resolved::Upvalue(upvalue) => Capture::Upvalue(upvalue),
            Resolved::Global => return None,
        };
        let state = &mut self.stack[level];
        let upvalue = state.builder.add_upvalue(name);
        state.captures.push(capture);
        Some(Resolved::Upvalue(upvalue))
    }
}
