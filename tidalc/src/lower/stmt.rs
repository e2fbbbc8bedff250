//! Statement lowering.
//!
//! Loop shapes:
//!
//! ```text
//! while:    entry -> header --cond--> body -> header
//!                          \--else--> exit
//!
//! repeat:   entry -> body --cond--> exit
//!                         \--else--> body
//!
//! for:      entry (coerce, prep) --ForTest--> body -> step --ForStep--> next -> body
//!                                 \--else-----------------------------> exit
//! ```

use crate::ast::{Block, Expr, ExprKind, FuncName, FunctionBody, Stmt, StmtKind};
use crate::error::{CompileError, CompileErrorKind};
use crate::ir::{BinaryOp, Constant, ForRole, InstrKind, Slot, Terminator, UpvalueId, VarId};
use crate::span::Span;

use super::scope::Resolved;
use super::Lowerer;

/// An assignable location, evaluated before the right-hand side.
enum Place {
    Var(VarId),
    Upvalue(UpvalueId),
    Index { table: Slot, key: Slot },
}

impl Lowerer<'_> {
    pub(crate) fn block(&mut self, block: &Block) -> Result<(), CompileError> {
        self.fs().scopes.push();
        let result = self.stmts(&block.stmts);
        self.fs().scopes.pop();
        result
    }

    fn stmts(&mut self, stmts: &[Stmt]) -> Result<(), CompileError> {
        for stmt in stmts {
            self.stmt(stmt)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        self.set_line(stmt.span);
        match &stmt.kind {
            StmtKind::Local { names, values } => {
                let values = self.expr_adjusted(values, names.len())?;
                for (name, value) in names.iter().zip(values) {
                    self.declare_local(name, value);
                }
            }
            StmtKind::Assign { targets, values } => self.assign(targets, values)?,
            StmtKind::Call(e) => {
                if !e.is_call() {
                    return Err(self.error(CompileErrorKind::NotAStatement, e.span));
                }
                self.call(e)?;
            }
            StmtKind::Do(body) => self.block(body)?,
            StmtKind::While { cond, body } => self.while_loop(cond, body)?,
            StmtKind::Repeat { body, cond } => self.repeat(body, cond)?,
            StmtKind::If {
                branches,
                else_block,
            } => self.if_chain(branches, else_block.as_ref())?,
            StmtKind::NumericFor {
                var,
                start,
                limit,
                step,
                body,
            } => self.numeric_for(var, start, limit, step.as_ref(), body, stmt.span)?,
            StmtKind::GenericFor { names, exprs, body } => {
                self.generic_for(names, exprs, body, stmt.span)?
            }
            StmtKind::Function { name, body } => self.function_stmt(name, body, stmt.span)?,
            StmtKind::LocalFunction { name, body } => {
                let var = self.b().new_var(name.as_str());
                self.fs().scopes.declare(name, var);
                let nil = self.b().load_constant(Constant::Nil);
                self.effect(InstrKind::VarInit { var, value: nil });
                let closure = self.function(body, name.clone(), false)?;
                self.effect(InstrKind::VarStore {
                    var,
                    value: closure,
                });
            }
            StmtKind::Return(values) => self.return_stmt(values, stmt.span)?,
            StmtKind::Break => {
                let Some(exit) = self.fs().loops.last().copied() else {
                    return Err(self.error(CompileErrorKind::BreakOutsideLoop, stmt.span));
                };
                self.terminate(Terminator::Jump(exit));
            }
        }
        Ok(())
    }

    fn declare_local(&mut self, name: &str, value: Slot) -> VarId {
        let var = self.b().new_var(name);
        self.effect(InstrKind::VarInit { var, value });
        self.fs().scopes.declare(name, var);
        var
    }

    // --- assignment ---

    fn place(&mut self, target: &Expr) -> Result<Place, CompileError> {
        match &target.kind {
            ExprKind::Name(name) => Ok(self.name_place(name)),
            ExprKind::Index { object, key } => {
                let table = self.expr(object)?;
                let key = self.expr(key)?;
                Ok(Place::Index { table, key })
            }
            _ => Err(self.error(CompileErrorKind::InvalidAssignmentTarget, target.span)),
        }
    }

    fn name_place(&mut self, name: &str) -> Place {
        match self.resolve(name) {
            Resolved::Local(var) => Place::Var(var),
            Resolved::Upvalue(upvalue) => Place::Upvalue(upvalue),
            Resolved::Global => {
                let table = self.env();
                let key = self.b().load_constant(Constant::Str(name.to_string()));
                Place::Index { table, key }
            }
        }
    }

    fn store(&mut self, place: Place, value: Slot) {
        let kind = match place {
            Place::Var(var) => InstrKind::VarStore { var, value },
            Place::Upvalue(upvalue) => InstrKind::UpStore { upvalue, value },
            Place::Index { table, key } => InstrKind::SetIndex { table, key, value },
        };
        self.effect(kind);
    }

    fn assign(&mut self, targets: &[Expr], values: &[Expr]) -> Result<(), CompileError> {
        let places = targets
            .iter()
            .map(|t| self.place(t))
            .collect::<Result<Vec<_>, _>>()?;
        let values = self.expr_adjusted(values, places.len())?;
        for (place, value) in places.into_iter().zip(values) {
            self.store(place, value);
        }
        Ok(())
    }

    // --- control flow ---

    fn while_loop(&mut self, cond: &Expr, body: &Block) -> Result<(), CompileError> {
        let header = self.b().new_block();
        let body_block = self.b().new_block();
        let exit = self.b().new_block();
        self.jump_if_open(header);

        self.b().switch_to(header);
        let c = self.expr(cond)?;
        self.terminate(Terminator::Branch {
            cond: c,
            then_block: body_block,
            else_block: exit,
        });

        self.b().switch_to(body_block);
        self.fs().loops.push(exit);
        self.block(body)?;
        self.fs().loops.pop();
        self.jump_if_open(header);

        self.b().switch_to(exit);
        Ok(())
    }

    fn repeat(&mut self, body: &Block, cond: &Expr) -> Result<(), CompileError> {
        let body_block = self.b().new_block();
        let exit = self.b().new_block();
        self.jump_if_open(body_block);

        self.b().switch_to(body_block);
        self.fs().loops.push(exit);
        // the condition sees the body's locals
        self.fs().scopes.push();
        self.stmts(&body.stmts)?;
        let c = self.expr(cond)?;
        self.fs().scopes.pop();
        self.fs().loops.pop();
        self.terminate(Terminator::Branch {
            cond: c,
            then_block: exit,
            else_block: body_block,
        });

        self.b().switch_to(exit);
        Ok(())
    }

    fn if_chain(
        &mut self,
        branches: &[(Expr, Block)],
        else_block: Option<&Block>,
    ) -> Result<(), CompileError> {
        let exit = self.b().new_block();
        for (cond, body) in branches {
            self.set_line(cond.span);
            let c = self.expr(cond)?;
            let then_block = self.b().new_block();
            let next = self.b().new_block();
            self.terminate(Terminator::Branch {
                cond: c,
                then_block,
                else_block: next,
            });
            self.b().switch_to(then_block);
            self.block(body)?;
            self.jump_if_open(exit);
            self.b().switch_to(next);
        }
        if let Some(body) = else_block {
            self.block(body)?;
        }
        self.jump_if_open(exit);
        self.b().switch_to(exit);
        Ok(())
    }

    fn numeric_for(
        &mut self,
        var: &str,
        start: &Expr,
        limit: &Expr,
        step: Option<&Expr>,
        body: &Block,
        span: Span,
    ) -> Result<(), CompileError> {
        let mut control = Vec::with_capacity(3);
        for (e, role) in [
            (Some(start), ForRole::Initial),
            (Some(limit), ForRole::Limit),
            (step, ForRole::Step),
        ] {
            let value = match e {
                Some(e) => self.expr(e)?,
                None => self.b().load_constant(Constant::Integer(1)),
            };
            self.set_line(span);
            control.push(self.value(InstrKind::ForCoerce { value, role }));
        }
        let (initial, step_value) = (control[0], control[2]);
        let mut prepared = Vec::with_capacity(3);
        for (value, role) in control
            .into_iter()
            .zip([ForRole::Initial, ForRole::Limit, ForRole::Step])
        {
            prepared.push(self.value(InstrKind::ForPrep {
                value,
                initial,
                step: step_value,
                role,
            }));
        }
        let index = self.b().new_var("(for index)");
        let limit = self.b().new_var("(for limit)");
        let step = self.b().new_var("(for step)");
        for (var, value) in [index, limit, step].into_iter().zip(prepared.iter().copied()) {
            self.effect(InstrKind::VarInit { var, value });
        }

        let body_block = self.b().new_block();
        let exit = self.b().new_block();
        let in_range = self.value(InstrKind::ForTest {
            index: prepared[0],
            limit: prepared[1],
            step: prepared[2],
        });
        self.terminate(Terminator::Branch {
            cond: in_range,
            then_block: body_block,
            else_block: exit,
        });

        self.b().switch_to(body_block);
        self.fs().scopes.push();
        let current = self.value(InstrKind::VarLoad(index));
        self.declare_local(var, current);
        self.fs().loops.push(exit);
        self.block(body)?;
        self.fs().loops.pop();
        self.fs().scopes.pop();

        if !self.b().is_terminated() {
            self.set_line(span);
            let i = self.value(InstrKind::VarLoad(index));
            let l = self.value(InstrKind::VarLoad(limit));
            let s = self.value(InstrKind::VarLoad(step));
            let next = self.value(InstrKind::ForStep {
                index: i,
                limit: l,
                step: s,
            });
            let next_block = self.b().new_block();
            self.terminate(Terminator::Branch {
                cond: next,
                then_block: next_block,
                else_block: exit,
            });

            self.b().switch_to(next_block);
            self.effect(InstrKind::VarStore {
                var: index,
                value: next,
            });
            self.terminate(Terminator::Jump(body_block));
        }

        self.b().switch_to(exit);
        Ok(())
    }

    fn generic_for(
        &mut self,
        names: &[String],
        exprs: &[Expr],
        body: &Block,
        span: Span,
    ) -> Result<(), CompileError> {
        let init = self.expr_adjusted(exprs, 3)?;
        self.set_line(span);
        let generator = self.b().new_var("(for generator)");
        let state = self.b().new_var("(for state)");
        let control = self.b().new_var("(for control)");
        for (var, value) in [generator, state, control].into_iter().zip(init) {
            self.effect(InstrKind::VarInit { var, value });
        }

        let header = self.b().new_block();
        let body_block = self.b().new_block();
        let exit = self.b().new_block();
        self.terminate(Terminator::Jump(header));

        self.b().switch_to(header);
        let f = self.value(InstrKind::VarLoad(generator));
        let s = self.value(InstrKind::VarLoad(state));
        let c = self.value(InstrKind::VarLoad(control));
        let results = self.value(InstrKind::Call {
            callee: f,
            args: vec![s, c],
            spread: None,
        });
        let first = self.value(InstrKind::Select {
            list: results,
            index: 0,
        });
        let nil = self.b().load_constant(Constant::Nil);
        let done = self.value(InstrKind::Binary {
            op: BinaryOp::Eq,
            lhs: first,
            rhs: nil,
        });
        self.terminate(Terminator::Branch {
            cond: done,
            then_block: exit,
            else_block: body_block,
        });

        self.b().switch_to(body_block);
        self.effect(InstrKind::VarStore {
            var: control,
            value: first,
        });
        self.fs().scopes.push();
        for (i, name) in names.iter().enumerate() {
            let value = if i == 0 {
                first
            } else {
                self.value(InstrKind::Select {
                    list: results,
                    index: i as u32,
                })
            };
            self.declare_local(name, value);
        }
        self.fs().loops.push(exit);
        self.block(body)?;
        self.fs().loops.pop();
        self.fs().scopes.pop();
        self.jump_if_open(header);

        self.b().switch_to(exit);
        Ok(())
    }

    // --- functions and returns ---

    fn function_stmt(
        &mut self,
        name: &FuncName,
        body: &FunctionBody,
        span: Span,
    ) -> Result<(), CompileError> {
        let (prefix, key) = match &name.method {
            Some(method) => (&name.path[..], method),
            None => match name.path.split_last() {
                Some((last, init)) => (init, last),
                None => return Err(self.error(CompileErrorKind::InvalidAssignmentTarget, span)),
            },
        };
        let is_method = name.method.is_some();

        let Some((root, fields)) = prefix.split_first() else {
            let place = self.name_place(key);
            let closure = self.function(body, name.display(), is_method)?;
            self.store(place, closure);
            return Ok(());
        };

        let mut table = self.load_name(root);
        for field in fields {
            let k = self.b().load_constant(Constant::Str(field.clone()));
            table = self.value(InstrKind::Index { table, key: k });
        }
        let key = self.b().load_constant(Constant::Str(key.clone()));
        let closure = self.function(body, name.display(), is_method)?;
        self.store(Place::Index { table, key }, closure);
        Ok(())
    }

    fn return_stmt(&mut self, values: &[Expr], span: Span) -> Result<(), CompileError> {
        if let [single] = values {
            if single.is_call() {
                let (callee, args, spread) = self.call_parts(single)?;
                self.set_line(span);
                self.terminate(Terminator::TailCall {
                    callee,
                    args,
                    spread,
                });
                return Ok(());
            }
        }
        let (values, spread) = self.expr_list(values)?;
        self.set_line(span);
        self.terminate(Terminator::Return { values, spread });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::build::*;
    use crate::ir::{ForRole, InstrKind, IrFunction, Terminator};
    use crate::lower::lower_chunk;

    fn main_of(stmts: Vec<crate::ast::Stmt>) -> IrFunction {
        lower_chunk(&chunk(stmts), "test").unwrap().remove(0)
    }

    fn count(f: &IrFunction, pred: impl Fn(&InstrKind) -> bool) -> usize {
        f.instrs().filter(|(_, i)| pred(&i.kind)).count()
    }

    #[test]
    fn test_while_loop_shape() {
        // while x do x = nil end
        let f = main_of(vec![while_loop(name("x"), vec![set("x", nil())])]);
        assert_eq!(f.blocks().len(), 4);
        let branches = f
            .blocks()
            .iter()
            .filter(|b| matches!(b.terminator, Terminator::Branch { .. }))
            .count();
        assert_eq!(branches, 1);
    }

    #[test]
    fn test_code_after_break_is_dropped() {
        // while true do break; f() end
        let f = main_of(vec![while_loop(
            boolean(true),
            vec![brk(), call_stmt(name("f"), vec![])],
        )]);
        assert_eq!(count(&f, |k| matches!(k, InstrKind::Call { .. })), 0);
    }

    #[test]
    fn test_numeric_for_coerces_controls() {
        let f = main_of(vec![numeric_for("i", int(1), int(3), None, vec![])]);
        let roles: Vec<ForRole> = f
            .instrs()
            .filter_map(|(_, i)| match i.kind {
                InstrKind::ForCoerce { role, .. } => Some(role),
                _ => None,
            })
            .collect();
        assert_eq!(roles, vec![ForRole::Initial, ForRole::Limit, ForRole::Step]);
        assert_eq!(count(&f, |k| matches!(k, InstrKind::ForPrep { .. })), 3);
        assert_eq!(count(&f, |k| matches!(k, InstrKind::ForTest { .. })), 1);
        assert_eq!(count(&f, |k| matches!(k, InstrKind::ForStep { .. })), 1);
    }

    #[test]
    fn test_numeric_for_without_back_edge_has_no_step() {
        // for i = 1, 3 do break end
        let f = main_of(vec![numeric_for("i", int(1), int(3), None, vec![brk()])]);
        assert_eq!(count(&f, |k| matches!(k, InstrKind::ForStep { .. })), 0);
    }

    #[test]
    fn test_generic_for_calls_generator_each_iteration() {
        // for k, v in next, t do end
        let f = main_of(vec![generic_for(&["k", "v"], vec![name("next"), name("t")], vec![])]);
        assert_eq!(count(&f, |k| matches!(k, InstrKind::Call { .. })), 1);
        let names: Vec<&str> = f.vars().iter().map(|v| v.name.as_str()).collect();
        assert!(names.contains(&"k") && names.contains(&"v"));
    }

    #[test]
    fn test_return_call_is_tail_call() {
        let f = main_of(vec![ret(vec![call(name("f"), vec![int(1)])])]);
        assert!(matches!(f.entry().terminator, Terminator::TailCall { .. }));
    }

    #[test]
    fn test_return_spreads_last_call() {
        let f = main_of(vec![ret(vec![int(1), call(name("f"), vec![])])]);
        let Terminator::Return { values, spread } = &f.entry().terminator else {
            panic!("expected return");
        };
        assert_eq!(values.len(), 1);
        assert!(spread.is_some());
    }

    #[test]
    fn test_local_function_can_recurse() {
        // local function f() return f() end
        let fns = lower_chunk(
            &chunk(vec![local_function(
                "f",
                &[],
                vec![ret(vec![call(name("f"), vec![])])],
            )]),
            "test",
        )
        .unwrap();
        assert!(fns[0].vars()[0].captured);
        assert_eq!(fns[1].upvalues()[0].name, "f");
    }

    #[test]
    fn test_dotted_function_name() {
        // function a.b.c() end
        let fns = lower_chunk(&chunk(vec![function(&["a", "b", "c"], &[], vec![])]), "test")
            .unwrap();
        assert_eq!(fns[1].name(), "a.b.c");
        let main = &fns[0];
        assert_eq!(count(main, |k| matches!(k, InstrKind::Index { .. })), 2);
        assert_eq!(count(main, |k| matches!(k, InstrKind::SetIndex { .. })), 1);
    }

    #[test]
    fn test_if_else_chain() {
        let f = main_of(vec![if_else(
            vec![(name("a"), vec![set("x", int(1))]), (name("b"), vec![set("x", int(2))])],
            Some(vec![set("x", int(3))]),
        )]);
        let branches = f
            .blocks()
            .iter()
            .filter(|b| matches!(b.terminator, Terminator::Branch { .. }))
            .count();
        assert_eq!(branches, 2);
    }

    #[test]
    fn test_repeat_condition_sees_body_locals() {
        // repeat local done = true until done
        let f = main_of(vec![repeat(vec![local(&["done"], vec![boolean(true)])], name("done"))]);
        // `done` resolves to the local, not to _ENV.done
        assert_eq!(count(&f, |k| matches!(k, InstrKind::Index { .. })), 0);
    }

    #[test]
    fn test_expression_statement_rejected() {
        let err = lower_chunk(&chunk(vec![expr_stmt(int(1))]), "test").unwrap_err();
        assert_eq!(err.kind, crate::error::CompileErrorKind::NotAStatement);
    }
}
