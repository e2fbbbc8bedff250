//! Expression lowering.

use crate::ast::{BinOp, Expr, ExprKind, TableField, UnOp};
use crate::error::{CompileError, CompileErrorKind};
use crate::ir::{BinaryOp, Constant, InstrKind, Slot, Terminator, UnaryOp};
use crate::span::Span;

use super::scope::Resolved;
use super::Lowerer;

/// The value of an expression in a position that may take a list.
pub(crate) enum Tail {
    One(Slot),
    Many(Slot),
}

fn binary_op(op: BinOp) -> Option<BinaryOp> {
    Some(match op {
        BinOp::Add => BinaryOp::Add,
        BinOp::Sub => BinaryOp::Sub,
        BinOp::Mul => BinaryOp::Mul,
        BinOp::Div => BinaryOp::Div,
        BinOp::IDiv => BinaryOp::IDiv,
        BinOp::Mod => BinaryOp::Mod,
        BinOp::Pow => BinaryOp::Pow,
        BinOp::Concat => BinaryOp::Concat,
        BinOp::Eq => BinaryOp::Eq,
        BinOp::Ne => BinaryOp::Ne,
        BinOp::Lt => BinaryOp::Lt,
        BinOp::Le => BinaryOp::Le,
        BinOp::BAnd => BinaryOp::BAnd,
        BinOp::BOr => BinaryOp::BOr,
        BinOp::BXor => BinaryOp::BXor,
        BinOp::Shl => BinaryOp::Shl,
        BinOp::Shr => BinaryOp::Shr,
        BinOp::Gt | BinOp::Ge | BinOp::And | BinOp::Or => return None,
    })
}

fn unary_op(op: UnOp) -> UnaryOp {
    match op {
        UnOp::Neg => UnaryOp::Neg,
        UnOp::Not => UnaryOp::Not,
        UnOp::Len => UnaryOp::Len,
        UnOp::BNot => UnaryOp::BNot,
    }
}

impl Lowerer<'_> {
    /// Lower `e` to exactly one value.
    pub(crate) fn expr(&mut self, e: &Expr) -> Result<Slot, CompileError> {
        self.set_line(e.span);
        let slot = match &e.kind {
            ExprKind::Nil => self.b().load_constant(Constant::Nil),
            ExprKind::True => self.b().load_constant(Constant::Bool(true)),
            ExprKind::False => self.b().load_constant(Constant::Bool(false)),
            ExprKind::Integer(i) => self.b().load_constant(Constant::Integer(*i)),
            ExprKind::Float(x) => self.b().load_constant(Constant::Float(*x)),
            ExprKind::Str(s) => self.b().load_constant(Constant::Str(s.clone())),
            ExprKind::Vararg => {
                let list = self.varargs(e.span)?;
                self.value(InstrKind::Select { list, index: 0 })
            }
            ExprKind::Name(name) => self.load_name(name),
            ExprKind::Index { object, key } => {
                let table = self.expr(object)?;
                let key = self.expr(key)?;
                self.set_line(e.span);
                self.value(InstrKind::Index { table, key })
            }
            ExprKind::Call { .. } | ExprKind::MethodCall { .. } => {
                let list = self.call(e)?;
                self.value(InstrKind::Select { list, index: 0 })
            }
            ExprKind::Function(body) => {
                let name = self.anonymous_name(e.span);
                self.function(body, name, false)?
            }
            ExprKind::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, e.span)?,
            ExprKind::Unary { op, operand } => {
                let operand = self.expr(operand)?;
                self.set_line(e.span);
                self.value(InstrKind::Unary {
                    op: unary_op(*op),
                    operand,
                })
            }
            ExprKind::Table(fields) => self.table(fields, e.span)?,
            ExprKind::Paren(inner) => self.expr(inner)?,
        };
        Ok(slot)
    }

    /// Lower `e` keeping every value it produces.
    pub(crate) fn tail(&mut self, e: &Expr) -> Result<Tail, CompileError> {
        match &e.kind {
            ExprKind::Call { .. } | ExprKind::MethodCall { .. } => Ok(Tail::Many(self.call(e)?)),
            ExprKind::Vararg => {
                self.set_line(e.span);
                Ok(Tail::Many(self.varargs(e.span)?))
            }
            _ => Ok(Tail::One(self.expr(e)?)),
        }
    }

    /// Lower an expression list whose last entry may expand.
    pub(crate) fn expr_list(
        &mut self,
        exprs: &[Expr],
    ) -> Result<(Vec<Slot>, Option<Slot>), CompileError> {
        let mut values = Vec::with_capacity(exprs.len());
        let Some((last, init)) = exprs.split_last() else {
            return Ok((values, None));
        };
        for e in init {
            values.push(self.expr(e)?);
        }
        match self.tail(last)? {
            Tail::One(slot) => {
                values.push(slot);
                Ok((values, None))
            }
            Tail::Many(list) => Ok((values, Some(list))),
        }
    }

    /// Lower an expression list adjusted to exactly `n` values. Extra
    /// expressions are still evaluated; missing values are nil.
    pub(crate) fn expr_adjusted(&mut self, exprs: &[Expr], n: usize) -> Result<Vec<Slot>, CompileError> {
        let mut values = Vec::with_capacity(n);
        for (i, e) in exprs.iter().enumerate() {
            let is_last = i + 1 == exprs.len();
            if is_last && e.is_multi() && values.len() < n {
                if let Tail::Many(list) = self.tail(e)? {
                    for index in 0..(n - values.len()) as u32 {
                        values.push(self.value(InstrKind::Select { list, index }));
                    }
                }
            } else {
                let slot = self.expr(e)?;
                if values.len() < n {
                    values.push(slot);
                }
            }
        }
        while values.len() < n {
            values.push(self.b().load_constant(Constant::Nil));
        }
        Ok(values)
    }

    /// Lower a call or method call to its result list.
    pub(crate) fn call(&mut self, e: &Expr) -> Result<Slot, CompileError> {
        let (callee, args, spread) = self.call_parts(e)?;
        self.set_line(e.span);
        Ok(self.value(InstrKind::Call {
            callee,
            args,
            spread,
        }))
    }

    /// Evaluate the callee and arguments of a call, in source order.
    pub(crate) fn call_parts(
        &mut self,
        e: &Expr,
    ) -> Result<(Slot, Vec<Slot>, Option<Slot>), CompileError> {
        match &e.kind {
            ExprKind::Call { callee, args } => {
                let callee = self.expr(callee)?;
                let (args, spread) = self.expr_list(args)?;
                Ok((callee, args, spread))
            }
            ExprKind::MethodCall {
                object,
                method,
                args,
            } => {
                let object = self.expr(object)?;
                self.set_line(e.span);
                let key = self.b().load_constant(Constant::Str(method.clone()));
                let callee = self.value(InstrKind::Index { table: object, key });
                let (rest, spread) = self.expr_list(args)?;
                let mut args = Vec::with_capacity(rest.len() + 1);
                args.push(object);
                args.extend(rest);
                Ok((callee, args, spread))
            }
            _ => Err(self.error(CompileErrorKind::NotAStatement, e.span)),
        }
    }

    fn varargs(&mut self, span: Span) -> Result<Slot, CompileError> {
        if !self.b().is_vararg() {
            return Err(self.error(CompileErrorKind::VarargOutsideVararg, span));
        }
        Ok(self.value(InstrKind::Varargs))
    }

    // --- names ---

    pub(crate) fn load_name(&mut self, name: &str) -> Slot {
        match self.resolve(name) {
            Resolved::Local(var) => self.value(InstrKind::VarLoad(var)),
            Resolved::Upvalue(upvalue) => self.value(InstrKind::UpLoad(upvalue)),
            Resolved::Global => {
                let env = self.env();
                let key = self.b().load_constant(Constant::Str(name.to_string()));
                self.value(InstrKind::Index { table: env, key })
            }
        }
    }

    /// The current `_ENV` table.
    pub(crate) fn env(&mut self) -> Slot {
        match self.resolve("_ENV") {
            Resolved::Local(var) => self.value(InstrKind::VarLoad(var)),
            Resolved::Upvalue(upvalue) => self.value(InstrKind::UpLoad(upvalue)),
            Resolved::Global => self.b().load_constant(Constant::Nil),
        }
    }

    // --- operators ---

    fn binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, span: Span) -> Result<Slot, CompileError> {
        if matches!(op, BinOp::And | BinOp::Or) {
            return self.logical(op == BinOp::And, lhs, rhs, span);
        }
        let l = self.expr(lhs)?;
        let r = self.expr(rhs)?;
        self.set_line(span);
        let kind = match (op, binary_op(op)) {
            (_, Some(op)) => InstrKind::Binary { op, lhs: l, rhs: r },
            (BinOp::Gt, None) => InstrKind::Binary {
                op: BinaryOp::Lt,
                lhs: r,
                rhs: l,
            },
            _ => InstrKind::Binary {
                op: BinaryOp::Le,
                lhs: r,
                rhs: l,
            },
        };
        Ok(self.value(kind))
    }

    /// `a and b` / `a or b`: the right operand runs only when needed.
    fn logical(&mut self, is_and: bool, lhs: &Expr, rhs: &Expr, span: Span) -> Result<Slot, CompileError> {
        let l = self.expr(lhs)?;
        self.set_line(span);
        let var = self.b().new_var("(logical)");
        self.effect(InstrKind::VarInit { var, value: l });

        let rhs_block = self.b().new_block();
        let join = self.b().new_block();
        let (then_block, else_block) = if is_and {
            (rhs_block, join)
        } else {
            (join, rhs_block)
        };
        self.terminate(Terminator::Branch {
            cond: l,
            then_block,
            else_block,
        });

        self.b().switch_to(rhs_block);
        let r = self.expr(rhs)?;
        self.effect(InstrKind::VarStore { var, value: r });
        self.terminate(Terminator::Jump(join));

        self.b().switch_to(join);
        self.set_line(span);
        Ok(self.value(InstrKind::VarLoad(var)))
    }

    // --- tables ---

    fn table(&mut self, fields: &[TableField], span: Span) -> Result<Slot, CompileError> {
        let mut array = Vec::new();
        let mut keyed = Vec::new();
        let mut spread = None;
        for (i, field) in fields.iter().enumerate() {
            let is_last = i + 1 == fields.len();
            match field {
                TableField::Positional(e) if is_last => match self.tail(e)? {
                    Tail::One(slot) => array.push(slot),
                    Tail::Many(list) => spread = Some(list),
                },
                TableField::Positional(e) => array.push(self.expr(e)?),
                TableField::Named(name, e) => {
                    let key = self.b().load_constant(Constant::Str(name.clone()));
                    let value = self.expr(e)?;
                    keyed.push((key, value));
                }
                TableField::Keyed(k, e) => {
                    let key = self.expr(k)?;
                    let value = self.expr(e)?;
                    keyed.push((key, value));
                }
            }
        }
        self.set_line(span);
        Ok(self.value(InstrKind::NewTable {
            array,
            fields: keyed,
            spread,
        }))
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::build::*;
    use crate::ir::{Arity, BinaryOp, InstrKind, IrFunction, Terminator};
    use crate::lower::lower_chunk;

    fn main_of(stmts: Vec<crate::ast::Stmt>) -> IrFunction {
        lower_chunk(&chunk(stmts), "test").unwrap().remove(0)
    }

    fn kinds(f: &IrFunction) -> Vec<InstrKind> {
        f.instrs().map(|(_, i)| i.kind.clone()).collect()
    }

    #[test]
    fn test_greater_than_swaps_operands() {
        // local a, b = 1, 2; return a > b
        let f = main_of(vec![
            local(&["a", "b"], vec![int(1), int(2)]),
            ret(vec![gt(name("a"), name("b"))]),
        ]);
        let cmp = kinds(&f)
            .into_iter()
            .find_map(|k| match k {
                InstrKind::Binary { op, lhs, rhs } => Some((op, lhs, rhs)),
                _ => None,
            })
            .unwrap();
        let loads: Vec<_> = f
            .instrs()
            .filter(|(_, i)| matches!(i.kind, InstrKind::VarLoad(_)))
            .filter_map(|(_, i)| i.dest)
            .collect();
        assert_eq!(cmp, (BinaryOp::Lt, loads[1], loads[0]));
    }

    #[test]
    fn test_and_creates_branch() {
        let f = main_of(vec![local(&["x"], vec![and(boolean(true), int(2))])]);
        assert!(matches!(f.entry().terminator, Terminator::Branch { .. }));
        assert_eq!(f.blocks().len(), 3);
    }

    #[test]
    fn test_call_result_is_multi_until_selected() {
        // local x = f()
        let f = main_of(vec![local(&["x"], vec![call(name("f"), vec![])])]);
        let call_slot = f
            .instrs()
            .find(|(_, i)| matches!(i.kind, InstrKind::Call { .. }))
            .and_then(|(_, i)| i.dest)
            .unwrap();
        assert_eq!(f.slots()[call_slot.index()].arity, Arity::Multi);
        assert!(kinds(&f)
            .iter()
            .any(|k| matches!(k, InstrKind::Select { list, index: 0 } if *list == call_slot)));
    }

    #[test]
    fn test_last_call_argument_spreads() {
        // print(1, f())
        let f = main_of(vec![call_stmt(name("print"), vec![int(1), call(name("f"), vec![])])]);
        let outer = kinds(&f)
            .into_iter()
            .filter_map(|k| match k {
                InstrKind::Call { args, spread, .. } => Some((args.len(), spread.is_some())),
                _ => None,
            })
            .last()
            .unwrap();
        assert_eq!(outer, (1, true));
    }

    #[test]
    fn test_parenthesized_call_truncates() {
        // return (f())
        let f = main_of(vec![ret(vec![paren(call(name("f"), vec![]))])]);
        let Terminator::Return { values, spread } = &f.blocks()[0].terminator else {
            panic!("expected return");
        };
        assert_eq!(values.len(), 1);
        assert!(spread.is_none());
    }

    #[test]
    fn test_method_call_passes_receiver() {
        // obj:m(1)
        let f = main_of(vec![expr_stmt(method(name("obj"), "m", vec![int(1)]))]);
        let args = kinds(&f)
            .into_iter()
            .find_map(|k| match k {
                InstrKind::Call { args, .. } => Some(args),
                _ => None,
            })
            .unwrap();
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_table_constructor_fields() {
        // local t = { 1, 2, x = 3, ... }
        let f = main_of(vec![local(
            &["t"],
            vec![table(vec![
                crate::ast::TableField::Positional(int(1)),
                crate::ast::TableField::Positional(int(2)),
                crate::ast::TableField::Named("x".into(), int(3)),
                crate::ast::TableField::Positional(vararg()),
            ])],
        )]);
        let (array, fields, spread) = kinds(&f)
            .into_iter()
            .find_map(|k| match k {
                InstrKind::NewTable {
                    array,
                    fields,
                    spread,
                } => Some((array.len(), fields.len(), spread.is_some())),
                _ => None,
            })
            .unwrap();
        assert_eq!((array, fields, spread), (2, 1, true));
    }

    #[test]
    fn test_adjusted_list_pads_with_nil() {
        // local a, b, c = 1
        let f = main_of(vec![local(&["a", "b", "c"], vec![int(1)])]);
        let inits = kinds(&f)
            .iter()
            .filter(|k| matches!(k, InstrKind::VarInit { .. }))
            .count();
        assert_eq!(inits, 3);
    }
}
