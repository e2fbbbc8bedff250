//! Abstract Syntax Tree for Lua chunks.
//!
//! The compiler starts from this tree; producing it from source text is the
//! job of a front end outside this crate.
//!
//! # AST Structure
//!
//! - [`Chunk`] - Root node: the body of the main function
//! - [`Stmt`] - Statements (assignments, loops, function definitions, ...)
//! - [`Expr`] - Expressions (literals, operators, calls, constructors, ...)
//! - [`FunctionBody`] - Parameter list and body shared by every function form
//!
//! Every statement and expression carries a [`Span`]; the compiler uses its
//! line for runtime error locations.
//!
//! # Building Trees by Hand
//!
//! The [`build`] module has terse constructors for tests and embedders:
//!
//! ```rust
//! use tidalc::ast::build::*;
//!
//! // local x = 1; return x + 2
//! let chunk = chunk(vec![
//!     local(&["x"], vec![int(1)]),
//!     ret(vec![add(name("x"), int(2))]),
//! ]);
//! assert_eq!(chunk.block.stmts.len(), 2);
//! ```

use serde::{Deserialize, Serialize};

use crate::span::Span;

/// Wrapper for f64 that provides total ordering and Eq.
///
/// NaN values are considered equal to each other. Constants compare by bit
/// pattern, so `0.0` and `-0.0` stay distinct.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderedFloat(pub f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        if self.0.is_nan() && other.0.is_nan() {
            return true;
        }
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for OrderedFloat {}

impl std::hash::Hash for OrderedFloat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        if self.0.is_nan() {
            f64::NAN.to_bits().hash(state);
        } else {
            self.0.to_bits().hash(state);
        }
    }
}

impl From<f64> for OrderedFloat {
    fn from(f: f64) -> Self {
        OrderedFloat(f)
    }
}

/// A complete chunk: the body of the main function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub block: Block,
    pub span: Span,
}

/// A sequence of statements forming one scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    /// `local a, b = e1, e2`
    Local { names: Vec<String>, values: Vec<Expr> },
    /// `t[k], x = e1, e2`
    Assign { targets: Vec<Expr>, values: Vec<Expr> },
    /// A call used as a statement.
    Call(Expr),
    /// `do ... end`
    Do(Block),
    While { cond: Expr, body: Block },
    /// `repeat ... until cond`; `cond` sees the body's locals.
    Repeat { body: Block, cond: Expr },
    /// `if c1 then b1 elseif c2 then b2 else b3 end`
    If {
        branches: Vec<(Expr, Block)>,
        else_block: Option<Block>,
    },
    /// `for var = start, limit, step do ... end`
    NumericFor {
        var: String,
        start: Expr,
        limit: Expr,
        step: Option<Expr>,
        body: Block,
    },
    /// `for k, v in exprs do ... end`
    GenericFor {
        names: Vec<String>,
        exprs: Vec<Expr>,
        body: Block,
    },
    /// `function a.b.c:m(...) ... end`
    Function { name: FuncName, body: FunctionBody },
    /// `local function f(...) ... end`
    LocalFunction { name: String, body: FunctionBody },
    Return(Vec<Expr>),
    Break,
}

/// The dotted name of a `function` statement, with an optional method part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncName {
    pub path: Vec<String>,
    pub method: Option<String>,
}

impl FuncName {
    /// Dotted display form, such as `a.b:m`.
    pub fn display(&self) -> String {
        let mut s = self.path.join(".");
        if let Some(m) = &self.method {
            s.push(':');
            s.push_str(m);
        }
        s
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionBody {
    pub params: Vec<String>,
    pub is_vararg: bool,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    /// Whether the expression can produce several values when it appears
    /// last in a list.
    pub fn is_multi(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Call { .. } | ExprKind::MethodCall { .. } | ExprKind::Vararg
        )
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, ExprKind::Call { .. } | ExprKind::MethodCall { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Nil,
    True,
    False,
    Integer(i64),
    Float(OrderedFloat),
    Str(String),
    /// `...`
    Vararg,
    Name(String),
    /// `object[key]`, and `object.name` with a string key.
    Index { object: Box<Expr>, key: Box<Expr> },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    /// `object:method(args)`
    MethodCall {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    Function(FunctionBody),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary { op: UnOp, operand: Box<Expr> },
    Table(Vec<TableField>),
    /// A parenthesized expression; truncates multiple results to one.
    Paren(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableField {
    /// `{ e }`
    Positional(Expr),
    /// `{ name = e }`
    Named(String, Expr),
    /// `{ [k] = e }`
    Keyed(Expr, Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
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
    Gt,
    Ge,
    And,
    Or,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
    Len,
    BNot,
}

/// Terse constructors for hand-built trees. All nodes get line 1; use
/// [`Stmt::at`] or [`Expr::at`] to place one on another line.
pub mod build {
    use super::*;

    impl Stmt {
        pub fn at(mut self, line: u32) -> Self {
            self.span = Span::line(line);
            self
        }
    }

    impl Expr {
        pub fn at(mut self, line: u32) -> Self {
            self.span = Span::line(line);
            self
        }
    }

    fn e(kind: ExprKind) -> Expr {
        Expr {
            kind,
            span: Span::line(1),
        }
    }

    fn s(kind: StmtKind) -> Stmt {
        Stmt {
            kind,
            span: Span::line(1),
        }
    }

    fn names(ns: &[&str]) -> Vec<String> {
        ns.iter().map(|n| n.to_string()).collect()
    }

    pub fn chunk(stmts: Vec<Stmt>) -> Chunk {
        Chunk {
            block: Block { stmts },
            span: Span::line(1),
        }
    }

    pub fn block(stmts: Vec<Stmt>) -> Block {
        Block { stmts }
    }

    // --- expressions ---

    pub fn nil() -> Expr {
        e(ExprKind::Nil)
    }

    pub fn boolean(b: bool) -> Expr {
        e(if b { ExprKind::True } else { ExprKind::False })
    }

    pub fn int(i: i64) -> Expr {
        e(ExprKind::Integer(i))
    }

    pub fn float(f: f64) -> Expr {
        e(ExprKind::Float(OrderedFloat(f)))
    }

    pub fn string(text: &str) -> Expr {
        e(ExprKind::Str(text.to_string()))
    }

    pub fn vararg() -> Expr {
        e(ExprKind::Vararg)
    }

    pub fn name(n: &str) -> Expr {
        e(ExprKind::Name(n.to_string()))
    }

    pub fn index(object: Expr, key: Expr) -> Expr {
        e(ExprKind::Index {
            object: Box::new(object),
            key: Box::new(key),
        })
    }

    /// `object.field`
    pub fn field(object: Expr, field: &str) -> Expr {
        index(object, string(field))
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
        e(ExprKind::Call {
            callee: Box::new(callee),
            args,
        })
    }

    pub fn method(object: Expr, method: &str, args: Vec<Expr>) -> Expr {
        e(ExprKind::MethodCall {
            object: Box::new(object),
            method: method.to_string(),
            args,
        })
    }

    pub fn func(params: &[&str], body: Vec<Stmt>) -> Expr {
        e(ExprKind::Function(function_body(params, false, body)))
    }

    pub fn vararg_func(params: &[&str], body: Vec<Stmt>) -> Expr {
        e(ExprKind::Function(function_body(params, true, body)))
    }

    pub fn function_body(params: &[&str], is_vararg: bool, body: Vec<Stmt>) -> FunctionBody {
        FunctionBody {
            params: names(params),
            is_vararg,
            body: Block { stmts: body },
            span: Span::line(1),
        }
    }

    pub fn bin(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        e(ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn add(lhs: Expr, rhs: Expr) -> Expr {
        bin(BinOp::Add, lhs, rhs)
    }

    pub fn sub(lhs: Expr, rhs: Expr) -> Expr {
        bin(BinOp::Sub, lhs, rhs)
    }

    pub fn mul(lhs: Expr, rhs: Expr) -> Expr {
        bin(BinOp::Mul, lhs, rhs)
    }

    pub fn concat(lhs: Expr, rhs: Expr) -> Expr {
        bin(BinOp::Concat, lhs, rhs)
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
        bin(BinOp::Eq, lhs, rhs)
    }

    pub fn lt(lhs: Expr, rhs: Expr) -> Expr {
        bin(BinOp::Lt, lhs, rhs)
    }

    pub fn le(lhs: Expr, rhs: Expr) -> Expr {
        bin(BinOp::Le, lhs, rhs)
    }

    pub fn gt(lhs: Expr, rhs: Expr) -> Expr {
        bin(BinOp::Gt, lhs, rhs)
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Expr {
        bin(BinOp::And, lhs, rhs)
    }

    pub fn or(lhs: Expr, rhs: Expr) -> Expr {
        bin(BinOp::Or, lhs, rhs)
    }

    pub fn un(op: UnOp, operand: Expr) -> Expr {
        e(ExprKind::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    pub fn not(operand: Expr) -> Expr {
        un(UnOp::Not, operand)
    }

    pub fn len(operand: Expr) -> Expr {
        un(UnOp::Len, operand)
    }

    pub fn table(fields: Vec<TableField>) -> Expr {
        e(ExprKind::Table(fields))
    }

    /// `{ e1, e2, ... }`
    pub fn list(items: Vec<Expr>) -> Expr {
        table(items.into_iter().map(TableField::Positional).collect())
    }

    pub fn paren(inner: Expr) -> Expr {
        e(ExprKind::Paren(Box::new(inner)))
    }

    // --- statements ---

    pub fn local(ns: &[&str], values: Vec<Expr>) -> Stmt {
        s(StmtKind::Local {
            names: names(ns),
            values,
        })
    }

    pub fn assign(targets: Vec<Expr>, values: Vec<Expr>) -> Stmt {
        s(StmtKind::Assign { targets, values })
    }

    /// `name = value`
    pub fn set(n: &str, value: Expr) -> Stmt {
        assign(vec![name(n)], vec![value])
    }

    pub fn call_stmt(callee: Expr, args: Vec<Expr>) -> Stmt {
        s(StmtKind::Call(call(callee, args)))
    }

    pub fn expr_stmt(expr: Expr) -> Stmt {
        s(StmtKind::Call(expr))
    }

    pub fn do_block(body: Vec<Stmt>) -> Stmt {
        s(StmtKind::Do(Block { stmts: body }))
    }

    pub fn while_loop(cond: Expr, body: Vec<Stmt>) -> Stmt {
        s(StmtKind::While {
            cond,
            body: Block { stmts: body },
        })
    }

    pub fn repeat(body: Vec<Stmt>, cond: Expr) -> Stmt {
        s(StmtKind::Repeat {
            body: Block { stmts: body },
            cond,
        })
    }

    pub fn if_then(cond: Expr, then: Vec<Stmt>) -> Stmt {
        if_else(vec![(cond, then)], None)
    }

    pub fn if_else(branches: Vec<(Expr, Vec<Stmt>)>, else_block: Option<Vec<Stmt>>) -> Stmt {
        s(StmtKind::If {
            branches: branches
                .into_iter()
                .map(|(c, b)| (c, Block { stmts: b }))
                .collect(),
            else_block: else_block.map(|b| Block { stmts: b }),
        })
    }

    pub fn numeric_for(
        var: &str,
        start: Expr,
        limit: Expr,
        step: Option<Expr>,
        body: Vec<Stmt>,
    ) -> Stmt {
        s(StmtKind::NumericFor {
            var: var.to_string(),
            start,
            limit,
            step,
            body: Block { stmts: body },
        })
    }

    pub fn generic_for(ns: &[&str], exprs: Vec<Expr>, body: Vec<Stmt>) -> Stmt {
        s(StmtKind::GenericFor {
            names: names(ns),
            exprs,
            body: Block { stmts: body },
        })
    }

    /// `function a.b.c(params) body end`
    pub fn function(path: &[&str], params: &[&str], body: Vec<Stmt>) -> Stmt {
        s(StmtKind::Function {
            name: FuncName {
                path: names(path),
                method: None,
            },
            body: function_body(params, false, body),
        })
    }

    /// `function a.b:m(params) body end`
    pub fn method_function(path: &[&str], method: &str, params: &[&str], body: Vec<Stmt>) -> Stmt {
        s(StmtKind::Function {
            name: FuncName {
                path: names(path),
                method: Some(method.to_string()),
            },
            body: function_body(params, false, body),
        })
    }

    pub fn local_function(n: &str, params: &[&str], body: Vec<Stmt>) -> Stmt {
        s(StmtKind::LocalFunction {
            name: n.to_string(),
            body: function_body(params, false, body),
        })
    }

    pub fn ret(values: Vec<Expr>) -> Stmt {
        s(StmtKind::Return(values))
    }

    pub fn brk() -> Stmt {
        s(StmtKind::Break)
    }
}
