//! # AST Lowering
//!
//! Turns a [`Chunk`] into IR functions: the main chunk first, then every
//! nested function in pre-order of its definition.
//!
//! ## Conventions
//!
//! | Lua construct | IR |
//! |---------------|----|
//! | local `x` | a variable; `VarInit` at declaration, `VarLoad`/`VarStore` on use |
//! | parameter `i` | `LoadArg(i)` stored into a variable in the entry block |
//! | global `g` | `_ENV["g"]`, with `_ENV` resolved like any other name |
//! | outer local | an upvalue, captured by the enclosing `Closure` instruction |
//! | `f(...)` in the last position | a `Multi` slot spread into the consumer |
//! | `a and b`, `a or b` | branches through a hidden variable |
//! | `return f(x)` | a `TailCall` terminator |
//!
//! The main chunk is vararg and has exactly one upvalue, `_ENV`.

mod expr;
mod scope;
mod stmt;

use tracing::debug;

use crate::ast::{Chunk, FunctionBody};
use crate::error::{CompileError, CompileErrorKind};
use crate::ir::{
    BlockId, Capture, FunctionBuilder, FunctionId, InstrKind, IrFunction, Slot, Terminator,
};
use crate::span::Span;

use scope::Scopes;

/// Per-function lowering state.
struct FunctionState {
    builder: FunctionBuilder,
    scopes: Scopes,
    /// Source of each upvalue in the enclosing function, by upvalue index.
    captures: Vec<Capture>,
    /// Exit blocks of the enclosing loops, innermost last.
    loops: Vec<BlockId>,
}

impl FunctionState {
    fn new(builder: FunctionBuilder) -> Self {
        Self {
            builder,
            scopes: Scopes::default(),
            captures: Vec::new(),
            loops: Vec::new(),
        }
    }
}

pub(crate) struct Lowerer<'a> {
    chunk_name: &'a str,
    /// Functions being lowered, outermost first. Never empty while lowering.
    stack: Vec<FunctionState>,
    finished: Vec<Option<IrFunction>>,
}

/// Lower a chunk into its functions, in module order.
pub fn lower_chunk(chunk: &Chunk, chunk_name: &str) -> Result<Vec<IrFunction>, CompileError> {
    let mut main = FunctionBuilder::new(FunctionId::MAIN, "main chunk", Vec::new(), true);
    main.set_line(chunk.span.start_line);
    main.add_upvalue("_ENV");

    let mut lowerer = Lowerer {
        chunk_name,
        stack: vec![FunctionState::new(main)],
        finished: vec![None],
    };
    lowerer.block(&chunk.block)?;
    let (main, _) = lowerer.leave_function(chunk.span)?;
    lowerer.finished[0] = Some(main);

    let functions: Vec<IrFunction> = lowerer.finished.into_iter().flatten().collect();
    debug!(chunk = chunk_name, functions = functions.len(), "lowered chunk");
    Ok(functions)
}

impl Lowerer<'_> {
    // --- state access ---

    fn fs(&mut self) -> &mut FunctionState {
        let top = self.stack.len() - 1;
        &mut self.stack[top]
    }

    fn b(&mut self) -> &mut FunctionBuilder {
        &mut self.fs().builder
    }

    fn error(&self, kind: CompileErrorKind, span: Span) -> CompileError {
        CompileError::new(kind, span, self.chunk_name)
    }

    fn set_line(&mut self, span: Span) {
        self.b().set_line(span.start_line);
    }

    fn value(&mut self, kind: InstrKind) -> Slot {
        self.b().value(kind)
    }

    fn effect(&mut self, kind: InstrKind) {
        self.b().effect(kind)
    }

    fn terminate(&mut self, terminator: Terminator) {
        self.b().terminate(terminator)
    }

    /// Jump to `target` unless the current block already ended.
    fn jump_if_open(&mut self, target: BlockId) {
        if !self.b().is_terminated() {
            self.terminate(Terminator::Jump(target));
        }
    }

    // --- functions ---

    /// Close the innermost function: add the implicit `return`, finish it
    /// and hand back its capture list.
    fn leave_function(&mut self, span: Span) -> Result<(IrFunction, Vec<Capture>), CompileError> {
        if !self.b().is_terminated() {
            self.terminate(Terminator::Return {
                values: Vec::new(),
                spread: None,
            });
        }
        let top = self.stack.len() - 1;
        let state = self.stack.remove(top);
        let func = state
            .builder
            .finish()
            .map_err(|e| self.error(e.into(), span))?;
        debug!(
            function = %func.name(),
            blocks = func.blocks().len(),
            slots = func.slots().len(),
            "lowered function"
        );
        Ok((func, state.captures))
    }

    /// Lower a nested function and emit the closure that instantiates it.
    fn function(
        &mut self,
        body: &FunctionBody,
        name: String,
        is_method: bool,
    ) -> Result<Slot, CompileError> {
        let id = FunctionId(self.finished.len() as u32);
        self.finished.push(None);

        let mut params = Vec::with_capacity(body.params.len() + 1);
        if is_method {
            params.push("self".to_string());
        }
        params.extend(body.params.iter().cloned());

        let mut builder = FunctionBuilder::new(id, name, params.clone(), body.is_vararg);
        builder.set_line(body.span.start_line);
        self.stack.push(FunctionState::new(builder));
        self.fs().scopes.push();
        for (i, param) in params.iter().enumerate() {
            let var = self.b().new_var(param.as_str());
            let arg = self.value(InstrKind::LoadArg(i as u32));
            self.effect(InstrKind::VarInit { var, value: arg });
            self.fs().scopes.declare(param, var);
        }
        self.block(&body.body)?;
        let (func, captures) = self.leave_function(body.span)?;
        self.finished[id.index()] = Some(func);

        self.set_line(body.span);
        Ok(self.value(InstrKind::Closure {
            function: id,
            captures,
        }))
    }

    fn anonymous_name(&self, span: Span) -> String {
        format!("function <{}:{}>", self.chunk_name, span.start_line)
    }
}
