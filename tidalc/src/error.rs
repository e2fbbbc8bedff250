//! Compile errors.
//!
//! User-facing faults in the syntax tree carry the span of the offending
//! node. Faults in the compiler itself (malformed IR, backend contract
//! breaches) wrap the underlying error and carry no useful span.

use thiserror::Error;

use crate::codegen::CodegenError;
use crate::ir::IrError;
use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileErrorKind {
    #[error("break outside a loop")]
    BreakOutsideLoop,

    #[error("cannot use '...' outside a vararg function")]
    VarargOutsideVararg,

    #[error("cannot assign to this expression")]
    InvalidAssignmentTarget,

    #[error("syntax error: only calls can be used as statements")]
    NotAStatement,

    #[error("internal compiler error: {0}")]
    Internal(#[from] IrError),

    #[error("code generation failed: {0}")]
    Codegen(#[from] CodegenError),
}

/// A compile error, located in a named chunk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{chunk}:{}: {kind}", .span.start_line)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub span: Span,
    pub chunk: String,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, span: Span, chunk: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            chunk: chunk.into(),
        }
    }

    /// Whether the error is a compiler fault rather than a fault in the
    /// input.
    pub fn is_internal(&self) -> bool {
        matches!(
            self.kind,
            CompileErrorKind::Internal(_) | CompileErrorKind::Codegen(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_location() {
        let err = CompileError::new(CompileErrorKind::BreakOutsideLoop, Span::line(4), "main");
        assert_eq!(err.to_string(), "main:4: break outside a loop");
        assert!(!err.is_internal());
    }

    #[test]
    fn test_internal_errors() {
        let err = CompileError::new(IrError::NullFunction.into(), Span::dummy(), "main");
        assert!(err.is_internal());
        assert_eq!(
            err.to_string(),
            "main:0: internal compiler error: cannot add an absent function to a module"
        );
    }
}
