//! # Module Assembly
//!
//! A [`Module`] is the sealed output of one compilation run: the main chunk
//! at [`FunctionId::MAIN`] followed by every nested function in pre-order.
//! A function's position is its id, which is how `Closure` instructions
//! name their targets.
//!
//! ```text
//! ModuleBuilder ──add(f)──► [f0, f1, f2] ──build()──► Module (snapshot)
//!                                │
//!                                └──add(f3)──► [f0, f1, f2, f3]   (snapshot unchanged)
//! ```
//!
//! Functions are held as `Arc<IrFunction>`, so a snapshot shares immutable
//! functions with its builder and nothing mutable.

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use super::error::IrError;
use super::function::IrFunction;
use super::types::FunctionId;

/// Accumulates finished functions in order.
#[derive(Debug, Clone, Default)]
pub struct ModuleBuilder {
    functions: Vec<Arc<IrFunction>>,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a function. Fails with [`IrError::NullFunction`] when given
    /// `None`.
    pub fn add(&mut self, function: impl Into<Option<IrFunction>>) -> Result<&mut Self, IrError> {
        let function = function.into().ok_or(IrError::NullFunction)?;
        self.functions.push(Arc::new(function));
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// A module holding the functions added so far. The builder stays
    /// usable; later additions do not reach the returned module.
    pub fn build(&self) -> Module {
        Module {
            functions: Arc::from(self.functions.clone()),
        }
    }

    /// Seal the builder into a module.
    pub fn finish(self) -> Module {
        Module {
            functions: Arc::from(self.functions),
        }
    }
}

/// An immutable, ordered sequence of IR functions.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    functions: Arc<[Arc<IrFunction>]>,
}

impl Module {
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn get(&self, id: FunctionId) -> Option<&IrFunction> {
        self.functions.get(id.index()).map(|f| &**f)
    }

    /// The main chunk, if the module is not empty.
    pub fn main(&self) -> Option<&IrFunction> {
        self.get(FunctionId::MAIN)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IrFunction> {
        self.functions.iter().map(|f| &**f)
    }

    /// Pretty-printed JSON dump of every function.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Serialize for Module {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'a> IntoIterator for &'a Module {
    type Item = &'a IrFunction;
    type IntoIter = Box<dyn Iterator<Item = &'a IrFunction> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, func) in self.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::FunctionBuilder;
    use crate::ir::types::Terminator;

    fn function(id: u32, name: &str) -> IrFunction {
        let mut b = FunctionBuilder::new(FunctionId(id), name, vec![], false);
        b.terminate(Terminator::Return {
            values: vec![],
            spread: None,
        });
        b.finish().unwrap()
    }

    fn names(m: &Module) -> Vec<&str> {
        m.iter().map(|f| f.name()).collect()
    }

    #[test]
    fn test_preserves_insertion_order() {
        let mut b = ModuleBuilder::new();
        b.add(function(0, "f1")).unwrap();
        b.add(function(1, "f2")).unwrap();
        b.add(function(2, "f3")).unwrap();
        let m = b.build();
        assert_eq!(names(&m), vec!["f1", "f2", "f3"]);
        assert_eq!(m.get(FunctionId(1)).map(|f| f.name()), Some("f2"));
        assert_eq!(m.main().map(|f| f.name()), Some("f1"));
    }

    #[test]
    fn test_null_function_rejected() {
        let mut b = ModuleBuilder::new();
        assert_eq!(b.add(None::<IrFunction>).unwrap_err(), IrError::NullFunction);
        assert!(b.is_empty());
    }

    #[test]
    fn test_snapshot_isolation() {
        let mut b = ModuleBuilder::new();
        b.add(function(0, "f1")).unwrap();
        let snapshot = b.build();
        b.add(function(1, "f2")).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(b.build().len(), 2);
        assert_eq!(names(&snapshot), vec!["f1"]);
    }

    #[test]
    fn test_empty_module() {
        let m = ModuleBuilder::new().finish();
        assert!(m.is_empty());
        assert!(m.main().is_none());
        assert_eq!(m.to_json().unwrap().trim(), "[]");
    }

    #[test]
    fn test_json_dump_names_functions() {
        let mut b = ModuleBuilder::new();
        b.add(function(0, "main")).unwrap();
        let json = b.finish().to_json().unwrap();
        assert!(json.contains("\"name\": \"main\""));
    }

    #[test]
    fn test_display_lists_functions() {
        let mut b = ModuleBuilder::new();
        b.add(function(0, "main")).unwrap();
        b.add(function(1, "helper")).unwrap();
        let text = b.finish().to_string();
        assert!(text.contains("function fn0 main()"));
        assert!(text.contains("function fn1 helper()"));
    }
}
