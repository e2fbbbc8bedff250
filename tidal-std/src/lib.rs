//! # Tidal Standard Library
//!
//! A subset of the Lua 5.3 standard library written as native callables
//! against the resumable calling convention.
//!
//! ## Libraries
//!
//! | Library | Installed as | Functions |
//! |---------|--------------|-----------|
//! | [`base`] | globals | `print`, `type`, `tostring`, `tonumber`, `select`, `error`, `assert`, `ipairs`, `pairs`, `next`, `raw*` |
//! | [`table`] | `table` | `insert`, `move`, `remove`, `sort`, `concat`, `pack`, `unpack` |
//! | [`os`] | `os` | `clock`, `time`, `difftime`, `getenv` |
//! | [`io`] | `io` | `write` |
//!
//! Output from `print` and `io.write` goes through the executing context's
//! [`LibState`](tidal_runtime::context::LibState), so embedders can capture
//! it with [`ExecutionContext::with_output`](tidal_runtime::ExecutionContext::with_output).
//!
//! ```rust
//! use tidal_std::StandardLibrary;
//!
//! let env = StandardLibrary::new().env();
//! assert!(env.get_str("print").as_function().is_some());
//! assert!(env.get_str("table").as_table().is_some());
//! ```

#![warn(rust_2018_idioms)]

pub mod args;
pub mod base;
pub mod io;
pub mod os;
pub mod sort;
pub mod table;

use tidal_runtime::TableRef;
use tracing::debug;

/// One installable library.
pub trait Lib: Send + Sync {
    /// The library's name, as used in diagnostics.
    fn name(&self) -> &'static str;

    /// Register the library's functions into `env`.
    fn install(&self, env: &TableRef);
}

/// The full set of libraries shipped with Tidal.
pub struct StandardLibrary {
    libs: Vec<Box<dyn Lib>>,
}

impl Default for StandardLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardLibrary {
    pub fn new() -> Self {
        Self {
            libs: vec![
                Box::new(base::BaseLib),
                Box::new(table::TableLib),
                Box::new(os::OsLib),
                Box::new(io::IoLib),
            ],
        }
    }

    /// Only the given libraries.
    pub fn with_libs(libs: Vec<Box<dyn Lib>>) -> Self {
        Self { libs }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.libs.iter().map(|lib| lib.name()).collect()
    }

    /// Install every library into `env`.
    pub fn install(&self, env: &TableRef) {
        for lib in &self.libs {
            debug!(lib = lib.name(), "installing library");
            lib.install(env);
        }
    }

    /// A fresh environment table with every library installed.
    pub fn env(&self) -> TableRef {
        let env = TableRef::new();
        self.install(&env);
        env
    }
}

/// Create a library table named `name` in `env` and return it.
pub(crate) fn library_table(env: &TableRef, name: &str) -> TableRef {
    let table = TableRef::new();
    env.set_str(name, table.clone().into());
    table
}
