//! # Tidal Runtime Library
//!
//! The Tidal runtime provides:
//!
//! - **Values**: Lua values, tables and Lua 5.3 operators
//! - **Calling Convention**: the invoke/resume protocol every callable obeys
//! - **Frames**: the interpreter for compiled frame programs
//! - **Driver**: stepping and blocking entry points for embedders
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        TIDAL RUNTIME                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐          │
//! │  │    Driver    │  │   Dispatch   │  │   Closures   │          │
//! │  │ (driver.rs)  │─►│(dispatch.rs) │─►│ (closure.rs) │          │
//! │  └──────────────┘  └──────────────┘  └──────────────┘          │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           ▼                                     │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐          │
//! │  │   Context    │  │  Functions   │  │    State     │          │
//! │  │ (context.rs) │  │(function.rs) │  │  (state.rs)  │          │
//! │  └──────────────┘  └──────────────┘  └──────────────┘          │
//! │                                                                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Suspension is an ordinary return value ([`Outcome::Suspend`]); no host
//! stack is kept alive while a call is suspended.

#![warn(rust_2018_idioms)]

pub mod arith;
pub mod closure;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod function;
pub mod log;
pub mod pending;
pub mod proto;
pub mod state;
pub mod table;
pub mod value;

pub use closure::LuaClosure;
pub use config::{ConfigError, LogLevel, RuntimeConfig, RuntimeConfigBuilder};
pub use context::{ExecutionContext, SchedulingPolicy, SharedBuffer};
pub use driver::{CallDriver, Continuation, Executor, Poll};
pub use error::{CallError, LuaError, ProtocolViolation};
pub use function::{
    native, CallResult, Condition, FunctionRef, LuaFunction, NativeFunction, Outcome, Suspender,
    Suspension,
};
pub use pending::{Completer, PendingOperation};
pub use proto::{LoadedChunk, Proto};
pub use state::{CallableId, ResumeState, StateId};
pub use table::TableRef;
pub use value::Value;

/// Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Global runtime configuration.
static RUNTIME_CONFIG: std::sync::OnceLock<RuntimeConfig> = std::sync::OnceLock::new();

/// Initialize the runtime with `config`.
///
/// Validates the configuration, stores it for contexts created with
/// [`ExecutionContext::new`], and installs the log subscriber. Only the
/// first successful call stores its configuration.
pub fn init_with_runtime_config(config: RuntimeConfig) -> Result<(), ConfigError> {
    config.validate()?;
    log::init(&config.log);
    let _ = RUNTIME_CONFIG.set(config);
    Ok(())
}

/// Initialize the runtime from `TIDAL_*` environment variables.
///
/// See [`RuntimeConfig::from_env`] for the full list of supported variables.
pub fn init_from_env() -> Result<(), ConfigError> {
    init_with_runtime_config(RuntimeConfig::from_env())
}

/// Get the current runtime configuration.
///
/// Returns `None` if the runtime was not initialized.
pub fn runtime_config() -> Option<&'static RuntimeConfig> {
    RUNTIME_CONFIG.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_rejected() {
        let config = RuntimeConfig::builder().max_call_depth(0).build_unchecked();
        assert!(init_with_runtime_config(config).is_err());
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
