//! Runtime Configuration
//!
//! Configuration for call execution and logging. It can be set
//! programmatically or loaded from environment variables.
//!
//! # Environment Variables
//!
//! All environment variables use the `TIDAL_` prefix:
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `TIDAL_MAX_CALL_DEPTH` | Maximum number of active Lua frames | 200 |
//! | `TIDAL_PAUSE_EVERY` | Pause compiled code every N calls (0 = never) | 0 |
//! | `TIDAL_LOG_LEVEL` | Log level (off/error/warn/info/debug/trace) | warn |
//! | `TIDAL_LOG_TIMESTAMPS` | Include timestamps in log output ("true"/"false") | true |
//!
//! # Example
//!
//! ```rust,ignore
//! use tidal_runtime::config::RuntimeConfig;
//!
//! // Load from environment with defaults
//! let config = RuntimeConfig::from_env();
//!
//! // Or use the builder pattern
//! let config = RuntimeConfig::builder()
//!     .max_call_depth(64)
//!     .pause_every_calls(Some(1000))
//!     .build()?;
//! ```

use std::env;

use thiserror::Error;

/// Log level for runtime logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// No logging.
    Off,
    /// Error messages only.
    Error,
    /// Warnings and errors (default).
    #[default]
    Warn,
    /// Informational messages.
    Info,
    /// Debug messages.
    Debug,
    /// Trace-level messages.
    Trace,
}

impl LogLevel {
    /// Parse a log level from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "none" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    /// Convert to a string representation, as accepted by `EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Call execution configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallConfig {
    /// Maximum number of active Lua frames before `stack overflow`.
    /// Default: 200.
    pub max_call_depth: usize,

    /// Pause compiled code once every this many call boundaries.
    /// Default: None (never pause).
    pub pause_every_calls: Option<u64>,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 200,
            pause_every_calls: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Log level used when `RUST_LOG` is not set.
    /// Default: Warn.
    pub level: LogLevel,

    /// Include timestamps in log output.
    /// Default: true.
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            timestamps: true,
        }
    }
}

/// Complete runtime configuration.
///
/// Use `RuntimeConfig::default()` for sensible defaults, or
/// `RuntimeConfig::from_env()` to load from environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Call execution configuration.
    pub call: CallConfig,

    /// Logging configuration.
    pub log: LogConfig,
}

impl RuntimeConfig {
    /// Create a new builder for RuntimeConfig.
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// Variables that are unset or unparsable keep their default values.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(val) = parse_env_usize("TIDAL_MAX_CALL_DEPTH") {
            if val > 0 {
                config.call.max_call_depth = val;
            }
        }

        if let Some(val) = parse_env_usize("TIDAL_PAUSE_EVERY") {
            config.call.pause_every_calls = if val > 0 { Some(val as u64) } else { None };
        }

        if let Ok(val) = env::var("TIDAL_LOG_LEVEL") {
            if let Some(level) = LogLevel::parse(&val) {
                config.log.level = level;
            }
        }

        if let Some(val) = parse_env_bool("TIDAL_LOG_TIMESTAMPS") {
            config.log.timestamps = val;
        }

        config
    }

    /// Validate the configuration and return any errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.call.max_call_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "call.max_call_depth".into(),
                message: "must be at least 1".into(),
            });
        }

        if self.call.pause_every_calls == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "call.pause_every_calls".into(),
                message: "must be at least 1, or None to disable pausing".into(),
            });
        }

        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Invalid configuration value.
    #[error("invalid configuration for '{field}': {message}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Error message.
        message: String,
    },
}

/// Builder for RuntimeConfig.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum call depth.
    pub fn max_call_depth(mut self, depth: usize) -> Self {
        self.config.call.max_call_depth = depth;
        self
    }

    /// Pause every `n` calls, or never with `None`.
    pub fn pause_every_calls(mut self, n: Option<u64>) -> Self {
        self.config.call.pause_every_calls = n;
        self
    }

    /// Set the log level.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log.level = level;
        self
    }

    /// Enable or disable log timestamps.
    pub fn log_timestamps(mut self, enabled: bool) -> Self {
        self.config.log.timestamps = enabled;
        self
    }

    /// Build the configuration.
    ///
    /// This validates the configuration and returns an error if invalid.
    pub fn build(self) -> Result<RuntimeConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Build the configuration without validation.
    pub fn build_unchecked(self) -> RuntimeConfig {
        self.config
    }
}

/// Parse an environment variable as usize.
fn parse_env_usize(name: &str) -> Option<usize> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Parse an environment variable as bool.
fn parse_env_bool(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .and_then(|s| match s.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        })
}
