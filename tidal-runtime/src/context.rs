//! # Execution Context
//!
//! The context is the only state a call chain shares between its frames. It
//! is passed by `&mut` down every invoke and resume, so exactly one frame
//! owns it at any instant.
//!
//! | Part | Purpose |
//! |------|---------|
//! | return buffer | Results of the last completed call, or a pending tail call |
//! | continuation slot | Value the driver supplies when resuming a suspension |
//! | library state | Default output, clock origin (never process-global) |
//! | scheduling policy | Decides whether a frame pauses before its next call |
//! | frames | Source position of each active Lua frame, bounded by `max_call_depth` |

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::{CallConfig, RuntimeConfig};
use crate::error::{LuaError, ProtocolViolation};
use crate::function::FunctionRef;
use crate::pending::PendingResult;
use crate::value::Value;

// ============================================================================
// Scheduling
// ============================================================================

/// Decides, at each call boundary in compiled code, whether to pause.
pub trait SchedulingPolicy: Send {
    /// Called once per call boundary. Returning `true` pauses the frame
    /// before it makes the call.
    fn should_pause(&mut self) -> bool;
}

/// Never pauses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverPause;

impl SchedulingPolicy for NeverPause {
    fn should_pause(&mut self) -> bool {
        false
    }
}

/// Pauses once every `every` call boundaries.
#[derive(Debug, Clone, Copy)]
pub struct CallBudget {
    every: u64,
    count: u64,
}

impl CallBudget {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            count: 0,
        }
    }
}

impl SchedulingPolicy for CallBudget {
    fn should_pause(&mut self) -> bool {
        self.count += 1;
        if self.count >= self.every {
            self.count = 0;
            true
        } else {
            false
        }
    }
}

// ============================================================================
// Library state
// ============================================================================

/// A byte buffer shared between a context and the embedder.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The buffer contents, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// Where library output goes.
#[derive(Debug, Clone, Default)]
pub enum Output {
    #[default]
    Stdout,
    Buffer(SharedBuffer),
}

impl Output {
    pub fn write_str(&self, s: &str) -> std::io::Result<()> {
        match self {
            Output::Stdout => {
                let mut out = std::io::stdout().lock();
                out.write_all(s.as_bytes())?;
                out.flush()
            }
            Output::Buffer(buf) => {
                buf.0.lock().extend_from_slice(s.as_bytes());
                Ok(())
            }
        }
    }
}

/// Per-chain state the standard library reads instead of globals.
#[derive(Debug, Clone)]
pub struct LibState {
    /// Default output handle for `print` and `io.write`.
    pub output: Output,
    /// Reference point for `os.clock`.
    pub clock_origin: Instant,
}

impl Default for LibState {
    fn default() -> Self {
        Self {
            output: Output::Stdout,
            clock_origin: Instant::now(),
        }
    }
}

// ============================================================================
// Context
// ============================================================================

enum ReturnBuffer {
    Values(Vec<Value>),
    TailCall(FunctionRef, Vec<Value>),
}

/// Source position of an active Lua frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub chunk: Arc<str>,
    /// Line of the call the frame is making, or 0 before its first call.
    pub line: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chunk, self.line)
    }
}

/// The state shared by the frames of one call chain.
pub struct ExecutionContext {
    returns: ReturnBuffer,
    continuation: Option<PendingResult>,
    lib: LibState,
    policy: Box<dyn SchedulingPolicy>,
    frames: Vec<Location>,
    max_depth: usize,
}

impl ExecutionContext {
    /// A context configured from the global runtime configuration, or
    /// defaults if the runtime was not initialized.
    pub fn new() -> Self {
        match crate::runtime_config() {
            Some(config) => Self::with_config(config),
            None => Self::with_config(&RuntimeConfig::default()),
        }
    }

    /// A context configured from `config`.
    pub fn with_config(config: &RuntimeConfig) -> Self {
        let CallConfig {
            max_call_depth,
            pause_every_calls,
        } = config.call;
        let policy: Box<dyn SchedulingPolicy> = match pause_every_calls {
            Some(n) => Box::new(CallBudget::new(n)),
            None => Box::new(NeverPause),
        };
        Self {
            returns: ReturnBuffer::Values(Vec::new()),
            continuation: None,
            lib: LibState::default(),
            policy,
            frames: Vec::new(),
            max_depth: max_call_depth,
        }
    }

    /// Replace the scheduling policy.
    pub fn with_policy(mut self, policy: impl SchedulingPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Send library output to `buffer`.
    pub fn with_output(mut self, buffer: SharedBuffer) -> Self {
        self.lib.output = Output::Buffer(buffer);
        self
    }

    // --- return buffer ---

    /// Deposit the results of a completed call.
    pub fn set_returns(&mut self, values: Vec<Value>) {
        self.returns = ReturnBuffer::Values(values);
    }

    /// Take the results of the last completed call.
    ///
    /// An unresolved tail call reads as no results.
    pub fn take_returns(&mut self) -> Vec<Value> {
        match std::mem::replace(&mut self.returns, ReturnBuffer::Values(Vec::new())) {
            ReturnBuffer::Values(values) => values,
            ReturnBuffer::TailCall(..) => Vec::new(),
        }
    }

    /// Request that the caller's dispatcher call `f` in place of returning.
    pub fn set_tail_call(&mut self, f: FunctionRef, args: Vec<Value>) {
        self.returns = ReturnBuffer::TailCall(f, args);
    }

    /// Take a pending tail call request, leaving plain results in place.
    pub fn take_tail_call(&mut self) -> Option<(FunctionRef, Vec<Value>)> {
        match std::mem::replace(&mut self.returns, ReturnBuffer::Values(Vec::new())) {
            ReturnBuffer::TailCall(f, args) => Some((f, args)),
            values => {
                self.returns = values;
                None
            }
        }
    }

    // --- continuation slot ---

    /// Supply the value a resumed suspension continues with.
    pub fn supply_continuation(&mut self, value: PendingResult) -> Result<(), ProtocolViolation> {
        if self.continuation.is_some() {
            return Err(ProtocolViolation::AlreadySupplied);
        }
        self.continuation = Some(value);
        Ok(())
    }

    /// Take the supplied continuation value.
    pub fn take_continuation(&mut self) -> Option<PendingResult> {
        self.continuation.take()
    }

    pub fn has_continuation(&self) -> bool {
        self.continuation.is_some()
    }

    pub(crate) fn discard_continuation(&mut self) {
        self.continuation = None;
    }

    // --- library state ---

    pub fn lib_state(&self) -> &LibState {
        &self.lib
    }

    pub fn lib_state_mut(&mut self) -> &mut LibState {
        &mut self.lib
    }

    // --- scheduling and depth ---

    /// Ask the scheduling policy whether to pause before the next call.
    pub fn should_pause(&mut self) -> bool {
        self.policy.should_pause()
    }

    /// Enter a frame of `chunk`.
    pub fn enter(&mut self, chunk: &Arc<str>) -> Result<(), LuaError> {
        if self.frames.len() >= self.max_depth {
            return Err(LuaError::new("stack overflow"));
        }
        self.frames.push(Location {
            chunk: chunk.clone(),
            line: 0,
        });
        Ok(())
    }

    /// Leave a frame entered with [`enter`](Self::enter).
    pub fn leave(&mut self) {
        self.frames.pop();
    }

    /// Record the line of the call the innermost frame is making.
    pub fn set_line(&mut self, line: u32) {
        if let Some(top) = self.frames.last_mut() {
            top.line = line;
        }
    }

    /// The frame `level` steps out, where level 1 is the innermost.
    pub fn location(&self, level: usize) -> Option<&Location> {
        let up = level.checked_sub(1)?;
        let index = self.frames.len().checked_sub(up + 1)?;
        self.frames.get(index)
    }

    /// Number of active frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("depth", &self.depth())
            .field("max_depth", &self.max_depth)
            .field("has_continuation", &self.continuation.is_some())
            .finish()
    }
}
