//! Optimization passes for IR functions
//!
//! Passes run on a finished function before it enters a module.
//!
//! # Available Passes
//!
//! - **Load Propagation**: Turns variable loads with a single constant or argument origin into direct loads
//! - **Origin Deduplication**: Merges loads of the same argument or constant along dominator paths
//! - **Dead Slot Elimination**: Removes side-effect-free instructions whose slot is never read

pub mod dce;
pub mod dedup;
pub mod propagate;

use tracing::debug;

use crate::ir::validate::validate;
use crate::ir::{IrError, IrFunction};

/// Configuration for optimization passes
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptConfig {
    /// Enable load propagation pass
    pub propagate_loads: bool,
    /// Enable origin deduplication pass
    pub dedup_loads: bool,
    /// Enable dead slot elimination pass
    pub dead_slots: bool,
    /// Maximum number of iterations for the optimization loop (None = 10)
    pub max_iterations: Option<usize>,
}

impl OptConfig {
    /// Create config with all optimizations enabled
    pub fn all() -> Self {
        Self {
            propagate_loads: true,
            dedup_loads: true,
            dead_slots: true,
            max_iterations: Some(10),
        }
    }

    /// Create config with no optimizations enabled
    pub fn none() -> Self {
        Self::default()
    }

    /// Check if any optimization is enabled
    pub fn any_enabled(&self) -> bool {
        self.propagate_loads || self.dedup_loads || self.dead_slots
    }
}

/// Optimize one function according to the given configuration
///
/// Runs the passes in a loop until no more changes are made or the maximum
/// iteration count is reached, then re-validates the result.
///
/// # Pass Ordering
///
/// 1. Load propagation (exposes duplicate constant/argument loads)
/// 2. Origin deduplication (leaves the dropped loads' sources in place)
/// 3. Dead slot elimination (removes loads nothing reads any more)
pub fn optimize_function(func: &mut IrFunction, config: &OptConfig) -> Result<(), IrError> {
    if !config.any_enabled() {
        return Ok(());
    }

    let before: usize = func.blocks.iter().map(|b| b.instrs.len()).sum();
    let max_iters = config.max_iterations.unwrap_or(10);
    let mut rounds = 0;

    for _ in 0..max_iters {
        rounds += 1;
        let mut changed = false;
        if config.propagate_loads {
            changed |= propagate::propagate_loads(func);
        }
        if config.dedup_loads {
            changed |= dedup::dedup_loads(func);
        }
        if config.dead_slots {
            changed |= dce::eliminate_dead_slots(func);
        }
        if !changed {
            break;
        }
    }

    let after: usize = func.blocks.iter().map(|b| b.instrs.len()).sum();
    debug!(
        function = %func.name,
        rounds,
        before,
        after,
        "optimized function"
    );
    validate(func)
}
