//! Execution limits.
//!
//! Fuel is the deterministic primary meter: every evaluation step costs one
//! unit, so identical inputs exhaust at the identical step. The wall-clock
//! timeout is the host's teardown backstop and the heap cap bounds allocated
//! cells.

use std::time::Duration;

/// Resource bounds for one sandbox execution
#[derive(Debug, Clone)]
pub struct Limits {
    /// Evaluation steps available to the execution
    pub fuel: u64,
    /// Maximum number of allocated value cells
    pub max_heap_cells: usize,
    /// Hard wall-clock bound; checked every 256 steps
    pub timeout: Duration,
}

impl Limits {
    /// Create explicit limits
    pub fn new(fuel: u64, max_heap_cells: usize, timeout: Duration) -> Self {
        Self {
            fuel,
            max_heap_cells,
            timeout,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            fuel: 1_000_000,
            max_heap_cells: 64 * 1024,
            timeout: Duration::from_millis(250),
        }
    }
}
