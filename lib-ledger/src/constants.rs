//! Exported ledger constants.

use std::time::Duration;

use lib_types::Amount;

pub use lib_types::ADDRESS_PREFIX;

/// Floor fee charged whenever the sandbox is entered, success or failure
pub const MIN_CONTRACT_FEE: Amount = 1_000;

/// Wall-clock bound on one contract execution
pub const TIMEOUT_CODE: Duration = Duration::from_millis(250);

/// Joins persisted method sources inside a contract's stored code.
/// U+001F cannot appear in tokenized contract source, so its presence in
/// user code is rejected at deploy time.
pub const CONTRACT_METHOD_SEPARATOR: &str = "\u{1f}";

/// Evaluation steps purchased per coin of execution budget
pub const FUEL_PER_COIN: u64 = 100;

/// Allocation cap for one contract execution, in value cells
pub const MAX_HEAP_CELLS: usize = 64 * 1024;

/// Numeric receipt status: transaction applied
pub const TX_STATUS_OK: u8 = 1;

/// Numeric receipt status: transaction failed
pub const TX_STATUS_FAILED: u8 = 0;
