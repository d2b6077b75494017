//! Sandbox errors.
//!
//! Every failure mode of contract execution is represented here. The ledger
//! converts all of these into FAILED receipts; none of them escape the
//! sandbox boundary as panics.

use thiserror::Error;

/// Error during contract compilation or execution
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SandboxError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// Contract-level validation failure: the deployed source did not leave a
    /// usable contract instance in the export slot, or persisted method
    /// sources failed re-validation.
    #[error("Bad definition")]
    BadDefinition,

    #[error("Execution fuel exhausted")]
    OutOfFuel,

    #[error("Memory limit exceeded")]
    MemoryLimit,

    #[error("Execution timed out")]
    Timeout,
}

/// Result type for sandbox operations
pub type SandboxResult<T> = Result<T, SandboxError>;
