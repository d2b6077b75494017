//! Deterministic execution host for contract code.
//!
//! This crate provides the sandbox the ledger runs contract code in.
//!
//! # Key Rules
//!
//! 1. **Deterministic**: identical (source, environment, arguments, limits)
//!    yield identical state snapshots and identical errors
//! 2. **Metered**: every evaluation step costs fuel; allocation is counted
//!    against a heap cap; a wall-clock timeout backstops host teardown
//! 3. **Isolated**: no I/O, no network, no filesystem, no clock and no
//!    randomness are reachable from contract code — only the bindings the
//!    host explicitly injects
//!
//! The language is a fixed subset: classes extending a distinguished `Base`,
//! integer arithmetic, strings, lists, records, and a distinguished `exports`
//! slot the host reads after execution.

mod ast;
mod interp;
mod parser;
mod token;

pub mod error;
pub mod host;
pub mod limits;
pub mod value;

pub use error::{SandboxError, SandboxResult};
pub use host::{
    is_valid_method_name, parse_invocation, DeployOutcome, InvokeOutcome, MethodSource, Sandbox,
    PREDEFINED_CLASSES,
};
pub use limits::Limits;
pub use value::{DataRecord, DataValue};
