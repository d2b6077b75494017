//! Concilium UTXO execution core.
//!
//! This crate is the transaction-execution and state-transition core of a
//! UTXO ledger governed by witness groups (concilia). It validates
//! spendability against the unspent-output set, applies effects to a
//! copy-on-write patch, and runs contract code in a deterministic, metered
//! sandbox.
//!
//! # Key Rules
//!
//! 1. **Inputs must exist**: every referenced output is found patch-first,
//!    then in the caller-staged snapshot
//! 2. **No double spend**: an output spends once; tombstones are monotonic
//!    within a patch
//! 3. **Claims prove ownership**: the key recovered from a claim proof must
//!    derive the output's receiver address
//! 4. **Contract failures are receipts**: sandbox errors never escape; the
//!    contract's prior state survives and the floor fee is charged
//!
//! The peer-to-peer transport, witness voting, block storage, RPC surface
//! and wallet live elsewhere; this crate only consumes their facades.

pub mod coins;
pub mod constants;
pub mod contract;
pub mod error;
pub mod patch;
pub mod processor;
pub mod receipt;
pub mod storage;
pub mod transaction;
pub mod utxo;

pub use coins::Coins;
pub use contract::Contract;
pub use error::{LedgerError, LedgerResult};
pub use patch::Patch;
pub use processor::{ContractEnv, ProcessorConfig, TxProcessor};
pub use receipt::{Receipt, TxStatus};
pub use storage::{MemoryStorage, Storage, UtxoSnapshot};
pub use transaction::{Transaction, TxInput, TxPayload};
pub use utxo::Utxo;
