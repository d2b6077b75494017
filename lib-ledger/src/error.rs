//! Ledger errors.
//!
//! Error strings are part of the protocol surface: block-level callers and
//! tests match on them, so the exact renderings here are load-bearing.

use thiserror::Error;

use lib_crypto::CryptoError;
use lib_types::{Address, OutputIndex, TxHash};

/// Error during transaction processing or patch manipulation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    // =========================================================================
    // Input processing
    // =========================================================================

    #[error("UTXO not found for {0}")]
    UtxoNotFound(TxHash),

    /// The referenced position is not live: spent earlier, or never existed.
    /// The two are indistinguishable at read time.
    #[error("Output #{index} of Tx {tx_hash} already spent!")]
    OutputSpent { tx_hash: TxHash, index: OutputIndex },

    /// The position was tombstoned earlier in this block or transaction
    #[error("Tx {tx_hash} index {index} already deleted!")]
    OutputDeleted { tx_hash: TxHash, index: OutputIndex },

    #[error("Claim failed!")]
    ClaimFailed,

    #[error("Claim proof missing for input #{0}")]
    MissingClaim(usize),

    // =========================================================================
    // Contract processing
    // =========================================================================

    #[error("Bad definition")]
    BadDefinition,

    #[error("No contract at {0}")]
    ContractNotFound(Address),

    // =========================================================================
    // Patch structure
    // =========================================================================

    #[error("Duplicate coins at output #{index} of Tx {tx_hash}")]
    DuplicateCoins { tx_hash: TxHash, index: OutputIndex },

    #[error("Receipt collision for Tx {0}")]
    ReceiptCollision(TxHash),

    #[error("Contract state conflict at {0} during merge")]
    MergeConflict(Address),

    // =========================================================================
    // Transaction structure
    // =========================================================================

    #[error("Duplicate input: {tx_hash} #{index}")]
    DuplicateInput { tx_hash: TxHash, index: OutputIndex },

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },

    #[error("Amount overflow")]
    Overflow,

    // =========================================================================
    // External collaborators
    // =========================================================================

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
