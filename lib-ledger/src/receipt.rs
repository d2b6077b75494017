//! Transaction receipts.

use serde::{Deserialize, Serialize};
use std::fmt;

use lib_types::{Address, Amount, TxHash};

use crate::constants::{TX_STATUS_FAILED, TX_STATUS_OK};

/// Outcome status of one transaction's execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Ok,
    Failed,
}

impl TxStatus {
    /// Numeric wire code
    pub const fn code(&self) -> u8 {
        match self {
            TxStatus::Ok => TX_STATUS_OK,
            TxStatus::Failed => TX_STATUS_FAILED,
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxStatus::Ok => write!(f, "OK"),
            TxStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Record of one transaction's execution outcome.
///
/// Whenever the sandbox was entered, `coins_used` is at least
/// `MIN_CONTRACT_FEE`, success or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    status: TxStatus,
    coins_used: Amount,
    contract_address: Option<Address>,
    internal_txns: Vec<TxHash>,
}

impl Receipt {
    pub fn new(status: TxStatus, coins_used: Amount) -> Self {
        Self {
            status,
            coins_used,
            contract_address: None,
            internal_txns: Vec::new(),
        }
    }

    /// Attach the deployed contract's address
    pub fn with_contract_address(mut self, address: Address) -> Self {
        self.contract_address = Some(address);
        self
    }

    pub fn status(&self) -> TxStatus {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        self.status == TxStatus::Ok
    }

    pub fn coins_used(&self) -> Amount {
        self.coins_used
    }

    pub fn contract_address(&self) -> Option<Address> {
        self.contract_address
    }

    /// Record a transaction emitted during contract execution
    pub fn add_internal_tx(&mut self, tx_hash: TxHash) {
        self.internal_txns.push(tx_hash);
    }

    pub fn internal_txns(&self) -> &[TxHash] {
        &self.internal_txns
    }
}
