//! Storage facade.
//!
//! The core never reads storage mid-processing: the block-level caller
//! stages a read-only UTXO snapshot up front, hands it in, and commits the
//! resulting patch back through `apply_patch`. Implementations provide
//! atomicity; the in-memory store here backs tests and single-process use.

use std::collections::HashMap;

use lib_types::{Address, TxHash};

use crate::contract::Contract;
use crate::error::LedgerResult;
use crate::patch::Patch;
use crate::receipt::Receipt;
use crate::utxo::Utxo;

/// Read-only snapshot staged by the caller for one block's processing
pub type UtxoSnapshot = HashMap<TxHash, Utxo>;

/// The persistence seam the ledger core writes through
pub trait Storage {
    /// Stage a snapshot of the requested UTXOs. Unknown hashes are absent
    /// from the result.
    fn get_utxos_snapshot(&self, hashes: &[TxHash]) -> UtxoSnapshot;

    /// A persisted contract, if one exists at the address
    fn get_contract(&self, address: &Address) -> Option<Contract>;

    /// Fold a block's patch into persistent state
    fn apply_patch(&mut self, patch: Patch) -> LedgerResult<()>;
}

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct MemoryStorage {
    utxos: HashMap<TxHash, Utxo>,
    contracts: HashMap<Address, Contract>,
    receipts: Vec<(TxHash, Receipt)>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a UTXO directly, bypassing transaction processing
    pub fn seed_utxo(&mut self, utxo: Utxo) {
        self.utxos.insert(utxo.tx_hash(), utxo);
    }

    pub fn get_utxo(&self, tx_hash: &TxHash) -> Option<&Utxo> {
        self.utxos.get(tx_hash)
    }

    pub fn get_receipt(&self, tx_hash: &TxHash) -> Option<&Receipt> {
        self.receipts
            .iter()
            .find(|(hash, _)| hash == tx_hash)
            .map(|(_, receipt)| receipt)
    }
}

impl Storage for MemoryStorage {
    fn get_utxos_snapshot(&self, hashes: &[TxHash]) -> UtxoSnapshot {
        hashes
            .iter()
            .filter_map(|hash| self.utxos.get(hash).map(|utxo| (*hash, utxo.clone())))
            .collect()
    }

    fn get_contract(&self, address: &Address) -> Option<Contract> {
        self.contracts.get(address).cloned()
    }

    fn apply_patch(&mut self, patch: Patch) -> LedgerResult<()> {
        for (tx_hash, utxo) in patch.utxos() {
            if utxo.is_empty() {
                self.utxos.remove(tx_hash);
            } else {
                self.utxos.insert(*tx_hash, utxo.clone());
            }
        }
        for contract in patch.contracts() {
            self.contracts.insert(contract.address(), contract.clone());
        }
        for (tx_hash, receipt) in patch.receipts() {
            self.receipts.push((*tx_hash, receipt.clone()));
        }
        Ok(())
    }
}
