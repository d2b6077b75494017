//! Per-transaction unspent output set.
//!
//! A `Utxo` tracks the still-unspent outputs of one transaction, indexed by
//! output position, plus a tombstone set of positions already spent.
//!
//! Invariant: a position is in `outputs` or in `spent`, never both. Once
//! tombstoned a position never becomes live again.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use lib_types::{OutputIndex, TxHash};

use crate::coins::Coins;
use crate::error::{LedgerError, LedgerResult};

/// Unspent outputs of one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utxo {
    tx_hash: TxHash,
    outputs: BTreeMap<OutputIndex, Coins>,
    spent: BTreeSet<OutputIndex>,
}

impl Utxo {
    /// Create an empty output set for a transaction
    pub fn new(tx_hash: TxHash) -> Self {
        Self {
            tx_hash,
            outputs: BTreeMap::new(),
            spent: BTreeSet::new(),
        }
    }

    /// Create a set populated with the given outputs
    pub fn with_outputs(
        tx_hash: TxHash,
        outputs: impl IntoIterator<Item = (OutputIndex, Coins)>,
    ) -> Self {
        Self {
            tx_hash,
            outputs: outputs.into_iter().collect(),
            spent: BTreeSet::new(),
        }
    }

    pub fn tx_hash(&self) -> TxHash {
        self.tx_hash
    }

    /// The coins at a live position.
    ///
    /// A missing position reads as spent: a position that never existed is
    /// indistinguishable from one whose output is gone.
    pub fn coins_at_index(&self, index: OutputIndex) -> LedgerResult<&Coins> {
        self.outputs
            .get(&index)
            .ok_or(LedgerError::OutputSpent {
                tx_hash: self.tx_hash,
                index,
            })
    }

    /// Tombstone a position, returning the coins that were there
    pub fn spend_coins(&mut self, index: OutputIndex) -> LedgerResult<Coins> {
        match self.outputs.remove(&index) {
            Some(coins) => {
                self.spent.insert(index);
                Ok(coins)
            }
            None => Err(LedgerError::OutputDeleted {
                tx_hash: self.tx_hash,
                index,
            }),
        }
    }

    /// Insert a freshly minted output. The position must be neither live nor
    /// tombstoned.
    pub fn insert_coins(&mut self, index: OutputIndex, coins: Coins) -> LedgerResult<()> {
        if self.outputs.contains_key(&index) || self.spent.contains(&index) {
            return Err(LedgerError::DuplicateCoins {
                tx_hash: self.tx_hash,
                index,
            });
        }
        self.outputs.insert(index, coins);
        Ok(())
    }

    /// True iff no live outputs remain
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn outputs(&self) -> &BTreeMap<OutputIndex, Coins> {
        &self.outputs
    }

    pub fn spent(&self) -> &BTreeSet<OutputIndex> {
        &self.spent
    }

    /// Union of mutations with another overlay copy of the same transaction:
    /// live outputs intersect, tombstones union.
    pub(crate) fn merged_with(&self, other: &Utxo) -> Utxo {
        let outputs = self
            .outputs
            .iter()
            .filter(|(index, _)| other.outputs.contains_key(index))
            .map(|(index, coins)| (*index, *coins))
            .collect();
        let spent = self.spent.union(&other.spent).copied().collect();
        Utxo {
            tx_hash: self.tx_hash,
            outputs,
            spent,
        }
    }
}
