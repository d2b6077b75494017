//! Patch: copy-on-write overlay for one block's mutations.
//!
//! A patch is created per block, mutated only by that block's processor, and
//! either committed to storage or discarded. It carries UTXO overlay copies,
//! newly deployed or updated contracts, per-transaction receipts, and a
//! running coins delta per address.
//!
//! Merging lets a node stack a new block atop other groups' in-flight
//! patches without touching storage. Merge folds UTXO mutations together
//! (live outputs intersect, tombstones union) and resolves contract state by
//! level, higher level winning. The spend log — which transaction spent
//! which output — is local to one block processor and is NOT propagated by
//! merge: a tombstone recorded by this patch's own spends reads as
//! "already deleted", while one inherited through merge surfaces at read
//! time as "already spent".

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use lib_types::{Address, BlockHeight, OutputIndex, TxHash};

use crate::coins::Coins;
use crate::contract::Contract;
use crate::error::{LedgerError, LedgerResult};
use crate::receipt::Receipt;
use crate::utxo::Utxo;

/// One block's worth of speculative state mutations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Patch {
    level: BlockHeight,
    utxos: HashMap<TxHash, Utxo>,
    contracts: HashMap<Address, Contract>,
    /// Level at which each contract entry was written; merge tie-break
    contract_levels: HashMap<Address, BlockHeight>,
    /// Receipts in insertion order
    receipts: Vec<(TxHash, Receipt)>,
    /// Net coin movement per address within this patch
    coins_delta: HashMap<Address, i128>,
    /// Reverse index: which transaction spent which output. Block-local;
    /// dropped by merge.
    spend_log: HashMap<(TxHash, OutputIndex), TxHash>,
}

impl Patch {
    /// Create an empty patch at the given block level
    pub fn new(level: BlockHeight) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    pub fn level(&self) -> BlockHeight {
        self.level
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty() && self.contracts.is_empty() && self.receipts.is_empty()
    }

    // =========================================================================
    // UTXO overlay
    // =========================================================================

    /// The overlay copy for a transaction, if this patch has mutated it
    pub fn get_utxo(&self, tx_hash: &TxHash) -> Option<&Utxo> {
        self.utxos.get(tx_hash)
    }

    /// Mint a new output at `(tx_hash, index)`.
    ///
    /// Fails if that pair already exists as a live output in this patch.
    pub fn create_coins(
        &mut self,
        tx_hash: TxHash,
        index: OutputIndex,
        coins: Coins,
    ) -> LedgerResult<()> {
        let receiver = coins.receiver();
        let amount = coins.amount();
        self.utxos
            .entry(tx_hash)
            .or_insert_with(|| Utxo::new(tx_hash))
            .insert_coins(index, coins)?;
        *self.coins_delta.entry(receiver).or_default() += i128::from(amount);
        Ok(())
    }

    /// Spend `source`'s output at `index`, lazily cloning the storage UTXO
    /// into the overlay on first write. The spending transaction is retained
    /// in the spend log for reverse indexing.
    pub fn spend_coins(
        &mut self,
        source: &Utxo,
        index: OutputIndex,
        spending_tx: TxHash,
    ) -> LedgerResult<()> {
        let tx_hash = source.tx_hash();
        let overlay = self
            .utxos
            .entry(tx_hash)
            .or_insert_with(|| source.clone());
        let coins = overlay.spend_coins(index)?;
        self.spend_log.insert((tx_hash, index), spending_tx);
        *self.coins_delta.entry(coins.receiver()).or_default() -= i128::from(coins.amount());
        Ok(())
    }

    /// The transaction that spent `(tx_hash, index)` through THIS patch,
    /// if any. Merged-in spends are not visible here.
    pub fn spent_by(&self, tx_hash: &TxHash, index: OutputIndex) -> Option<&TxHash> {
        self.spend_log.get(&(*tx_hash, index))
    }

    // =========================================================================
    // Contracts
    // =========================================================================

    /// Record a newly deployed or updated contract at this patch's level
    pub fn set_contract(&mut self, contract: Contract) {
        let address = contract.address();
        self.contracts.insert(address, contract);
        self.contract_levels.insert(address, self.level);
    }

    pub fn get_contract(&self, address: &Address) -> Option<&Contract> {
        self.contracts.get(address)
    }

    pub fn contracts(&self) -> impl Iterator<Item = &Contract> {
        self.contracts.values()
    }

    // =========================================================================
    // Receipts
    // =========================================================================

    /// Record a receipt. Receipts are keyed by transaction hash; recording a
    /// different receipt under an existing hash is an error.
    pub fn add_receipt(&mut self, tx_hash: TxHash, receipt: Receipt) -> LedgerResult<()> {
        if let Some((_, existing)) = self.receipts.iter().find(|(hash, _)| *hash == tx_hash) {
            if *existing == receipt {
                return Ok(());
            }
            return Err(LedgerError::ReceiptCollision(tx_hash));
        }
        self.receipts.push((tx_hash, receipt));
        Ok(())
    }

    pub fn get_receipt(&self, tx_hash: &TxHash) -> Option<&Receipt> {
        self.receipts
            .iter()
            .find(|(hash, _)| hash == tx_hash)
            .map(|(_, receipt)| receipt)
    }

    /// Receipts in insertion order
    pub fn receipts(&self) -> &[(TxHash, Receipt)] {
        &self.receipts
    }

    // =========================================================================
    // Ledger delta view
    // =========================================================================

    /// Net coin movement this patch applies to `address`
    pub fn coins_delta(&self, address: &Address) -> i128 {
        self.coins_delta.get(address).copied().unwrap_or(0)
    }

    // =========================================================================
    // Merge
    // =========================================================================

    /// Union of two patches' mutations.
    ///
    /// UTXOs present on both sides keep the intersection of live outputs and
    /// the union of tombstones. Contract state resolves by level, higher
    /// winning; an equal-level double-write to one address is a conflict
    /// unless both sides wrote the identical contract. Receipt collisions
    /// under one hash follow the same rule. The result's level is the max of
    /// the inputs and its spend log starts empty.
    pub fn merge(&self, other: &Patch) -> LedgerResult<Patch> {
        let mut merged = Patch::new(self.level.max(other.level));

        // UTXO overlays
        for (tx_hash, utxo) in &self.utxos {
            let entry = match other.utxos.get(tx_hash) {
                Some(theirs) => utxo.merged_with(theirs),
                None => utxo.clone(),
            };
            merged.utxos.insert(*tx_hash, entry);
        }
        for (tx_hash, utxo) in &other.utxos {
            merged
                .utxos
                .entry(*tx_hash)
                .or_insert_with(|| utxo.clone());
        }

        // Contract state, level tie-break
        for (address, contract) in &self.contracts {
            let our_level = self
                .contract_levels
                .get(address)
                .copied()
                .unwrap_or(self.level);
            merged.contracts.insert(*address, contract.clone());
            merged.contract_levels.insert(*address, our_level);
        }
        for (address, contract) in &other.contracts {
            let their_level = other
                .contract_levels
                .get(address)
                .copied()
                .unwrap_or(other.level);
            match merged.contract_levels.get(address).copied() {
                None => {
                    merged.contracts.insert(*address, contract.clone());
                    merged.contract_levels.insert(*address, their_level);
                }
                Some(our_level) if their_level > our_level => {
                    merged.contracts.insert(*address, contract.clone());
                    merged.contract_levels.insert(*address, their_level);
                }
                Some(our_level) if their_level < our_level => {}
                Some(_) => {
                    // Equal level: only an identical write is not a conflict
                    if merged.contracts.get(address) != Some(contract) {
                        return Err(LedgerError::MergeConflict(*address));
                    }
                }
            }
        }

        // Receipts, insertion order: self's first, then other's novel ones
        for (tx_hash, receipt) in &self.receipts {
            merged.receipts.push((*tx_hash, receipt.clone()));
        }
        for (tx_hash, receipt) in &other.receipts {
            match merged.get_receipt(tx_hash) {
                None => merged.receipts.push((*tx_hash, receipt.clone())),
                Some(existing) if existing == receipt => {}
                Some(_) => return Err(LedgerError::ReceiptCollision(*tx_hash)),
            }
        }

        // Coin deltas are additive; exact when the merged patches touched
        // disjoint outputs, which is the supported merge discipline
        for (address, delta) in &self.coins_delta {
            *merged.coins_delta.entry(*address).or_default() += delta;
        }
        for (address, delta) in &other.coins_delta {
            *merged.coins_delta.entry(*address).or_default() += delta;
        }

        Ok(merged)
    }

    // =========================================================================
    // Commit surface
    // =========================================================================

    /// Overlay UTXOs, for folding into storage
    pub fn utxos(&self) -> impl Iterator<Item = (&TxHash, &Utxo)> {
        self.utxos.iter()
    }
}

// The spend log and the coins delta are bookkeeping derived from the
// mutations, not patch state: two patches that apply the same mutations are
// equal regardless of who recorded which spend.
impl PartialEq for Patch {
    fn eq(&self, other: &Self) -> bool {
        self.level == other.level
            && self.utxos == other.utxos
            && self.contracts == other.contracts
            && self.contract_levels == other.contract_levels
            && self.receipts == other.receipts
    }
}
