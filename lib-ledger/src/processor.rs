//! The transaction processor.
//!
//! This module is the only entry point for applying a transaction's effects
//! to a patch. Inputs are validated and spent in declared order, outputs are
//! minted in declared order, and contract code runs inside the sandbox with
//! its fee metered against the transaction's budget.
//!
//! # Invariants
//!
//! - All reads go patch-first, then to the caller-staged snapshot
//! - A failure at input `i` leaves spends `0..i` applied; the caller decides
//!   whether to keep or discard the patch
//! - Sandbox errors never propagate: they become FAILED receipts and the
//!   contract's prior data survives verbatim
//! - Deterministic: same transaction + same snapshot + same patch = same
//!   mutations and the same receipt

use std::collections::BTreeMap;

use tracing::debug;

use lib_crypto::{address_from_public_key, get_address, recover_public_key};
use lib_sandbox::{parse_invocation, DataRecord, DataValue, Limits, Sandbox};
use lib_types::{Address, Amount, TxHash};

use crate::constants::{
    CONTRACT_METHOD_SEPARATOR, FUEL_PER_COIN, MAX_HEAP_CELLS, MIN_CONTRACT_FEE, TIMEOUT_CODE,
};
use crate::contract::Contract;
use crate::error::{LedgerError, LedgerResult};
use crate::patch::Patch;
use crate::receipt::{Receipt, TxStatus};
use crate::storage::UtxoSnapshot;
use crate::transaction::Transaction;

/// Tunables for transaction processing
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Floor fee for any sandbox entry
    pub min_contract_fee: Amount,
    /// Wall-clock bound per contract execution
    pub code_timeout: std::time::Duration,
    /// Fuel purchased per coin of budget
    pub fuel_per_coin: u64,
    /// Heap cap per contract execution
    pub max_heap_cells: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            min_contract_fee: MIN_CONTRACT_FEE,
            code_timeout: TIMEOUT_CODE,
            fuel_per_coin: FUEL_PER_COIN,
            max_heap_cells: MAX_HEAP_CELLS,
        }
    }
}

/// Environment record bound into the sandbox for one contract execution
#[derive(Debug, Clone, Default)]
pub struct ContractEnv {
    bindings: DataRecord,
}

impl ContractEnv {
    /// The minimum environment every contract sees: the triggering
    /// transaction's hash and the contract's own address
    pub fn new(contract_tx: TxHash, contract_addr: Address) -> Self {
        let mut bindings = BTreeMap::new();
        bindings.insert(
            "contractTx".to_string(),
            DataValue::Str(contract_tx.to_hex()),
        );
        bindings.insert(
            "contractAddr".to_string(),
            DataValue::Str(contract_addr.to_hex()),
        );
        Self { bindings }
    }

    /// Bind an additional identifier
    pub fn bind(mut self, name: impl Into<String>, value: DataValue) -> Self {
        self.bindings.insert(name.into(), value);
        self
    }

    pub fn bindings(&self) -> &DataRecord {
        &self.bindings
    }
}

/// The transaction-processing state machine. Single-threaded with respect to
/// one patch; exposes no internal parallelism.
#[derive(Debug, Clone, Default)]
pub struct TxProcessor {
    config: ProcessorConfig,
}

impl TxProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    // =========================================================================
    // Inputs
    // =========================================================================

    /// Validate and spend a transaction's inputs into `patch`.
    ///
    /// Reads consult the patch first, falling back to the caller-staged
    /// snapshot. Returns the summed input value. Inputs are processed in
    /// declared order; the first failure aborts with earlier spends applied.
    pub fn process_tx_inputs(
        &self,
        tx: &Transaction,
        snapshot: &UtxoSnapshot,
        patch: &mut Patch,
    ) -> LedgerResult<Amount> {
        let spending_tx = tx.hash();
        let mut total_in: Amount = 0;

        for (i, input) in tx.inputs().iter().enumerate() {
            let signed_digest = tx.hash_for_input(i);

            // A spend recorded by this patch's own processing tombstoned the
            // position in-block; that is a distinct failure from a
            // storage-side absence
            if patch.spent_by(&input.tx_hash, input.output_index).is_some() {
                return Err(LedgerError::OutputDeleted {
                    tx_hash: input.tx_hash,
                    index: input.output_index,
                });
            }

            let source = match patch.get_utxo(&input.tx_hash) {
                Some(utxo) => utxo.clone(),
                None => snapshot
                    .get(&input.tx_hash)
                    .cloned()
                    .ok_or(LedgerError::UtxoNotFound(input.tx_hash))?,
            };
            let coins = *source.coins_at_index(input.output_index)?;

            // Claim verification: the recovered signer must own the coins
            let proof = tx
                .claim_proofs()
                .get(i)
                .ok_or(LedgerError::MissingClaim(i))?;
            let public_key = recover_public_key(signed_digest.as_bytes(), proof)
                .map_err(|_| LedgerError::ClaimFailed)?;
            if address_from_public_key(&public_key) != coins.receiver() {
                return Err(LedgerError::ClaimFailed);
            }

            patch.spend_coins(&source, input.output_index, spending_tx)?;
            total_in = total_in
                .checked_add(coins.amount())
                .ok_or(LedgerError::Overflow)?;
        }

        debug!(tx = %spending_tx, inputs = tx.inputs().len(), total_in, "inputs spent");
        Ok(total_in)
    }

    // =========================================================================
    // Outputs
    // =========================================================================

    /// Mint the transaction's outputs at `(tx.hash(), index)` in declared
    /// order. Returns the summed output value. Balance checking against
    /// `total_in` is the caller's obligation once both sides are known.
    pub fn process_payments(&self, tx: &Transaction, patch: &mut Patch) -> LedgerResult<Amount> {
        let tx_hash = tx.hash();
        let mut total_out: Amount = 0;

        for (index, coins) in tx.get_out_coins().iter().enumerate() {
            patch.create_coins(tx_hash, index as u32, *coins)?;
            total_out = total_out
                .checked_add(coins.amount())
                .ok_or(LedgerError::Overflow)?;
        }

        Ok(total_out)
    }

    // =========================================================================
    // Contract deployment
    // =========================================================================

    /// Deploy contract code carried by `tx`.
    ///
    /// The contract's address derives from the deploying transaction's hash.
    /// On success the contract lands in the patch and the receipt carries
    /// its address; on any sandbox failure a FAILED receipt is returned and
    /// nothing is stored. Either way the sandbox entry costs the floor fee.
    pub fn create_contract(
        &self,
        budget: Amount,
        code: &str,
        env: &ContractEnv,
        tx: &Transaction,
        patch: &mut Patch,
    ) -> (Receipt, Option<Contract>) {
        let address = get_address(tx.hash().as_bytes());

        // The separator is the persistence delimiter; user source containing
        // it could smuggle method boundaries past the splice validation
        if code.contains(CONTRACT_METHOD_SEPARATOR) {
            debug!(tx = %tx.hash(), "deployment rejected: separator in source");
            return (
                Receipt::new(TxStatus::Failed, self.config.min_contract_fee),
                None,
            );
        }

        let sandbox = Sandbox::new(self.limits_for(budget));
        match sandbox.deploy(code, env.bindings()) {
            Ok(outcome) => {
                let contract =
                    Contract::from_methods(address, outcome.data, &outcome.methods, tx.group_id());
                patch.set_contract(contract.clone());
                let receipt = Receipt::new(TxStatus::Ok, self.config.min_contract_fee)
                    .with_contract_address(address);
                (receipt, Some(contract))
            }
            Err(err) => {
                debug!(tx = %tx.hash(), %err, "contract deployment failed");
                (
                    Receipt::new(TxStatus::Failed, self.config.min_contract_fee),
                    None,
                )
            }
        }
    }

    // =========================================================================
    // Contract invocation
    // =========================================================================

    /// Run an invocation against a contract.
    ///
    /// An empty invocation dispatches to `_default` if the contract declares
    /// it. On clean return the contract's data is replaced with the
    /// post-call snapshot; on any sandbox error it is left untouched and the
    /// receipt is FAILED. `coins_used` is never below the floor fee.
    pub fn run_contract(
        &self,
        budget: Amount,
        invocation: &str,
        contract: &mut Contract,
        env: &ContractEnv,
    ) -> Receipt {
        let (method, args) = match parse_invocation(invocation) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => ("_default".to_string(), Vec::new()),
            Err(err) => {
                debug!(%err, "invocation rejected");
                return Receipt::new(TxStatus::Failed, self.config.min_contract_fee);
            }
        };

        let sandbox = Sandbox::new(self.limits_for(budget));
        let methods = contract.method_sources();
        match sandbox.invoke(&methods, &method, &args, contract.data(), env.bindings()) {
            Ok(outcome) => {
                contract.set_data(outcome.data);
                Receipt::new(TxStatus::Ok, self.fee_for(outcome.fuel_used))
            }
            Err(err) => {
                debug!(contract = %contract.address(), method, %err, "contract call failed");
                Receipt::new(TxStatus::Failed, self.config.min_contract_fee)
            }
        }
    }

    // =========================================================================
    // Orchestration
    // =========================================================================

    /// Apply one transaction end to end: spend inputs, mint outputs, then
    /// deploy or invoke contract code with the fee margin as budget. The
    /// receipt is recorded in the patch under the transaction's hash.
    ///
    /// For invocations the target contract is resolved patch-first, then
    /// from `staged_contract` (fetched by the caller; the core does not read
    /// storage mid-processing). The contract is addressed by the first
    /// output's receiver.
    pub fn execute_transaction(
        &self,
        tx: &Transaction,
        snapshot: &UtxoSnapshot,
        staged_contract: Option<Contract>,
        patch: &mut Patch,
    ) -> LedgerResult<Receipt> {
        tx.validate()?;

        let total_in = if tx.is_coinbase() {
            0
        } else {
            self.process_tx_inputs(tx, snapshot, patch)?
        };
        let total_out = self.process_payments(tx, patch)?;

        if !tx.is_coinbase() && total_in < total_out {
            return Err(LedgerError::InsufficientFunds {
                have: total_in,
                need: total_out,
            });
        }
        let budget = if tx.is_coinbase() {
            0
        } else {
            total_in - total_out
        };

        let receipt = if let Some(code) = tx.get_code() {
            let address = get_address(tx.hash().as_bytes());
            let env = ContractEnv::new(tx.hash(), address)
                .bind("value", DataValue::Int(clamp_to_i64(budget)));
            let (receipt, _) = self.create_contract(budget, code, &env, tx, patch);
            receipt
        } else if let Some(invocation) = tx.get_contract_invocation() {
            self.invoke_staged(tx, invocation, staged_contract, budget, patch)?
        } else {
            Receipt::new(TxStatus::Ok, 0)
        };

        patch.add_receipt(tx.hash(), receipt.clone())?;
        Ok(receipt)
    }

    fn invoke_staged(
        &self,
        tx: &Transaction,
        invocation: &str,
        staged_contract: Option<Contract>,
        budget: Amount,
        patch: &mut Patch,
    ) -> LedgerResult<Receipt> {
        let address = tx
            .get_out_coins()
            .first()
            .map(|coins| coins.receiver())
            .ok_or_else(|| {
                LedgerError::InvalidTransaction(
                    "contract invocation without a target output".to_string(),
                )
            })?;

        let mut contract = match patch.get_contract(&address) {
            Some(contract) => contract.clone(),
            None => staged_contract
                .filter(|c| c.address() == address)
                .ok_or(LedgerError::ContractNotFound(address))?,
        };

        let env = ContractEnv::new(tx.hash(), address)
            .bind("value", DataValue::Int(clamp_to_i64(budget)));
        let receipt = self.run_contract(budget, invocation, &mut contract, &env);
        if receipt.is_ok() {
            patch.set_contract(contract);
        }
        Ok(receipt)
    }

    // =========================================================================
    // Budget accounting
    // =========================================================================

    fn limits_for(&self, budget: Amount) -> Limits {
        Limits::new(
            budget.saturating_mul(self.config.fuel_per_coin),
            self.config.max_heap_cells,
            self.config.code_timeout,
        )
    }

    /// Coins consumed by an execution: fuel converted back to coins,
    /// floored at the minimum contract fee
    fn fee_for(&self, fuel_used: u64) -> Amount {
        let from_fuel = fuel_used.div_ceil(self.config.fuel_per_coin.max(1));
        from_fuel.max(self.config.min_contract_fee)
    }
}

fn clamp_to_i64(amount: Amount) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}
