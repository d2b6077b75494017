//! Content-addressed transactions.
//!
//! The hash covers the canonical bincode encoding of the payload only; claim
//! proofs are appended afterwards, signing the per-input digest. Today every
//! per-input digest equals the payload hash — the indexed call shape exists
//! so partial-commitment (SIGHASH-style) modes can change that without
//! touching callers.

use std::collections::HashSet;

use bincode::Options;
use serde::{Deserialize, Serialize};

use lib_crypto::{KeyPair, Signature};
use lib_types::{GroupId, OutputIndex, TxHash};

use crate::coins::Coins;
use crate::error::{LedgerError, LedgerResult};

/// Reference to an output being spent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxInput {
    pub tx_hash: TxHash,
    pub output_index: OutputIndex,
}

impl TxInput {
    pub const fn new(tx_hash: TxHash, output_index: OutputIndex) -> Self {
        Self {
            tx_hash,
            output_index,
        }
    }
}

/// The hashed portion of a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxPayload {
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<Coins>,
    /// Contract source for deployment transactions
    pub contract_code: Option<String>,
    /// `method(args)` invocation for contract-call transactions
    pub contract_invocation: Option<String>,
    /// Witness group this transaction belongs to
    pub group_id: GroupId,
}

/// A transaction: payload plus one claim proof per input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    payload: TxPayload,
    claim_proofs: Vec<Signature>,
}

impl Transaction {
    pub fn new(payload: TxPayload) -> Self {
        Self {
            payload,
            claim_proofs: Vec::new(),
        }
    }

    /// Plain transfer constructor
    pub fn transfer(inputs: Vec<TxInput>, outputs: Vec<Coins>, group_id: GroupId) -> Self {
        Self::new(TxPayload {
            inputs,
            outputs,
            contract_code: None,
            contract_invocation: None,
            group_id,
        })
    }

    /// Content hash: BLAKE3 over the canonical payload encoding
    pub fn hash(&self) -> TxHash {
        let encoded = bincode::DefaultOptions::new()
            .serialize(&self.payload)
            .expect("payload serialization is infallible");
        TxHash::new(blake3::hash(&encoded).into())
    }

    /// The digest input `index` must sign. Currently equal to [`hash`]
    /// for every index; kept indexed for future partial-commitment modes.
    ///
    /// [`hash`]: Transaction::hash
    pub fn hash_for_input(&self, _index: usize) -> TxHash {
        self.hash()
    }

    /// Sign input `index` and record the claim proof. Inputs are claimed in
    /// order; re-claiming an index replaces its proof.
    pub fn claim(&mut self, index: usize, keypair: &KeyPair) -> LedgerResult<()> {
        if index >= self.payload.inputs.len() {
            return Err(LedgerError::InvalidTransaction(format!(
                "claim index {index} out of range ({} inputs)",
                self.payload.inputs.len()
            )));
        }
        let digest = self.hash_for_input(index);
        let proof = lib_crypto::sign(digest.as_bytes(), keypair);
        if index < self.claim_proofs.len() {
            self.claim_proofs[index] = proof;
        } else if index == self.claim_proofs.len() {
            self.claim_proofs.push(proof);
        } else {
            return Err(LedgerError::InvalidTransaction(format!(
                "claim for input {index} before inputs 0..{}",
                self.claim_proofs.len()
            )));
        }
        Ok(())
    }

    /// Sign every input with one key
    pub fn claim_all(&mut self, keypair: &KeyPair) -> LedgerResult<()> {
        for index in 0..self.payload.inputs.len() {
            self.claim(index, keypair)?;
        }
        Ok(())
    }

    pub fn inputs(&self) -> &[TxInput] {
        &self.payload.inputs
    }

    pub fn claim_proofs(&self) -> &[Signature] {
        &self.claim_proofs
    }

    pub fn get_out_coins(&self) -> &[Coins] {
        &self.payload.outputs
    }

    pub fn get_code(&self) -> Option<&str> {
        self.payload.contract_code.as_deref()
    }

    pub fn get_contract_invocation(&self) -> Option<&str> {
        self.payload.contract_invocation.as_deref()
    }

    pub fn group_id(&self) -> GroupId {
        self.payload.group_id
    }

    /// A transaction with no inputs issues coins; only the genesis block or
    /// consensus-produced emission may carry one
    pub fn is_coinbase(&self) -> bool {
        self.payload.inputs.is_empty()
    }

    /// Stateless validation: structure only, no chain state.
    pub fn validate(&self) -> LedgerResult<()> {
        // No duplicate inputs
        let mut seen: HashSet<TxInput> = HashSet::with_capacity(self.payload.inputs.len());
        for input in &self.payload.inputs {
            if !seen.insert(*input) {
                return Err(LedgerError::DuplicateInput {
                    tx_hash: input.tx_hash,
                    index: input.output_index,
                });
            }
        }

        // Every input carries a claim proof
        if self.claim_proofs.len() != self.payload.inputs.len() {
            return Err(LedgerError::InvalidTransaction(format!(
                "{} inputs but {} claim proofs",
                self.payload.inputs.len(),
                self.claim_proofs.len()
            )));
        }

        // A transaction deploys or invokes, never both
        if self.payload.contract_code.is_some() && self.payload.contract_invocation.is_some() {
            return Err(LedgerError::InvalidTransaction(
                "transaction carries both contract code and an invocation".to_string(),
            ));
        }

        // Something must happen
        if self.payload.outputs.is_empty()
            && self.payload.contract_code.is_none()
            && self.payload.contract_invocation.is_none()
        {
            return Err(LedgerError::InvalidTransaction(
                "transaction has no outputs and no contract action".to_string(),
            ));
        }

        Ok(())
    }
}
