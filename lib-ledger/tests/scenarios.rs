//! End-to-end transaction processing scenarios.
//!
//! Each test seeds storage, stages a snapshot the way a block-level caller
//! would, and drives the processor against a patch.

use lib_crypto::{get_address, KeyPair};
use lib_ledger::constants::MIN_CONTRACT_FEE;
use lib_ledger::{
    Coins, Contract, ContractEnv, LedgerError, MemoryStorage, Patch, Storage, Transaction,
    TxInput, TxProcessor, Utxo,
};
use lib_sandbox::{DataRecord, DataValue};
use lib_types::{Address, TxHash};

const UTXO_HASH: [u8; 32] = [0xaa; 32];

/// Seed one storage UTXO with 100_000 coins for `owner` at indices 0, 12, 80
fn seeded_storage(owner: Address) -> (MemoryStorage, TxHash) {
    let utxo_hash = TxHash::new(UTXO_HASH);
    let mut storage = MemoryStorage::new();
    storage.seed_utxo(Utxo::with_outputs(
        utxo_hash,
        [0u32, 12, 80]
            .into_iter()
            .map(|i| (i, Coins::new(100_000, owner))),
    ));
    (storage, utxo_hash)
}

fn transfer(inputs: &[(TxHash, u32)], outputs: &[(u64, Address)], keypair: &KeyPair) -> Transaction {
    let mut tx = Transaction::transfer(
        inputs
            .iter()
            .map(|&(hash, index)| TxInput::new(hash, index))
            .collect(),
        outputs
            .iter()
            .map(|&(amount, receiver)| Coins::new(amount, receiver))
            .collect(),
        0,
    );
    tx.claim_all(keypair).unwrap();
    tx
}

fn data_record(pairs: &[(&str, DataValue)]) -> DataRecord {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

// =============================================================================
// Scenario 1: happy path
// =============================================================================

#[test]
fn happy_path_spends_three_inputs_and_mints_one_output() {
    let keypair = KeyPair::generate();
    let owner = keypair.address();
    let (storage, utxo_hash) = seeded_storage(owner);
    let processor = TxProcessor::default();

    let tx = transfer(
        &[(utxo_hash, 12), (utxo_hash, 0), (utxo_hash, 80)],
        &[(1_000, owner)],
        &keypair,
    );

    let snapshot = storage.get_utxos_snapshot(&[utxo_hash]);
    let mut patch = Patch::new(1);

    let total_in = processor
        .process_tx_inputs(&tx, &snapshot, &mut patch)
        .unwrap();
    assert_eq!(total_in, 300_000);

    let total_out = processor.process_payments(&tx, &mut patch).unwrap();
    assert_eq!(total_out, 1_000);

    let minted = patch.get_utxo(&tx.hash()).unwrap();
    assert!(minted.coins_at_index(0).is_ok());
    assert!(!minted.is_empty());

    let spent: Vec<u32> = patch
        .get_utxo(&utxo_hash)
        .unwrap()
        .spent()
        .iter()
        .copied()
        .collect();
    assert_eq!(spent, vec![0, 12, 80]);
    assert!(patch.get_utxo(&utxo_hash).unwrap().is_empty());
}

// =============================================================================
// Scenario 2: unknown output index
// =============================================================================

#[test]
fn unknown_output_index_reads_as_already_spent() {
    let keypair = KeyPair::generate();
    let (storage, utxo_hash) = seeded_storage(keypair.address());
    let processor = TxProcessor::default();

    let tx = transfer(&[(utxo_hash, 17)], &[(1_000, keypair.address())], &keypair);

    let snapshot = storage.get_utxos_snapshot(&[utxo_hash]);
    let err = processor
        .process_tx_inputs(&tx, &snapshot, &mut Patch::new(1))
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        format!("Output #17 of Tx {utxo_hash} already spent!")
    );
}

#[test]
fn missing_utxo_is_not_found() {
    let keypair = KeyPair::generate();
    let processor = TxProcessor::default();
    let unknown = TxHash::new([0x33; 32]);

    let tx = transfer(&[(unknown, 0)], &[(1_000, keypair.address())], &keypair);

    let err = processor
        .process_tx_inputs(&tx, &Default::default(), &mut Patch::new(1))
        .unwrap_err();
    assert_eq!(err, LedgerError::UtxoNotFound(unknown));
    assert_eq!(err.to_string(), format!("UTXO not found for {unknown}"));
}

// =============================================================================
// Scenario 3: bad claim
// =============================================================================

#[test]
fn claim_by_wrong_key_fails() {
    let owner = KeyPair::generate();
    let impostor = KeyPair::generate();
    let (storage, utxo_hash) = seeded_storage(owner.address());
    let processor = TxProcessor::default();

    let tx = transfer(&[(utxo_hash, 12)], &[(1_000, owner.address())], &impostor);

    let snapshot = storage.get_utxos_snapshot(&[utxo_hash]);
    let err = processor
        .process_tx_inputs(&tx, &snapshot, &mut Patch::new(1))
        .unwrap_err();
    assert_eq!(err, LedgerError::ClaimFailed);
    assert_eq!(err.to_string(), "Claim failed!");
}

// =============================================================================
// Scenario 4: coinbase-style issue
// =============================================================================

#[test]
fn coinbase_mints_without_inputs() {
    let keypair = KeyPair::generate();
    let processor = TxProcessor::default();

    let tx = transfer(&[], &[(100_000, keypair.address())], &keypair);
    assert!(tx.is_coinbase());

    let mut patch = Patch::new(0);
    let total_out = processor.process_payments(&tx, &mut patch).unwrap();
    assert_eq!(total_out, 100_000);
    assert!(!patch.get_utxo(&tx.hash()).unwrap().is_empty());
}

// =============================================================================
// Scenario 5: intra-transaction double input
// =============================================================================

#[test]
fn double_input_within_one_tx_is_already_deleted() {
    let keypair = KeyPair::generate();
    let (storage, utxo_hash) = seeded_storage(keypair.address());
    let processor = TxProcessor::default();

    let tx = transfer(
        &[(utxo_hash, 12), (utxo_hash, 12)],
        &[(1_000, keypair.address())],
        &keypair,
    );

    let snapshot = storage.get_utxos_snapshot(&[utxo_hash]);
    let err = processor
        .process_tx_inputs(&tx, &snapshot, &mut Patch::new(1))
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        format!("Tx {utxo_hash} index 12 already deleted!")
    );
}

// =============================================================================
// Scenario 6: sequential spend attempt across merged patches
// =============================================================================

#[test]
fn spend_inherited_through_merge_is_already_spent() {
    let keypair = KeyPair::generate();
    let (storage, utxo_hash) = seeded_storage(keypair.address());
    let processor = TxProcessor::default();

    // tx1 spends (H, 12) into P1
    let tx1 = transfer(&[(utxo_hash, 12)], &[(1_000, keypair.address())], &keypair);
    let snapshot = storage.get_utxos_snapshot(&[utxo_hash]);
    let mut p1 = Patch::new(1);
    processor
        .process_tx_inputs(&tx1, &snapshot, &mut p1)
        .unwrap();

    // Another group's in-flight patch, merged before processing the new block
    let p2 = Patch::new(1);
    let mut p3 = p1.merge(&p2).unwrap();

    // tx2 tries (H, 12) again atop the merged state
    let tx2 = transfer(&[(utxo_hash, 12)], &[(2_000, keypair.address())], &keypair);
    let err = processor
        .process_tx_inputs(&tx2, &snapshot, &mut p3)
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        format!("Output #12 of Tx {utxo_hash} already spent!")
    );
}

#[test]
fn double_spend_within_one_patch_is_already_deleted() {
    let keypair = KeyPair::generate();
    let (storage, utxo_hash) = seeded_storage(keypair.address());
    let processor = TxProcessor::default();

    let snapshot = storage.get_utxos_snapshot(&[utxo_hash]);
    let mut patch = Patch::new(1);

    let tx1 = transfer(&[(utxo_hash, 12)], &[(1_000, keypair.address())], &keypair);
    processor
        .process_tx_inputs(&tx1, &snapshot, &mut patch)
        .unwrap();

    // Same block, same patch: the processor's own spend log answers
    let tx2 = transfer(&[(utxo_hash, 12)], &[(2_000, keypair.address())], &keypair);
    let err = processor
        .process_tx_inputs(&tx2, &snapshot, &mut patch)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("Tx {utxo_hash} index 12 already deleted!")
    );
}

// =============================================================================
// Scenario 7: contract deploy and run
// =============================================================================

#[test]
fn deploy_captures_instance_data_and_method_source() {
    let keypair = KeyPair::generate();
    let processor = TxProcessor::default();

    let tx = Transaction::new(lib_ledger::TxPayload {
        inputs: vec![],
        outputs: vec![],
        contract_code: Some(
            "class A extends Base{ constructor(p){super(); this._data=p; this._contractAddr=contractAddr;} getData(){return this._data;} } exports=new A(10);"
                .to_string(),
        ),
        contract_invocation: None,
        group_id: 4,
    });

    let expected_addr = get_address(tx.hash().as_bytes());
    let env = ContractEnv::new(tx.hash(), expected_addr);
    let mut patch = Patch::new(1);

    let (receipt, contract) = processor.create_contract(
        10_000,
        tx.get_code().unwrap(),
        &env,
        &tx,
        &mut patch,
    );
    let contract = contract.unwrap();

    assert!(receipt.is_ok());
    assert_eq!(receipt.contract_address(), Some(expected_addr));
    assert_eq!(contract.address(), expected_addr);
    assert_eq!(contract.group_id(), 4);

    assert_eq!(contract.data().get("_data"), Some(&DataValue::Int(10)));
    assert_eq!(
        contract.data().get("_contractAddr"),
        Some(&DataValue::Str(expected_addr.to_hex()))
    );
    assert_eq!(contract.code(), "getData(){return this._data;}");

    // The patch holds the deployed contract
    assert_eq!(patch.get_contract(&expected_addr), Some(&contract));
}

#[test]
fn run_contract_mutates_data_on_success() {
    let processor = TxProcessor::default();
    let mut contract = Contract::new(
        Address::new([5u8; 20]),
        data_record(&[("value", DataValue::Int(100))]),
        "add(a){this.value+=a;}".to_string(),
        0,
    );
    let env = ContractEnv::new(TxHash::new([1u8; 32]), contract.address());

    let receipt = processor.run_contract(10_000, "add(10)", &mut contract, &env);
    assert!(receipt.is_ok());
    assert_eq!(contract.data().get("value"), Some(&DataValue::Int(110)));
}

#[test]
fn run_contract_unknown_method_leaves_data_untouched() {
    let processor = TxProcessor::default();
    let mut contract = Contract::new(
        Address::new([5u8; 20]),
        data_record(&[("value", DataValue::Int(100))]),
        "add(a){this.value+=a;}".to_string(),
        0,
    );
    let env = ContractEnv::new(TxHash::new([1u8; 32]), contract.address());

    let receipt = processor.run_contract(10_000, "subtract(10)", &mut contract, &env);
    assert!(!receipt.is_ok());
    assert_eq!(contract.data().get("value"), Some(&DataValue::Int(100)));
}

#[test]
fn empty_invocation_dispatches_default() {
    let processor = TxProcessor::default();
    let mut contract = Contract::new(
        Address::new([5u8; 20]),
        data_record(&[("value", DataValue::Int(100))]),
        "_default(){this.value+=17;}".to_string(),
        0,
    );
    let env = ContractEnv::new(TxHash::new([1u8; 32]), contract.address());

    let receipt = processor.run_contract(10_000, "", &mut contract, &env);
    assert!(receipt.is_ok());
    assert_eq!(contract.data().get("value"), Some(&DataValue::Int(117)));
}

#[test]
fn empty_invocation_without_default_fails() {
    let processor = TxProcessor::default();
    let mut contract = Contract::new(
        Address::new([5u8; 20]),
        data_record(&[("value", DataValue::Int(100))]),
        "add(a){this.value+=a;}".to_string(),
        0,
    );
    let env = ContractEnv::new(TxHash::new([1u8; 32]), contract.address());

    let receipt = processor.run_contract(10_000, "", &mut contract, &env);
    assert!(!receipt.is_ok());
    assert_eq!(contract.data().get("value"), Some(&DataValue::Int(100)));
}

// =============================================================================
// Invariants
// =============================================================================

#[test]
fn invariant_conservation_of_returned_sums() {
    let keypair = KeyPair::generate();
    let owner = keypair.address();
    let (storage, utxo_hash) = seeded_storage(owner);
    let processor = TxProcessor::default();

    let fee = 500u64;
    let tx = transfer(
        &[(utxo_hash, 0)],
        &[(100_000 - fee, owner)],
        &keypair,
    );

    let snapshot = storage.get_utxos_snapshot(&[utxo_hash]);
    let mut patch = Patch::new(1);
    let total_in = processor
        .process_tx_inputs(&tx, &snapshot, &mut patch)
        .unwrap();
    let total_out = processor.process_payments(&tx, &mut patch).unwrap();

    assert_eq!(total_in, total_out + fee);
}

#[test]
fn invariant_atomicity_of_input_failure() {
    let keypair = KeyPair::generate();
    let (storage, utxo_hash) = seeded_storage(keypair.address());
    let processor = TxProcessor::default();

    // Input 0 is valid, input 1 references a dead index
    let tx = transfer(
        &[(utxo_hash, 0), (utxo_hash, 99)],
        &[(1_000, keypair.address())],
        &keypair,
    );

    let snapshot = storage.get_utxos_snapshot(&[utxo_hash]);
    let mut patch = Patch::new(1);
    assert!(processor
        .process_tx_inputs(&tx, &snapshot, &mut patch)
        .is_err());

    // The caller-supplied patch shows exactly the spends before the failure
    let overlay = patch.get_utxo(&utxo_hash).unwrap();
    assert!(overlay.spent().contains(&0));
    assert!(!overlay.spent().contains(&99));
    assert!(overlay.coins_at_index(12).is_ok());
}

#[test]
fn invariant_deterministic_contract_address() {
    let tx = Transaction::new(lib_ledger::TxPayload {
        inputs: vec![],
        outputs: vec![],
        contract_code: Some("exports = new Base();".to_string()),
        contract_invocation: None,
        group_id: 0,
    });
    assert_eq!(
        get_address(tx.hash().as_bytes()),
        get_address(tx.hash().as_bytes())
    );
}

#[test]
fn invariant_receipt_floor_fee_on_both_outcomes() {
    let processor = TxProcessor::default();
    let env = ContractEnv::new(TxHash::new([1u8; 32]), Address::new([5u8; 20]));

    // Failure: deploy of garbage source
    let tx = Transaction::new(lib_ledger::TxPayload {
        inputs: vec![],
        outputs: vec![],
        contract_code: Some("this is not a contract".to_string()),
        contract_invocation: None,
        group_id: 0,
    });
    let (receipt, contract) =
        processor.create_contract(10_000, tx.get_code().unwrap(), &env, &tx, &mut Patch::new(1));
    assert!(contract.is_none());
    assert!(!receipt.is_ok());
    assert!(receipt.coins_used() >= MIN_CONTRACT_FEE);

    // Success: a minimal run
    let mut contract = Contract::new(
        Address::new([5u8; 20]),
        DataRecord::new(),
        "ping(){return 1;}".to_string(),
        0,
    );
    let receipt = processor.run_contract(10_000, "ping()", &mut contract, &env);
    assert!(receipt.is_ok());
    assert!(receipt.coins_used() >= MIN_CONTRACT_FEE);
}

#[test]
fn separator_in_deployment_source_is_rejected() {
    let processor = TxProcessor::default();
    let env = ContractEnv::new(TxHash::new([1u8; 32]), Address::new([5u8; 20]));

    let hostile = format!(
        "class A extends Base{{ m(){{return 1;}}{} stolen(){{return 2;}} }} exports=new A();",
        lib_ledger::constants::CONTRACT_METHOD_SEPARATOR
    );
    let tx = Transaction::new(lib_ledger::TxPayload {
        inputs: vec![],
        outputs: vec![],
        contract_code: Some(hostile.clone()),
        contract_invocation: None,
        group_id: 0,
    });

    let (receipt, contract) =
        processor.create_contract(10_000, &hostile, &env, &tx, &mut Patch::new(1));
    assert!(contract.is_none());
    assert!(!receipt.is_ok());
}

// =============================================================================
// Full pipeline
// =============================================================================

#[test]
fn execute_transfer_then_commit_then_respend_rejected() -> anyhow::Result<()> {
    let keypair = KeyPair::generate();
    let owner = keypair.address();
    let (mut storage, utxo_hash) = seeded_storage(owner);
    let processor = TxProcessor::default();

    let tx = transfer(&[(utxo_hash, 12)], &[(99_000, owner)], &keypair);

    let snapshot = storage.get_utxos_snapshot(&[utxo_hash]);
    let mut patch = Patch::new(1);
    let receipt = processor.execute_transaction(&tx, &snapshot, None, &mut patch)?;
    assert!(receipt.is_ok());
    assert_eq!(patch.get_receipt(&tx.hash()), Some(&receipt));

    storage.apply_patch(patch)?;

    // A later block staging a fresh snapshot cannot respend
    let tx2 = transfer(&[(utxo_hash, 12)], &[(99_000, owner)], &keypair);
    let snapshot2 = storage.get_utxos_snapshot(&[utxo_hash]);
    let err = processor
        .process_tx_inputs(&tx2, &snapshot2, &mut Patch::new(2))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("Output #12 of Tx {utxo_hash} already spent!")
    );
    Ok(())
}

#[test]
fn execute_deploy_then_invoke_through_storage() -> anyhow::Result<()> {
    let keypair = KeyPair::generate();
    let owner = keypair.address();
    let (mut storage, utxo_hash) = seeded_storage(owner);
    let processor = TxProcessor::default();

    // Block 1: deploy a counter contract funded by (H, 0)
    let mut deploy_tx = Transaction::new(lib_ledger::TxPayload {
        inputs: vec![TxInput::new(utxo_hash, 0)],
        outputs: vec![],
        contract_code: Some(
            "class Counter extends Base{ constructor(){super(); this.count=0;} bump(n){this.count+=n;} }  exports=new Counter();"
                .to_string(),
        ),
        contract_invocation: None,
        group_id: 2,
    });
    deploy_tx.claim_all(&keypair)?;
    let contract_addr = get_address(deploy_tx.hash().as_bytes());

    let snapshot = storage.get_utxos_snapshot(&[utxo_hash]);
    let mut patch = Patch::new(1);
    let receipt = processor.execute_transaction(&deploy_tx, &snapshot, None, &mut patch)?;
    assert!(receipt.is_ok());
    assert_eq!(receipt.contract_address(), Some(contract_addr));
    storage.apply_patch(patch)?;

    let stored = storage.get_contract(&contract_addr).unwrap();
    assert_eq!(stored.data().get("count"), Some(&DataValue::Int(0)));

    // Block 2: invoke bump(5), contract staged from storage by the caller
    let mut invoke_tx = Transaction::new(lib_ledger::TxPayload {
        inputs: vec![TxInput::new(utxo_hash, 80)],
        outputs: vec![Coins::new(90_000, contract_addr)],
        contract_code: None,
        contract_invocation: Some("bump(5)".to_string()),
        group_id: 2,
    });
    invoke_tx.claim_all(&keypair)?;

    let snapshot = storage.get_utxos_snapshot(&[utxo_hash]);
    let staged = storage.get_contract(&contract_addr);
    let mut patch = Patch::new(2);
    let receipt = processor.execute_transaction(&invoke_tx, &snapshot, staged, &mut patch)?;
    assert!(receipt.is_ok());
    storage.apply_patch(patch)?;

    let stored = storage.get_contract(&contract_addr).unwrap();
    assert_eq!(stored.data().get("count"), Some(&DataValue::Int(5)));
    Ok(())
}
