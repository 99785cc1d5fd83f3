use shroud_config::ShroudConfig;
use shroud_privacy::{Account, Commitment, Fr, Poseidon, Utxo, UtxoConfig};
use shroud_pubkey::Pubkey;
use shroud_transaction::{
    Action, IndexedTransaction, Provider, Relayer, SolMerkleTree, Transaction,
    TransactionParameters, TransactionParametersConfig, VerifierKind,
};

const SLOT: usize = 128;

fn indexed(leaves: Vec<Commitment>) -> IndexedTransaction {
    IndexedTransaction {
        signature: "genesis".into(),
        first_leaf_index: 0,
        leaves,
        nullifiers: vec![],
        encrypted_utxos: vec![],
        relayer_fee: 0,
    }
}

/// Provider whose tree holds one spendable 10_000 lamport note.
fn setup() -> (Provider, Utxo) {
    let provider = Provider::from_config(&ShroudConfig::default(), None).unwrap();
    let owner = Account::from_seed(&provider.hasher, &[5u8; 32]).unwrap();
    let note = Utxo::new(
        &provider.hasher,
        UtxoConfig::new(owner)
            .with_assets(vec![Pubkey::SYSTEM_PROGRAM])
            .with_amounts(vec![10_000])
            .with_blinding([1u8; 32]),
        &provider.registries,
    )
    .unwrap();
    let tree = SolMerkleTree::build(
        provider.pool.transaction_merkle_tree,
        Poseidon::new(),
        &[indexed(vec![note.commitment(&provider.hasher)])],
    )
    .unwrap();
    (provider.with_merkle_tree(tree), note)
}

fn compiled_unshield() -> (Transaction, Fr) {
    let (provider, note) = setup();
    let mut config = TransactionParametersConfig::new(
        Action::Unshield,
        VerifierKind::Zero,
        provider.pool.transaction_merkle_tree,
    );
    config.input_utxos = vec![note];
    config.recipient_sol = Some(Pubkey::new_unique());
    config.relayer = Some(Relayer::new(Pubkey::new_unique(), Pubkey::new_unique(), 1_000, 0));
    let params =
        TransactionParameters::new(&provider.hasher, config, &provider.registries).unwrap();

    let mut tx = Transaction::new(&provider, params, None).unwrap();
    let bound = tx.compile(&provider).unwrap().tx_integrity_hash;
    (tx, bound)
}

#[test]
fn recomputing_unchanged_hash_matches() {
    let (tx, bound) = compiled_unshield();
    assert_eq!(tx.params.get_tx_integrity_hash(SLOT).unwrap(), bound);
}

#[test]
fn relayer_fee_change_breaks_binding() {
    let (mut tx, bound) = compiled_unshield();
    tx.params.relayer.fee += 1;
    assert_ne!(tx.params.get_tx_integrity_hash(SLOT).unwrap(), bound);
}

#[test]
fn recipient_change_breaks_binding() {
    let (mut tx, bound) = compiled_unshield();
    tx.params.accounts.recipient_sol = Some(Pubkey::new_unique());
    assert_ne!(tx.params.get_tx_integrity_hash(SLOT).unwrap(), bound);
}

#[test]
fn ciphertext_change_breaks_binding() {
    let (mut tx, bound) = compiled_unshield();
    let bytes = tx.params.encrypted_utxos.as_mut().unwrap();
    bytes[1] ^= 0xff;
    assert_ne!(tx.params.get_tx_integrity_hash(SLOT).unwrap(), bound);
}

#[test]
fn compiled_input_carries_real_path() {
    let (tx, _) = compiled_unshield();
    let inputs = tx.proof_inputs().unwrap();
    let (provider, note) = setup();
    let tree = provider.sol_merkle_tree.as_ref().unwrap();

    assert_eq!(inputs.root, tree.root());
    let real = inputs
        .in_amounts
        .iter()
        .position(|a| *a == [Fr::from(10_000u64), Fr::from(0u64)])
        .unwrap();
    assert_eq!(inputs.in_path_indices[real], 0);
    let path = tree.merkle_tree.path(0).unwrap();
    assert_eq!(inputs.in_path_elements[real], path.path_elements);
    assert_eq!(inputs.public_amount_sol, -Fr::from(10_000u64));
    assert_eq!(
        inputs.input_nullifiers[real],
        {
            let mut spent = note.clone();
            spent.set_index(0);
            spent.nullifier(&provider.hasher).unwrap().to_field()
        }
    );
}
