//! Transaction state machine
//!
//! A [`Transaction`] moves through four stages. Each stage only consumes what
//! the previous one produced, so calling them out of order fails with a
//! stage-specific code instead of sending something half-built.
//!
//! ```text
//!  Constructed ──compile──▶ Compiled ──get_proof──▶ Proved ──send──▶ Sent
//!                              │                      │
//!                              ├─ get_root_index ─────┤
//!                              └─ get_pdas ───────────┘
//! ```
//!
//! Compilation snapshots the provider's Merkle tree. The root index is looked
//! up for that snapshot root, so a tree refreshed between compile and send
//! cannot pair a proof with the wrong root.

use std::collections::BTreeMap;

use ark_ff::Zero;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use shroud_privacy::hasher::{fr_to_be_bytes, hash_and_truncate_to_circuit};
use shroud_privacy::{
    Commitment, FieldHasher, Fr, MerklePath, N_ASSETS, Nullifier, Utxo,
};
use shroud_pubkey::Pubkey;

use crate::error::{
    Result, SolMerkleTreeError, SolMerkleTreeErrorCode, TransactionError, TransactionErrorCode,
};
use crate::params::{Action, N_ASSET_PUBKEYS, TransactionAccounts, TransactionParameters};
use crate::pda::{leaves_pda, nullifier_pda, verifier_state_pda};
use crate::provider::{Chain, Provider};
use crate::relayer::RelayerClient;
use crate::sol_merkle_tree::{SolMerkleTree, root_index_of};
use crate::verifier::VerifierKind;

/// One-hot asset rows of a note, one row per asset slot.
pub type AssetIndices = [[u8; N_ASSET_PUBKEYS]; N_ASSETS];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransactionStage {
    Constructed,
    Compiled,
    Proved,
    Sent,
}

/// Public inputs of the app circuit that verifies alongside the system one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppParameters {
    /// App verifier program, the owner of the app notes
    pub verifier: Pubkey,
    pub inputs: BTreeMap<String, Fr>,
}

/// Everything the system circuit consumes, fixed to the verifier's width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofInputs {
    pub root: Fr,
    pub input_nullifiers: Vec<Fr>,
    pub output_commitments: Vec<Fr>,
    pub public_amount_sol: Fr,
    pub public_amount_spl: Fr,
    pub public_mint_pubkey: Fr,
    pub tx_integrity_hash: Fr,

    pub in_private_keys: Vec<Fr>,
    pub in_path_indices: Vec<u64>,
    pub in_path_elements: Vec<Vec<Fr>>,
    pub in_amounts: Vec<[Fr; N_ASSETS]>,
    pub in_blindings: Vec<Fr>,
    pub in_indices: Vec<AssetIndices>,
    pub in_app_data_hash: Vec<Fr>,
    pub in_pool_type: Vec<Fr>,
    pub in_verifier_pubkey: Vec<Fr>,

    pub out_amounts: Vec<[Fr; N_ASSETS]>,
    pub out_blindings: Vec<Fr>,
    pub out_pubkeys: Vec<Fr>,
    pub out_indices: Vec<AssetIndices>,
    pub out_app_data_hash: Vec<Fr>,
    pub out_pool_type: Vec<Fr>,
    pub out_verifier_pubkey: Vec<Fr>,

    pub asset_pubkeys: [Fr; N_ASSET_PUBKEYS],

    /// App verifiers only
    pub transaction_hash: Option<Fr>,
    pub public_app_verifier: Option<Fr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub proof: Vec<u8>,
    /// Big-endian field elements, in circuit order
    pub public_inputs: Vec<[u8; 32]>,
}

/// Circuit a proof is requested for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Circuit {
    System(VerifierKind),
    App(AppParameters),
}

/// Proof backend.
///
/// The transaction layer does not interpret why proving fails, only that it
/// did.
#[async_trait]
pub trait Prover: Send + Sync {
    type Error: std::fmt::Display + Send;

    async fn prove(&self, circuit: &Circuit, inputs: &ProofInputs) -> Result<Proof, Self::Error>;

    async fn verify(&self, circuit: &Circuit, proof: &Proof) -> Result<bool, Self::Error>;
}

/// Accounts the pool program creates or touches besides the fixed ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemainingAccounts {
    pub nullifier_pdas: Vec<Pubkey>,
    /// One per output pair
    pub leaves_pdas: Vec<Pubkey>,
    pub verifier_state: Pubkey,
    /// Next (transaction, event) trees once the current tree is nearly full
    pub next_merkle_trees: Option<(Pubkey, Pubkey)>,
}

/// What a relayer or wallet needs to build and sign the instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub action: Action,
    pub verifier: VerifierKind,
    pub accounts: TransactionAccounts,
    pub proof: Proof,
    pub app_proof: Option<Proof>,
    pub root_index: u64,
    pub public_amount_sol: [u8; 32],
    pub public_amount_spl: [u8; 32],
    pub public_mint: [u8; 32],
    pub tx_integrity_hash: [u8; 32],
    pub nullifiers: Vec<Nullifier>,
    pub leaves: Vec<Commitment>,
    pub encrypted_utxos: Vec<u8>,
    pub relayer_fee: u64,
    pub remaining_accounts: RemainingAccounts,
}

fn tx_error(
    code: TransactionErrorCode,
    function: &'static str,
    message: impl Into<String>,
) -> TransactionError {
    TransactionError::new(code, function, message)
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub params: TransactionParameters,
    pub app_params: Option<AppParameters>,
    stage: TransactionStage,
    shuffle: bool,
    proof_inputs: Option<ProofInputs>,
    proof: Option<Proof>,
    app_proof: Option<Proof>,
    root_index: Option<u64>,
    remaining_accounts: Option<RemainingAccounts>,
    signature: Option<String>,
}

impl Transaction {
    pub fn new<H: FieldHasher + Clone>(
        provider: &Provider<H>,
        params: TransactionParameters,
        app_params: Option<AppParameters>,
    ) -> Result<Self> {
        const FN: &str = "Transaction::new";

        let has_app_data = params.verifier.config().has_app_data;
        match (&app_params, has_app_data) {
            (None, true) => {
                return Err(tx_error(
                    TransactionErrorCode::AppParametersUndefined,
                    FN,
                    "app verifier selected without app parameters",
                )
                .into());
            }
            (Some(_), false) => {
                return Err(tx_error(
                    TransactionErrorCode::InvalidVerifierSelected,
                    FN,
                    format!("{:?} verifier takes no app parameters", params.verifier),
                )
                .into());
            }
            _ => {}
        }
        if provider.sol_merkle_tree.is_none() {
            return Err(SolMerkleTreeError::new(
                SolMerkleTreeErrorCode::MerkleTreeUndefined,
                FN,
                "provider has no merkle tree",
            )
            .into());
        }
        if params.action == Action::Shield {
            provider.wallet(FN)?;
        }

        Ok(Self {
            params,
            app_params,
            stage: TransactionStage::Constructed,
            shuffle: provider.pool.shuffle,
            proof_inputs: None,
            proof: None,
            app_proof: None,
            root_index: None,
            remaining_accounts: None,
            signature: None,
        })
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn stage(&self) -> TransactionStage {
        self.stage
    }

    pub fn proof_inputs(&self) -> Option<&ProofInputs> {
        self.proof_inputs.as_ref()
    }

    pub fn proof(&self) -> Option<&Proof> {
        self.proof.as_ref()
    }

    pub fn root_index(&self) -> Option<u64> {
        self.root_index
    }

    pub fn remaining_accounts(&self) -> Option<&RemainingAccounts> {
        self.remaining_accounts.as_ref()
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    // ========================================================================
    // Compile
    // ========================================================================

    /// Encrypt the outputs, bind the integrity hash and assemble the circuit
    /// inputs against the provider's current tree.
    pub fn compile<H: FieldHasher + Clone>(
        &mut self,
        provider: &Provider<H>,
    ) -> Result<&ProofInputs> {
        const FN: &str = "Transaction::compile";
        if self.stage != TransactionStage::Constructed {
            return Err(tx_error(
                TransactionErrorCode::TxAlreadyCompiled,
                FN,
                format!("transaction is {:?}", self.stage),
            )
            .into());
        }
        if let Some(utxo) = self
            .params
            .input_utxos
            .iter()
            .chain(&self.params.output_utxos)
            .find(|u| u.pool_type() != 0)
        {
            return Err(tx_error(
                TransactionErrorCode::InvalidPoolType,
                FN,
                format!("pool type {} is not supported", utxo.pool_type()),
            )
            .into());
        }
        let hasher = &provider.hasher;
        let tree = provider.merkle_tree(FN)?;

        // ciphertexts are bound to slot order, shuffle only before encrypting
        if self.shuffle && self.params.encrypted_utxos.is_none() {
            let mut rng = rand::thread_rng();
            self.params.input_utxos.shuffle(&mut rng);
            self.params.output_utxos.shuffle(&mut rng);
        }

        self.params
            .encrypt_utxos(hasher, provider.pool.encrypted_utxo_slot_size)?;
        let tx_integrity_hash = self
            .params
            .get_tx_integrity_hash(provider.pool.encrypted_utxo_slot_size)?;

        let paths = self.get_merkle_proofs(tree)?;

        let params = &self.params;
        let input_nullifiers = params
            .input_utxos
            .iter()
            .map(|u| u.nullifier(hasher).map(|n| n.to_field()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let in_private_keys = params
            .input_utxos
            .iter()
            .map(|u| u.account().spending_key(FN))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let (transaction_hash, public_app_verifier) = match &self.app_params {
            Some(app) => (
                Some(self.transaction_hash(hasher, tx_integrity_hash)),
                Some(hash_and_truncate_to_circuit(app.verifier.as_bytes())),
            ),
            None => (None, None),
        };

        let amounts = |u: &Utxo| u.amounts().map(Fr::from);
        let ins = &params.input_utxos;
        let outs = &params.output_utxos;
        let inputs = ProofInputs {
            root: tree.root(),
            input_nullifiers,
            output_commitments: outs.iter().map(|u| u.commitment(hasher).to_field()).collect(),
            public_amount_sol: params.public_amount_sol,
            public_amount_spl: params.public_amount_spl,
            public_mint_pubkey: self.get_mint(),
            tx_integrity_hash,

            in_private_keys,
            in_path_indices: paths.iter().map(|p| p.path_index).collect(),
            in_path_elements: paths.into_iter().map(|p| p.path_elements).collect(),
            in_amounts: ins.iter().map(amounts).collect(),
            in_blindings: ins.iter().map(Utxo::blinding).collect(),
            in_indices: self.get_indices(ins),
            in_app_data_hash: ins.iter().map(Utxo::app_data_hash).collect(),
            in_pool_type: ins.iter().map(|u| Fr::from(u.pool_type())).collect(),
            in_verifier_pubkey: ins.iter().map(Utxo::verifier_address_circuit).collect(),

            out_amounts: outs.iter().map(amounts).collect(),
            out_blindings: outs.iter().map(Utxo::blinding).collect(),
            out_pubkeys: outs.iter().map(|u| u.account().pubkey()).collect(),
            out_indices: self.get_indices(outs),
            out_app_data_hash: outs.iter().map(Utxo::app_data_hash).collect(),
            out_pool_type: outs.iter().map(|u| Fr::from(u.pool_type())).collect(),
            out_verifier_pubkey: outs.iter().map(Utxo::verifier_address_circuit).collect(),

            asset_pubkeys: params.asset_pubkeys_circuit,
            transaction_hash,
            public_app_verifier,
        };

        log::info!(
            "compiled {:?} with {:?} verifier against root index of tree {}",
            params.action,
            params.verifier,
            tree.pubkey
        );
        self.stage = TransactionStage::Compiled;
        Ok(self.proof_inputs.insert(inputs))
    }

    /// Circuit form of the SPL mint, zero when no SPL moves publicly.
    pub fn get_mint(&self) -> Fr {
        if self.params.public_amount_spl.is_zero() {
            Fr::zero()
        } else {
            self.params.asset_pubkeys_circuit[1]
        }
    }

    /// One-hot rows over the asset table for every note and asset slot.
    /// Zero-amount slots get an all-zero row.
    pub fn get_indices(&self, utxos: &[Utxo]) -> Vec<AssetIndices> {
        let table = &self.params.asset_pubkeys_circuit;
        utxos
            .iter()
            .map(|utxo| {
                let mut rows = [[0u8; N_ASSET_PUBKEYS]; N_ASSETS];
                let amounts = utxo.amounts();
                let assets = utxo.assets_circuit();
                for (slot, row) in rows.iter_mut().enumerate() {
                    if amounts[slot] == 0 {
                        continue;
                    }
                    if let Some(j) = table.iter().position(|a| *a == assets[slot]) {
                        row[j] = 1;
                    }
                }
                rows
            })
            .collect()
    }

    /// Paths for every input, recording leaf indices on the notes. Padding
    /// inputs get the all-zero path and leaf index 0.
    pub fn get_merkle_proofs<H: FieldHasher>(
        &mut self,
        tree: &SolMerkleTree<H>,
    ) -> Result<Vec<MerklePath>> {
        let height = tree.merkle_tree.height();
        let hasher = tree.merkle_tree.hasher();
        self.params
            .input_utxos
            .iter_mut()
            .map(|utxo| {
                if utxo.is_empty() {
                    utxo.set_index(0);
                    return Ok(MerklePath::zero(height));
                }
                let commitment = utxo.commitment(hasher);
                let index = tree.index_of(&commitment).ok_or_else(|| {
                    tx_error(
                        TransactionErrorCode::InputUtxoNotInsertedInMerkleTree,
                        "Transaction::get_merkle_proofs",
                        format!("input {commitment:?} is not in tree {}", tree.pubkey),
                    )
                })?;
                utxo.set_index(index);
                Ok(tree.merkle_tree.path(index)?)
            })
            .collect()
    }

    /// `H(H(input commitments), H(output commitments), integrity hash)`,
    /// binding an app proof to this exact system transaction.
    pub fn get_transaction_hash(&self, hasher: &impl FieldHasher) -> Result<Fr> {
        let inputs = self.proof_inputs.as_ref().ok_or_else(|| {
            tx_error(
                TransactionErrorCode::TxNotCompiled,
                "Transaction::get_transaction_hash",
                "compile first",
            )
        })?;
        Ok(self.transaction_hash(hasher, inputs.tx_integrity_hash))
    }

    fn transaction_hash(&self, hasher: &impl FieldHasher, tx_integrity_hash: Fr) -> Fr {
        let commitments = |utxos: &[Utxo]| -> Vec<Fr> {
            utxos.iter().map(|u| u.commitment(hasher).to_field()).collect()
        };
        let ins = hasher.hash(&commitments(&self.params.input_utxos));
        let outs = hasher.hash(&commitments(&self.params.output_utxos));
        hasher.hash(&[ins, outs, tx_integrity_hash])
    }

    /// Fails while an input is still queued or unknown to the tree.
    pub async fn ensure_inputs_inserted<H: FieldHasher + Clone, C: Chain>(
        &self,
        provider: &Provider<H>,
        chain: &C,
    ) -> Result<()> {
        let tree = provider.merkle_tree("Transaction::ensure_inputs_inserted")?;
        let program = &provider.pool.merkle_tree_program;
        for utxo in self.params.spent_utxos() {
            tree.ensure_inserted(chain, program, &utxo.commitment(&provider.hasher))
                .await?;
        }
        Ok(())
    }

    // ========================================================================
    // Prove
    // ========================================================================

    pub async fn get_proof<P: Prover>(&mut self, prover: &P) -> Result<&Proof> {
        const FN: &str = "Transaction::get_proof";
        if self.stage == TransactionStage::Sent {
            return Err(tx_error(
                TransactionErrorCode::TxAlreadyCompiled,
                FN,
                "transaction already sent",
            )
            .into());
        }
        let inputs = self.proof_inputs.as_ref().ok_or_else(|| {
            tx_error(TransactionErrorCode::ProofInputUndefined, FN, "compile first")
        })?;

        let proof = prove_and_verify(prover, &Circuit::System(self.params.verifier), inputs).await?;
        let app_proof = match &self.app_params {
            Some(app) => Some(prove_and_verify(prover, &Circuit::App(app.clone()), inputs).await?),
            None => None,
        };

        log::info!("proved {:?} transaction", self.params.action);
        self.app_proof = app_proof;
        self.stage = TransactionStage::Proved;
        Ok(self.proof.insert(proof))
    }

    // ========================================================================
    // Chain bookkeeping
    // ========================================================================

    /// Slot of the compiled root in the on-chain root ring.
    pub async fn get_root_index<C: Chain>(&mut self, chain: &C) -> Result<u64> {
        let root = self
            .proof_inputs
            .as_ref()
            .ok_or_else(|| {
                tx_error(
                    TransactionErrorCode::TxNotCompiled,
                    "Transaction::get_root_index",
                    "compile first",
                )
            })?
            .root;
        let merkle_tree = &self.params.accounts.transaction_merkle_tree;
        let index = root_index_of(chain, merkle_tree, &root).await?;
        log::debug!("root index {index}");
        self.root_index = Some(index);
        Ok(index)
    }

    /// Nullifier, leaves and verifier state accounts, plus the next trees
    /// once the current one passed the rollover threshold.
    pub fn get_pdas<H: FieldHasher + Clone>(
        &mut self,
        provider: &Provider<H>,
    ) -> Result<&RemainingAccounts> {
        const FN: &str = "Transaction::get_pdas";
        let inputs = self
            .proof_inputs
            .as_ref()
            .ok_or_else(|| tx_error(TransactionErrorCode::TxNotCompiled, FN, "compile first"))?;
        let program = &provider.pool.merkle_tree_program;

        let nullifier_pdas = inputs
            .input_nullifiers
            .iter()
            .map(|n| nullifier_pda(program, &Nullifier::from_field(*n)))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let leaves_pdas = inputs
            .output_commitments
            .chunks(2)
            .map(|pair| leaves_pda(program, &Commitment::from_field(pair[0])))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let verifier_state = verifier_state_pda(
            &self.params.accounts.verifier_program,
            &self.params.accounts.signer,
        )?;

        let next_index = provider.merkle_tree(FN)?.merkle_tree.next_index();
        let next_merkle_trees = if next_index >= provider.pool.rollover_threshold {
            if provider.pool.next_trees.is_none() {
                log::warn!(
                    "tree at leaf {next_index} passed rollover threshold {}, no next trees set",
                    provider.pool.rollover_threshold
                );
            }
            provider.pool.next_trees
        } else {
            None
        };

        Ok(self.remaining_accounts.insert(RemainingAccounts {
            nullifier_pdas,
            leaves_pdas,
            verifier_state,
            next_merkle_trees,
        }))
    }

    /// Compile, prove and resolve everything `send` needs.
    pub async fn compile_and_prove<H: FieldHasher + Clone, C: Chain, P: Prover>(
        &mut self,
        provider: &Provider<H>,
        chain: &C,
        prover: &P,
    ) -> Result<()> {
        self.ensure_inputs_inserted(provider, chain).await?;
        self.compile(provider)?;
        self.get_proof(prover).await?;
        self.get_root_index(chain).await?;
        self.get_pdas(provider)?;
        Ok(())
    }

    // ========================================================================
    // Send
    // ========================================================================

    /// Build the submission from the proved state.
    pub fn send_request(&self) -> Result<SendRequest> {
        const FN: &str = "Transaction::send";
        let (Some(proof), Some(inputs)) = (&self.proof, &self.proof_inputs) else {
            return Err(tx_error(TransactionErrorCode::ProofUndefined, FN, "prove first").into());
        };
        let root_index = self
            .root_index
            .ok_or_else(|| {
                tx_error(
                    TransactionErrorCode::RootIndexNotFetched,
                    FN,
                    "fetch the root index first",
                )
            })?;
        let remaining_accounts = self.remaining_accounts.clone().ok_or_else(|| {
            tx_error(TransactionErrorCode::RemainingAccountsNotCreated, FN, "derive the pdas first")
        })?;

        Ok(SendRequest {
            action: self.params.action,
            verifier: self.params.verifier,
            accounts: self.params.accounts.clone(),
            proof: proof.clone(),
            app_proof: self.app_proof.clone(),
            root_index,
            public_amount_sol: fr_to_be_bytes(&inputs.public_amount_sol),
            public_amount_spl: fr_to_be_bytes(&inputs.public_amount_spl),
            public_mint: fr_to_be_bytes(&inputs.public_mint_pubkey),
            tx_integrity_hash: fr_to_be_bytes(&inputs.tx_integrity_hash),
            nullifiers: inputs
                .input_nullifiers
                .iter()
                .copied()
                .map(Nullifier::from_field)
                .collect(),
            leaves: inputs.output_commitments.iter().copied().map(Commitment::from_field).collect(),
            encrypted_utxos: self.params.encrypted_utxos.clone().unwrap_or_default(),
            relayer_fee: self.params.relayer.fee,
            remaining_accounts,
        })
    }

    pub async fn send<R: RelayerClient + ?Sized>(&mut self, client: &R) -> Result<&str> {
        let request = self.send_request()?;
        let signature = client.send_transaction(&request).await.map_err(|e| {
            log::error!("sending {:?} failed: {e}", request.action);
            tx_error(
                TransactionErrorCode::SendTransactionFailed,
                "Transaction::send",
                e.to_string(),
            )
        })?;

        log::info!("sent {:?} transaction {signature}", self.params.action);
        self.stage = TransactionStage::Sent;
        Ok(self.signature.insert(signature))
    }

    /// Every nullifier account exists once the transaction landed.
    pub async fn check_balances<C: Chain>(&self, chain: &C) -> Result<()> {
        const FN: &str = "Transaction::check_balances";
        if self.stage != TransactionStage::Sent {
            return Err(tx_error(TransactionErrorCode::TxNotSent, FN, "send first").into());
        }
        let accounts = self.remaining_accounts.as_ref().ok_or_else(|| {
            tx_error(TransactionErrorCode::RemainingAccountsNotCreated, FN, "derive the pdas first")
        })?;
        for pda in &accounts.nullifier_pdas {
            if !chain.account_exists(pda).await? {
                return Err(tx_error(
                    TransactionErrorCode::NullifierNotInserted,
                    FN,
                    format!("nullifier account {pda} missing"),
                )
                .into());
            }
        }
        Ok(())
    }
}

async fn prove_and_verify<P: Prover>(
    prover: &P,
    circuit: &Circuit,
    inputs: &ProofInputs,
) -> Result<Proof> {
    const FN: &str = "Transaction::get_proof";
    let failed =
        |e: P::Error| tx_error(TransactionErrorCode::ProofGenerationFailed, FN, e.to_string());

    let proof = prover.prove(circuit, inputs).await.map_err(failed)?;
    if !prover.verify(circuit, &proof).await.map_err(failed)? {
        return Err(
            tx_error(TransactionErrorCode::InvalidProof, FN, "proof does not verify").into(),
        );
    }
    Ok(proof)
}
