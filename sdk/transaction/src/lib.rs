//! Shroud Transaction SDK
//!
//! Builds, proves and sends shielded pool transactions.
//!
//! # Flow
//!
//! ```text
//! Balance ──select_in_utxos──▶ inputs ─┐
//!                                      ├─▶ TransactionParameters ──▶ Transaction
//! recipients ──create_out_utxos──▶ outputs ┘        (validated)          │
//!                                                                       ▼
//!                        compile ─▶ get_proof ─▶ get_root_index ─▶ get_pdas ─▶ send
//! ```
//!
//! Chain reads, proving and submission sit behind the [`Chain`], [`Prover`]
//! and [`RelayerClient`] traits.

pub mod error;
pub mod outputs;
pub mod params;
pub mod pda;
pub mod provider;
pub mod relayer;
pub mod selection;
pub mod sol_merkle_tree;
pub mod sync;
pub mod transaction;
pub mod verifier;

pub use error::{Error, Result};
pub use outputs::{
    AppUtxoConfig, CreateOutUtxosRequest, PublicAmounts, Recipient, create_out_utxos,
    create_recipient_utxos, validate_utxo_amounts,
};
pub use params::{
    Action, N_ASSET_PUBKEYS, TransactionAccounts, TransactionParameters,
    TransactionParametersConfig, TxParamsRequest, encrypted_utxo_at, get_tx_params,
};
pub use provider::{Chain, IndexedTransaction, MerkleTreeAccount, Provider};
pub use relayer::{Relayer, RelayerClient};
pub use selection::{MAX_SELECTION_CANDIDATES, SelectInUtxosRequest, select_in_utxos};
pub use sol_merkle_tree::{LeafStatus, SolMerkleTree};
pub use sync::{SyncReport, sync_balance};
pub use transaction::{
    AppParameters, AssetIndices, Circuit, Proof, ProofInputs, Prover, RemainingAccounts,
    SendRequest, Transaction, TransactionStage,
};
pub use verifier::{VerifierConfig, VerifierKind};
