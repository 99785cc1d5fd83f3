//! Chain access and the per-wallet transaction context.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shroud_config::{PoolRuntime, ShroudConfig};
use shroud_privacy::{Commitment, FieldHasher, Nullifier, Poseidon, Registries};
use shroud_pubkey::Pubkey;

use crate::error::{Error, ProviderError, ProviderErrorCode, Result};
use crate::sol_merkle_tree::SolMerkleTree;

/// Snapshot of the on-chain Merkle tree account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleTreeAccount {
    /// Root ring, little-endian field bytes
    pub roots: Vec<[u8; 32]>,
    pub current_root_index: u64,
    /// Leaves inserted into the tree so far
    pub next_index: u64,
}

/// One pool transaction as served by an indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedTransaction {
    pub signature: String,
    /// Leaf index of `leaves[0]`
    pub first_leaf_index: u64,
    pub leaves: Vec<Commitment>,
    pub nullifiers: Vec<Nullifier>,
    /// Fixed-size slots, one per leaf
    pub encrypted_utxos: Vec<u8>,
    pub relayer_fee: u64,
}

/// Read access to the chain.
///
/// Account existence is the only state the pool exposes for nullifiers and
/// queued leaves.
#[async_trait]
pub trait Chain: Send + Sync {
    async fn account_exists(&self, address: &Pubkey) -> std::result::Result<bool, ProviderError>;

    async fn merkle_tree_account(
        &self,
        merkle_tree: &Pubkey,
    ) -> std::result::Result<MerkleTreeAccount, ProviderError>;

    /// Full transaction history of a tree, in any order.
    async fn indexed_transactions(
        &self,
        merkle_tree: &Pubkey,
    ) -> std::result::Result<Vec<IndexedTransaction>, ProviderError>;
}

/// Everything a transaction needs besides its notes.
#[derive(Debug, Clone)]
pub struct Provider<H: FieldHasher = Poseidon> {
    pub hasher: H,
    /// Public key of the signing wallet, required for shields
    pub wallet: Option<Pubkey>,
    pub sol_merkle_tree: Option<SolMerkleTree<H>>,
    pub registries: Registries,
    pub pool: PoolRuntime,
}

impl Provider<Poseidon> {
    pub fn from_config(config: &ShroudConfig, wallet: Option<Pubkey>) -> Result<Self> {
        let registries = Registries::from_config(config).map_err(shroud_privacy::Error::from)?;
        let pool = config.pool_runtime().map_err(|e| {
            ProviderError::new(
                ProviderErrorCode::InvalidConfig,
                "Provider::from_config",
                format!("{e:#}"),
            )
        })?;
        Ok(Self::new(Poseidon::new(), wallet, registries, pool))
    }
}

impl<H: FieldHasher + Clone> Provider<H> {
    pub fn new(
        hasher: H,
        wallet: Option<Pubkey>,
        registries: Registries,
        pool: PoolRuntime,
    ) -> Self {
        Self {
            hasher,
            wallet,
            sol_merkle_tree: None,
            registries,
            pool,
        }
    }

    pub fn with_merkle_tree(mut self, tree: SolMerkleTree<H>) -> Self {
        self.sol_merkle_tree = Some(tree);
        self
    }

    /// Replay the transaction tree from chain history.
    pub async fn latest_merkle_tree<C: Chain>(&mut self, chain: &C) -> Result<&SolMerkleTree<H>> {
        let tree =
            SolMerkleTree::from_chain(self.pool.transaction_merkle_tree, self.hasher.clone(), chain)
                .await?;
        Ok(self.sol_merkle_tree.insert(tree))
    }

    pub fn merkle_tree(&self, function: &'static str) -> Result<&SolMerkleTree<H>> {
        self.sol_merkle_tree.as_ref().ok_or_else(|| {
            Error::from(ProviderError::new(
                ProviderErrorCode::SolMerkleTreeUndefined,
                function,
                "provider has no merkle tree, fetch it first",
            ))
        })
    }

    pub fn wallet(&self, function: &'static str) -> Result<Pubkey> {
        self.wallet.ok_or_else(|| {
            Error::from(ProviderError::new(
                ProviderErrorCode::WalletUndefined,
                function,
                "provider has no wallet",
            ))
        })
    }
}
