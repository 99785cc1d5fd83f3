//! Local replica of the on-chain transaction Merkle tree
//!
//! Leaf insertion on-chain is two-phase: a transaction first writes its
//! output commitments into a leaves account (queued), and a later
//! instruction folds them into the tree. The replica is rebuilt from the
//! indexed history every time and only holds leaves the tree account has
//! already counted; the rest are kept aside as queued.

use shroud_privacy::hasher::fr_to_le_bytes;
use shroud_privacy::{Commitment, FieldHasher, Fr, MERKLE_TREE_HEIGHT, MerkleTree, Poseidon};
use shroud_pubkey::Pubkey;

use crate::error::{
    Result, SolMerkleTreeError, SolMerkleTreeErrorCode, TransactionError, TransactionErrorCode,
};
use crate::pda::leaves_pda;
use crate::provider::{Chain, IndexedTransaction};

/// Where a commitment stands in the two-phase insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafStatus {
    Inserted(u64),
    /// Written to a leaves account, not yet in the tree
    Queued,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct SolMerkleTree<H: FieldHasher = Poseidon> {
    pub pubkey: Pubkey,
    pub merkle_tree: MerkleTree<H>,
    /// Indexed leaves past the tree's next index, in leaf order
    queued: Vec<Commitment>,
}

impl<H: FieldHasher> SolMerkleTree<H> {
    pub fn new(pubkey: Pubkey, merkle_tree: MerkleTree<H>) -> Self {
        Self {
            pubkey,
            merkle_tree,
            queued: Vec::new(),
        }
    }

    /// Replay every indexed leaf into a fresh tree.
    pub fn build(pubkey: Pubkey, hasher: H, history: &[IndexedTransaction]) -> Result<Self> {
        Self::build_bounded(pubkey, hasher, history, None)
    }

    /// Replay history, inserting only leaves below `inserted` into the tree.
    pub fn build_bounded(
        pubkey: Pubkey,
        hasher: H,
        history: &[IndexedTransaction],
        inserted: Option<u64>,
    ) -> Result<Self> {
        let leaves = ordered_leaves(history)?;
        let split = inserted
            .map(|n| (n as usize).min(leaves.len()))
            .unwrap_or(leaves.len());
        let (tree_leaves, queued) = leaves.split_at(split);

        let fields: Vec<Fr> = tree_leaves.iter().map(Commitment::to_field).collect();
        let merkle_tree = MerkleTree::from_leaves(MERKLE_TREE_HEIGHT, hasher, &fields)?;

        log::info!(
            "rebuilt merkle tree {pubkey}: {} leaves, {} queued",
            merkle_tree.next_index(),
            queued.len()
        );
        Ok(Self {
            pubkey,
            merkle_tree,
            queued: queued.to_vec(),
        })
    }

    /// Fetch history and the tree account, then rebuild.
    pub async fn from_chain<C: Chain>(pubkey: Pubkey, hasher: H, chain: &C) -> Result<Self> {
        let history = chain.indexed_transactions(&pubkey).await?;
        let account = chain.merkle_tree_account(&pubkey).await?;
        let tree = Self::build_bounded(pubkey, hasher, &history, Some(account.next_index))?;
        if tree.merkle_tree.next_index() < account.next_index {
            return Err(SolMerkleTreeError::new(
                SolMerkleTreeErrorCode::LeafIndexMismatch,
                "SolMerkleTree::from_chain",
                format!(
                    "indexer has {} leaves, tree account has {}",
                    tree.merkle_tree.next_index(),
                    account.next_index
                ),
            )
            .into());
        }
        Ok(tree)
    }

    pub fn root(&self) -> Fr {
        self.merkle_tree.root()
    }

    pub fn index_of(&self, commitment: &Commitment) -> Option<u64> {
        self.merkle_tree.index_of(&commitment.to_field())
    }

    pub fn queued(&self) -> &[Commitment] {
        &self.queued
    }

    /// Slot of the local root in the on-chain root ring.
    pub async fn root_index<C: Chain>(&self, chain: &C) -> Result<u64> {
        root_index_of(chain, &self.pubkey, &self.root()).await
    }

    pub async fn leaf_status<C: Chain>(
        &self,
        chain: &C,
        merkle_tree_program: &Pubkey,
        commitment: &Commitment,
    ) -> Result<LeafStatus> {
        if let Some(index) = self.index_of(commitment) {
            return Ok(LeafStatus::Inserted(index));
        }
        let Some(position) = self.queued.iter().position(|c| c == commitment) else {
            return Ok(LeafStatus::Unknown);
        };
        // leaves accounts are seeded with the first commitment of their pair
        let absolute = self.merkle_tree.next_index() as usize + position;
        let leader = if absolute % 2 == 0 {
            self.queued[position]
        } else {
            match position.checked_sub(1) {
                Some(p) => self.queued[p],
                None => return Ok(LeafStatus::Unknown),
            }
        };
        let pda = leaves_pda(merkle_tree_program, &leader)?;
        if chain.account_exists(&pda).await? {
            Ok(LeafStatus::Queued)
        } else {
            Ok(LeafStatus::Unknown)
        }
    }

    /// Leaf index of `commitment`, or why it cannot be spent yet.
    pub async fn ensure_inserted<C: Chain>(
        &self,
        chain: &C,
        merkle_tree_program: &Pubkey,
        commitment: &Commitment,
    ) -> Result<u64> {
        const FN: &str = "SolMerkleTree::ensure_inserted";
        match self.leaf_status(chain, merkle_tree_program, commitment).await? {
            LeafStatus::Inserted(index) => Ok(index),
            LeafStatus::Queued => {
                log::warn!("leaf {commitment:?} queued, not yet in the tree");
                Err(SolMerkleTreeError::new(
                    SolMerkleTreeErrorCode::LeafQueued,
                    FN,
                    "leaf is queued for insertion",
                )
                .into())
            }
            LeafStatus::Unknown => Err(TransactionError::new(
                TransactionErrorCode::InputUtxoNotInsertedInMerkleTree,
                FN,
                "commitment not found in the merkle tree",
            )
            .into()),
        }
    }
}

/// Slot of `root` in the ring of the `merkle_tree` account.
pub async fn root_index_of<C: Chain>(chain: &C, merkle_tree: &Pubkey, root: &Fr) -> Result<u64> {
    let account = chain.merkle_tree_account(merkle_tree).await?;
    let root = fr_to_le_bytes(root);
    match account.roots.iter().position(|r| *r == root) {
        Some(index) => Ok(index as u64),
        None => {
            log::warn!(
                "root not in the ring of {merkle_tree} (current index {}), local tree is stale",
                account.current_root_index
            );
            Err(TransactionError::new(
                TransactionErrorCode::RootNotFound,
                "get_root_index",
                "root not found in the on-chain root history",
            )
            .into())
        }
    }
}

/// History leaves in leaf order, rejecting gaps and overlaps.
fn ordered_leaves(history: &[IndexedTransaction]) -> Result<Vec<Commitment>> {
    let mut sorted: Vec<&IndexedTransaction> =
        history.iter().filter(|tx| !tx.leaves.is_empty()).collect();
    sorted.sort_by_key(|tx| tx.first_leaf_index);

    let mut leaves = Vec::new();
    for tx in sorted {
        let expected = leaves.len() as u64;
        if tx.first_leaf_index != expected {
            return Err(SolMerkleTreeError::new(
                SolMerkleTreeErrorCode::LeafIndexMismatch,
                "SolMerkleTree::build",
                format!(
                    "transaction {} starts at leaf {}, expected {expected}",
                    tx.signature, tx.first_leaf_index
                ),
            )
            .into());
        }
        leaves.extend_from_slice(&tx.leaves);
    }
    Ok(leaves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn indexed(first: u64, leaves: &[u64]) -> IndexedTransaction {
        IndexedTransaction {
            signature: format!("tx-{first}"),
            first_leaf_index: first,
            leaves: leaves
                .iter()
                .map(|n| Commitment::from_field(Fr::from(*n)))
                .collect(),
            nullifiers: vec![],
            encrypted_utxos: vec![],
            relayer_fee: 0,
        }
    }

    #[test]
    fn test_build_orders_history() {
        let history = vec![indexed(2, &[3, 4]), indexed(0, &[1, 2])];
        let tree = SolMerkleTree::build(Pubkey::new_unique(), Poseidon::new(), &history).unwrap();
        assert_eq!(tree.merkle_tree.next_index(), 4);
        assert_eq!(tree.index_of(&Commitment::from_field(Fr::from(3u64))), Some(2));

        let expected = MerkleTree::from_leaves(
            MERKLE_TREE_HEIGHT,
            Poseidon::new(),
            &[1u64, 2, 3, 4].map(Fr::from),
        )
        .unwrap();
        assert_eq!(tree.root(), expected.root());
    }

    #[test]
    fn test_gap_and_overlap_rejected() {
        for history in [
            vec![indexed(0, &[1, 2]), indexed(4, &[3, 4])],
            vec![indexed(0, &[1, 2]), indexed(1, &[3, 4])],
        ] {
            let err = SolMerkleTree::build(Pubkey::new_unique(), Poseidon::new(), &history)
                .unwrap_err();
            assert!(matches!(
                err,
                Error::SolMerkleTree(ref e) if e.code == SolMerkleTreeErrorCode::LeafIndexMismatch
            ));
        }
    }

    #[test]
    fn test_bounded_build_keeps_queue() {
        let history = vec![indexed(0, &[1, 2]), indexed(2, &[3, 4])];
        let tree =
            SolMerkleTree::build_bounded(Pubkey::new_unique(), Poseidon::new(), &history, Some(2))
                .unwrap();
        assert_eq!(tree.merkle_tree.next_index(), 2);
        assert_eq!(tree.queued().len(), 2);
        assert_eq!(tree.index_of(&Commitment::from_field(Fr::from(3u64))), None);
    }
}
