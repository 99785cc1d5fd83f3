//! Merkle Tree for Note Commitments
//!
//! An append-only sparse Merkle tree over commitments, kept in insertion
//! order so a commitment's leaf index can be looked up.
//!
//! ```text
//!                    Root
//!                   /    \
//!                 H01    H23
//!                /  \   /   \
//!               C0  C1 C2   Z0      Z_k = empty subtree root at level k
//! ```

use std::collections::HashMap;

use ark_bn254::Fr;
use ark_ff::Zero;

use crate::commitment::Commitment;
use crate::error::{MerkleTreeError, MerkleTreeErrorCode};
use crate::hasher::{FieldHasher, Poseidon};

/// Tree height of the pool (2^18 leaves).
pub const MERKLE_TREE_HEIGHT: usize = 18;
/// Number of recent roots the pool accepts proofs against.
pub const MERKLE_TREE_HISTORY_SIZE: usize = 256;

/// Inclusion proof for one leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerklePath {
    /// Siblings from leaf to root
    pub path_elements: Vec<Fr>,
    /// Leaf index; bit k set means the node at level k is a right child
    pub path_index: u64,
}

impl MerklePath {
    /// Path handed to the circuit for unused inputs.
    pub fn zero(height: usize) -> Self {
        Self {
            path_elements: vec![Fr::zero(); height],
            path_index: 0,
        }
    }

    pub fn compute_root(&self, hasher: &impl FieldHasher, leaf: Fr) -> Fr {
        let mut current = leaf;
        for (level, sibling) in self.path_elements.iter().enumerate() {
            current = if (self.path_index >> level) & 1 == 1 {
                hasher.hash2(*sibling, current)
            } else {
                hasher.hash2(current, *sibling)
            };
        }
        current
    }

    pub fn verify(&self, hasher: &impl FieldHasher, leaf: Fr, root: Fr) -> bool {
        self.compute_root(hasher, leaf) == root
    }
}

/// Sparse Merkle tree; only non-empty nodes are stored.
#[derive(Debug, Clone)]
pub struct MerkleTree<H: FieldHasher = Poseidon> {
    height: usize,
    /// Non-empty nodes: (level, index) -> hash
    nodes: HashMap<(usize, u64), Fr>,
    /// Leaves in insertion order
    leaves: Vec<Fr>,
    leaf_positions: HashMap<[u8; 32], u64>,
    /// Empty subtree root per level, `zeros[0]` is the empty leaf
    zeros: Vec<Fr>,
    root: Fr,
    hasher: H,
}

impl MerkleTree<Poseidon> {
    pub fn new(height: usize) -> Self {
        Self::with_hasher(height, Poseidon::new())
    }
}

impl<H: FieldHasher> MerkleTree<H> {
    pub fn with_hasher(height: usize, hasher: H) -> Self {
        let mut zeros = Vec::with_capacity(height + 1);
        zeros.push(hasher.hash(&[Fr::zero()]));
        for level in 0..height {
            let below = zeros[level];
            zeros.push(hasher.hash2(below, below));
        }
        let root = zeros[height];

        Self {
            height,
            nodes: HashMap::new(),
            leaves: Vec::new(),
            leaf_positions: HashMap::new(),
            zeros,
            root,
            hasher,
        }
    }

    /// Build from leaves in order.
    pub fn from_leaves(height: usize, hasher: H, leaves: &[Fr]) -> Result<Self, MerkleTreeError> {
        let mut tree = Self::with_hasher(height, hasher);
        tree.bulk_insert(leaves)?;
        Ok(tree)
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    pub fn root(&self) -> Fr {
        self.root
    }

    /// Index the next inserted leaf will get.
    pub fn next_index(&self) -> u64 {
        self.leaves.len() as u64
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.height
    }

    pub fn elements(&self) -> &[Fr] {
        &self.leaves
    }

    pub fn insert(&mut self, leaf: Fr) -> Result<u64, MerkleTreeError> {
        let position = self.next_index();
        if position >= self.capacity() {
            return Err(MerkleTreeError::new(
                MerkleTreeErrorCode::TreeFull,
                "MerkleTree::insert",
                format!("all {} leaves used", self.capacity()),
            ));
        }

        self.nodes.insert((0, position), leaf);
        let mut current_index = position;
        let mut current_hash = leaf;
        for level in 0..self.height {
            let sibling = self.node(level, current_index ^ 1);
            current_hash = if current_index & 1 == 1 {
                self.hasher.hash2(sibling, current_hash)
            } else {
                self.hasher.hash2(current_hash, sibling)
            };
            current_index /= 2;
            self.nodes.insert((level + 1, current_index), current_hash);
        }

        self.root = current_hash;
        self.leaves.push(leaf);
        self.leaf_positions
            .entry(Commitment::from_field(leaf).0)
            .or_insert(position);
        Ok(position)
    }

    pub fn bulk_insert(&mut self, leaves: &[Fr]) -> Result<(), MerkleTreeError> {
        if self.next_index() + leaves.len() as u64 > self.capacity() {
            return Err(MerkleTreeError::new(
                MerkleTreeErrorCode::TreeFull,
                "MerkleTree::bulk_insert",
                format!(
                    "{} + {} leaves exceed capacity {}",
                    self.next_index(),
                    leaves.len(),
                    self.capacity()
                ),
            ));
        }
        for leaf in leaves {
            self.insert(*leaf)?;
        }
        Ok(())
    }

    fn node(&self, level: usize, index: u64) -> Fr {
        self.nodes
            .get(&(level, index))
            .copied()
            .unwrap_or(self.zeros[level])
    }

    pub fn path(&self, position: u64) -> Result<MerklePath, MerkleTreeError> {
        if position >= self.next_index() {
            return Err(MerkleTreeError::new(
                MerkleTreeErrorCode::LeafIndexOutOfRange,
                "MerkleTree::path",
                format!("leaf {position} of {}", self.next_index()),
            ));
        }

        let mut path_elements = Vec::with_capacity(self.height);
        let mut current_index = position;
        for level in 0..self.height {
            path_elements.push(self.node(level, current_index ^ 1));
            current_index /= 2;
        }

        Ok(MerklePath {
            path_elements,
            path_index: position,
        })
    }

    /// First position of `leaf`, `None` if it was never inserted.
    pub fn index_of(&self, leaf: &Fr) -> Option<u64> {
        self.leaf_positions
            .get(&Commitment::from_field(*leaf).0)
            .copied()
    }

    pub fn get(&self, position: u64) -> Option<Fr> {
        self.leaves.get(position as usize).copied()
    }
}

/// Ring of recent roots, laid out the way the on-chain account stores them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootHistory {
    roots: Vec<Fr>,
    current_index: usize,
}

impl RootHistory {
    pub fn new(capacity: usize, initial_root: Fr) -> Self {
        let mut roots = vec![Fr::zero(); capacity.max(1)];
        roots[0] = initial_root;
        Self {
            roots,
            current_index: 0,
        }
    }

    /// Rebuild from an account snapshot.
    pub fn from_parts(roots: Vec<Fr>, current_index: usize) -> Option<Self> {
        (current_index < roots.len()).then_some(Self {
            roots,
            current_index,
        })
    }

    pub fn push(&mut self, root: Fr) {
        self.current_index = (self.current_index + 1) % self.roots.len();
        self.roots[self.current_index] = root;
    }

    /// Slot of `root` in the ring, the `root_index` a proof refers to.
    pub fn position(&self, root: &Fr) -> Option<usize> {
        self.roots.iter().position(|r| r == root)
    }

    pub fn is_valid(&self, root: &Fr) -> bool {
        self.position(root).is_some()
    }

    pub fn current(&self) -> Fr {
        self.roots[self.current_index]
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u64) -> Fr {
        Fr::from(n)
    }

    #[test]
    fn test_empty_tree() {
        let tree = MerkleTree::new(MERKLE_TREE_HEIGHT);
        assert_eq!(tree.next_index(), 0);
        let h = Poseidon::new();
        let mut expected = h.hash(&[Fr::zero()]);
        for _ in 0..MERKLE_TREE_HEIGHT {
            expected = h.hash2(expected, expected);
        }
        assert_eq!(tree.root(), expected);
    }

    #[test]
    fn test_insert_and_path() {
        let h = Poseidon::new();
        let mut tree = MerkleTree::new(MERKLE_TREE_HEIGHT);
        assert_eq!(tree.insert(leaf(1)).unwrap(), 0);
        assert_eq!(tree.insert(leaf(2)).unwrap(), 1);
        assert_eq!(tree.insert(leaf(3)).unwrap(), 2);

        for (i, l) in [leaf(1), leaf(2), leaf(3)].into_iter().enumerate() {
            let path = tree.path(i as u64).unwrap();
            assert_eq!(path.path_elements.len(), MERKLE_TREE_HEIGHT);
            assert!(path.verify(&h, l, tree.root()));
            assert!(!path.verify(&h, leaf(99), tree.root()));
        }
        assert!(tree.path(3).is_err());
    }

    #[test]
    fn test_small_tree_matches_manual_hashing() {
        let h = Poseidon::new();
        let tree =
            MerkleTree::from_leaves(2, Poseidon::new(), &[leaf(1), leaf(2), leaf(3)]).unwrap();
        let zero = h.hash(&[Fr::zero()]);
        let expected = h.hash2(h.hash2(leaf(1), leaf(2)), h.hash2(leaf(3), zero));
        assert_eq!(tree.root(), expected);
    }

    #[test]
    fn test_index_of() {
        let tree = MerkleTree::from_leaves(
            MERKLE_TREE_HEIGHT,
            Poseidon::new(),
            &[leaf(10), leaf(20), leaf(10)],
        )
        .unwrap();
        assert_eq!(tree.index_of(&leaf(10)), Some(0));
        assert_eq!(tree.index_of(&leaf(20)), Some(1));
        assert_eq!(tree.index_of(&leaf(30)), None);
        assert_eq!(tree.elements().len(), 3);
    }

    #[test]
    fn test_tree_full() {
        let mut tree = MerkleTree::new(1);
        tree.insert(leaf(1)).unwrap();
        tree.insert(leaf(2)).unwrap();
        let err = tree.insert(leaf(3)).unwrap_err();
        assert_eq!(err.code, MerkleTreeErrorCode::TreeFull);
        assert!(MerkleTree::new(1).bulk_insert(&[leaf(1), leaf(2), leaf(3)]).is_err());
    }

    #[test]
    fn test_zero_path() {
        let path = MerklePath::zero(MERKLE_TREE_HEIGHT);
        assert_eq!(path.path_elements.len(), MERKLE_TREE_HEIGHT);
        assert!(path.path_elements.iter().all(|e| e.is_zero()));
        assert_eq!(path.path_index, 0);
    }

    #[test]
    fn test_root_history_ring() {
        let mut history = RootHistory::new(3, leaf(100));
        history.push(leaf(1));
        history.push(leaf(2));
        assert_eq!(history.position(&leaf(100)), Some(0));
        assert_eq!(history.position(&leaf(2)), Some(2));
        assert_eq!(history.current(), leaf(2));

        // wraps and evicts the oldest root
        history.push(leaf(3));
        assert_eq!(history.current_index(), 0);
        assert!(!history.is_valid(&leaf(100)));
        assert!(history.is_valid(&leaf(1)));
    }
}
