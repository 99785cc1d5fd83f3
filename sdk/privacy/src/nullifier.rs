//! Nullifiers
//!
//! ```text
//! Nullifier = H(commitment, leaf_index, sign(commitment, leaf_index))
//! ```
//!
//! Once a nullifier account exists on-chain the note it belongs to is spent.

use ark_bn254::Fr;
use serde::{Deserialize, Serialize};

use crate::commitment::Commitment;
use crate::hasher::{FieldHasher, fr_from_le_bytes_mod_order, fr_to_le_bytes};

/// A nullifier (32 bytes) - unique tag for a spent note
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Nullifier(pub [u8; 32]);

impl Nullifier {
    pub fn from_field(f: Fr) -> Self {
        Self(fr_to_le_bytes(&f))
    }

    pub fn to_field(&self) -> Fr {
        fr_from_le_bytes_mod_order(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Big-endian bytes, used as the nullifier account seed.
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut be = self.0;
        be.reverse();
        be
    }

    /// Combine a commitment, its leaf position and the owner's signature.
    pub fn derive(
        hasher: &impl FieldHasher,
        commitment: &Commitment,
        index: u64,
        signature: Fr,
    ) -> Self {
        Self::from_field(hasher.hash(&[commitment.to_field(), Fr::from(index), signature]))
    }
}

impl AsRef<[u8]> for Nullifier {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
