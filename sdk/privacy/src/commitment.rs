//! Note Commitments
//!
//! ```text
//! Commitment = H(H(amounts), owner_pk, blinding, H(assets_circuit),
//!                app_data_hash, pool_type, verifier_address_circuit)
//! ```
//!
//! The commitment is the only trace of a note that lands on-chain.

use ark_bn254::Fr;
use serde::{Deserialize, Serialize};

use crate::hasher::{FieldHasher, fr_from_le_bytes_mod_order, fr_to_le_bytes};

/// A note commitment (32 bytes, little-endian field element)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Commitment(pub [u8; 32]);

impl Commitment {
    pub fn from_field(f: Fr) -> Self {
        Self(fr_to_le_bytes(&f))
    }

    pub fn to_field(&self) -> Fr {
        fr_from_le_bytes_mod_order(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Big-endian bytes, the order on-chain accounts and PDAs use.
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut be = self.0;
        be.reverse();
        be
    }
}

impl AsRef<[u8]> for Commitment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Every field element that goes into a note commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitmentInputs {
    pub amounts: [Fr; 2],
    pub owner: Fr,
    pub blinding: Fr,
    pub assets_circuit: [Fr; 2],
    pub app_data_hash: Fr,
    pub pool_type: Fr,
    pub verifier_address_circuit: Fr,
}

impl CommitmentInputs {
    pub fn commit(&self, hasher: &impl FieldHasher) -> Commitment {
        let amounts_hash = hasher.hash(&self.amounts);
        let assets_hash = hasher.hash(&self.assets_circuit);
        Commitment::from_field(hasher.hash(&[
            amounts_hash,
            self.owner,
            self.blinding,
            assets_hash,
            self.app_data_hash,
            self.pool_type,
            self.verifier_address_circuit,
        ]))
    }
}
