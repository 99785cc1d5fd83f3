//! Field Hashing
//!
//! Poseidon over the BN254 scalar field plus the byte/field conversions
//! every other module relies on.
//!
//! ```text
//! H(x_1, .., x_n) = Poseidon(n, x_1, .., x_n)
//! ```
//!
//! The arity is absorbed first so `H(a)` and `H(a, 0)` never collide.

use std::sync::LazyLock;

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    CryptographicSponge,
    poseidon::{PoseidonConfig, PoseidonSponge, find_poseidon_ark_and_mds},
};
use ark_ff::{BigInt, BigInteger, PrimeField};
use sha2::{Digest, Sha256};

/// Modulus of the scalar field all circuit values live in.
pub const FIELD_SIZE: BigInt<4> = Fr::MODULUS;

static POSEIDON_CONFIG: LazyLock<PoseidonConfig<Fr>> = LazyLock::new(poseidon_config);

/// A collision-resistant hash over the scalar field.
pub trait FieldHasher: Send + Sync {
    fn hash(&self, inputs: &[Fr]) -> Fr;

    fn hash2(&self, left: Fr, right: Fr) -> Fr {
        self.hash(&[left, right])
    }
}

/// Poseidon sponge (rate 2, capacity 1, x^5 S-box).
#[derive(Debug, Clone, Copy, Default)]
pub struct Poseidon;

impl Poseidon {
    pub fn new() -> Self {
        Self
    }
}

impl FieldHasher for Poseidon {
    fn hash(&self, inputs: &[Fr]) -> Fr {
        let mut sponge = PoseidonSponge::new(&POSEIDON_CONFIG);
        sponge.absorb(&Fr::from(inputs.len() as u64));
        for input in inputs {
            sponge.absorb(input);
        }
        sponge.squeeze_field_elements::<Fr>(1)[0]
    }
}

/// BN254 Fr (254 bits), rate 2, capacity 1, 128-bit security
fn poseidon_config() -> PoseidonConfig<Fr> {
    let prime_bits: u64 = 254;
    let rate: usize = 2;
    let capacity: usize = 1;
    let full_rounds: u64 = 8;
    let partial_rounds: u64 = 57;
    let alpha: u64 = 5;

    let (ark, mds) =
        find_poseidon_ark_and_mds::<Fr>(prime_bits, rate, full_rounds, partial_rounds, 0);

    PoseidonConfig::new(
        full_rounds as usize,
        partial_rounds as usize,
        alpha,
        mds,
        ark,
        rate,
        capacity,
    )
}

/// Little-endian canonical bytes of a field element.
pub fn fr_to_le_bytes(f: &Fr) -> [u8; 32] {
    let bytes = f.into_bigint().to_bytes_le();
    let mut arr = [0u8; 32];
    arr[..bytes.len()].copy_from_slice(&bytes);
    arr
}

/// Big-endian canonical bytes of a field element.
pub fn fr_to_be_bytes(f: &Fr) -> [u8; 32] {
    let mut arr = fr_to_le_bytes(f);
    arr.reverse();
    arr
}

/// Parse little-endian bytes, rejecting values that are not below the modulus.
pub fn fr_from_canonical_le(bytes: &[u8; 32]) -> Option<Fr> {
    let mut limbs = [0u64; 4];
    for (i, limb) in limbs.iter_mut().enumerate() {
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[i * 8..(i + 1) * 8]);
        *limb = u64::from_le_bytes(word);
    }
    Fr::from_bigint(BigInt::new(limbs))
}

/// Reduce arbitrary little-endian bytes into the field.
pub fn fr_from_le_bytes_mod_order(bytes: &[u8]) -> Fr {
    Fr::from_le_bytes_mod_order(bytes)
}

/// Map arbitrary bytes (usually a public key) into the field:
/// sha256, drop the first byte, read the remaining 31 big-endian.
pub fn hash_and_truncate_to_circuit(data: &[u8]) -> Fr {
    let digest = Sha256::digest(data);
    Fr::from_be_bytes_mod_order(&digest[1..])
}

/// `-x mod p` for a u64, the field encoding of a withdrawal of `x`.
pub fn negate_u64(x: u64) -> Fr {
    -Fr::from(x)
}

/// Interpret a field element as a u64 if it fits.
pub fn fr_to_u64(f: &Fr) -> Option<u64> {
    let big = f.into_bigint();
    let limbs = big.as_ref();
    if limbs[1..].iter().any(|l| *l != 0) {
        return None;
    }
    Some(limbs[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let h = Poseidon::new();
        let a = h.hash(&[Fr::from(1u64), Fr::from(2u64)]);
        let b = h.hash(&[Fr::from(1u64), Fr::from(2u64)]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_arity_separated() {
        let h = Poseidon::new();
        let one = h.hash(&[Fr::from(7u64)]);
        let two = h.hash(&[Fr::from(7u64), Fr::from(0u64)]);
        assert_ne!(one, two);
    }

    #[test]
    fn test_hash_order_matters() {
        let h = Poseidon::new();
        assert_ne!(
            h.hash2(Fr::from(1u64), Fr::from(2u64)),
            h.hash2(Fr::from(2u64), Fr::from(1u64))
        );
    }

    #[test]
    fn test_canonical_parse_rejects_modulus() {
        let modulus_bytes: [u8; 32] = FIELD_SIZE
            .to_bytes_le()
            .try_into()
            .expect("32 byte modulus");
        assert!(fr_from_canonical_le(&modulus_bytes).is_none());

        let mut below = modulus_bytes;
        below[0] -= 1;
        let f = fr_from_canonical_le(&below).expect("below modulus");
        assert_eq!(fr_to_le_bytes(&f), below);
    }

    #[test]
    fn test_truncate_fits_31_bytes() {
        let f = hash_and_truncate_to_circuit(&[9u8; 32]);
        let be = fr_to_be_bytes(&f);
        assert_eq!(be[0], 0);
        assert_ne!(f, hash_and_truncate_to_circuit(&[8u8; 32]));
    }

    #[test]
    fn test_negate_and_u64() {
        let fee = 5_000u64;
        let neg = negate_u64(fee);
        assert_eq!(neg + Fr::from(fee), Fr::from(0u64));
        assert_eq!(fr_to_u64(&-neg), Some(fee));
        assert_eq!(fr_to_u64(&neg), None);
    }
}
