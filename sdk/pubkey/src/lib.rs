use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use curve25519_dalek::edwards::CompressedEdwardsY;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Maximum length of a single derivation seed
pub const MAX_SEED_LEN: usize = 32;
/// Maximum number of seeds for a program address
pub const MAX_SEEDS: usize = 16;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PubkeyError {
    #[error("invalid base58 public key: {0}")]
    InvalidBase58(String),
    #[error("invalid public key length: got {0}, need 32")]
    InvalidLength(usize),
    #[error("seed length {0} exceeds {MAX_SEED_LEN}")]
    MaxSeedLengthExceeded(usize),
    #[error("too many seeds: {0} exceeds {MAX_SEEDS}")]
    TooManySeeds(usize),
    #[error("derived address lies on the ed25519 curve")]
    InvalidSeeds,
    #[error("no bump seed yields an off-curve address")]
    NoViableBump,
}

/// A 32 byte account address, rendered as base58.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Pubkey(pub [u8; 32]);

impl Pubkey {
    /// The system program id (all zero bytes), also used as the native asset.
    pub const SYSTEM_PROGRAM: Pubkey = Pubkey([0u8; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, PubkeyError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| PubkeyError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_system_program(&self) -> bool {
        *self == Self::SYSTEM_PROGRAM
    }

    /// Unique key for tests and fixtures. Not random, just never repeated in-process.
    pub fn new_unique() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&n.to_be_bytes());
        bytes[0] = 0xa5;
        Self(bytes)
    }

    /// Whether the bytes decompress to a point on the ed25519 curve.
    pub fn is_on_curve(&self) -> bool {
        CompressedEdwardsY(self.0).decompress().is_some()
    }

    /// Hash `seeds || program_id || marker`, rejecting results on the curve.
    pub fn create_program_address(
        seeds: &[&[u8]],
        program_id: &Pubkey,
    ) -> Result<Pubkey, PubkeyError> {
        if seeds.len() > MAX_SEEDS {
            return Err(PubkeyError::TooManySeeds(seeds.len()));
        }
        let mut hasher = Sha256::new();
        for seed in seeds {
            if seed.len() > MAX_SEED_LEN {
                return Err(PubkeyError::MaxSeedLengthExceeded(seed.len()));
            }
            hasher.update(seed);
        }
        hasher.update(program_id.0);
        hasher.update(PDA_MARKER);
        let address = Pubkey(hasher.finalize().into());
        if address.is_on_curve() {
            return Err(PubkeyError::InvalidSeeds);
        }
        Ok(address)
    }

    /// Search bump seeds from 255 down until the address falls off the curve.
    pub fn find_program_address(
        seeds: &[&[u8]],
        program_id: &Pubkey,
    ) -> Result<(Pubkey, u8), PubkeyError> {
        for bump in (0..=u8::MAX).rev() {
            let bump_seed = [bump];
            let mut with_bump: Vec<&[u8]> = seeds.to_vec();
            with_bump.push(&bump_seed);
            match Self::create_program_address(&with_bump, program_id) {
                Ok(address) => return Ok((address, bump)),
                Err(PubkeyError::InvalidSeeds) => {}
                Err(e) => return Err(e),
            }
        }
        Err(PubkeyError::NoViableBump)
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({self})")
    }
}

impl FromStr for Pubkey {
    type Err = PubkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| PubkeyError::InvalidBase58(e.to_string()))?;
        Self::try_from_slice(&bytes)
    }
}

impl From<[u8; 32]> for Pubkey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Pubkey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_program_base58() {
        assert_eq!(
            Pubkey::SYSTEM_PROGRAM.to_string(),
            "11111111111111111111111111111111"
        );
        let parsed: Pubkey = "11111111111111111111111111111111".parse().unwrap();
        assert!(parsed.is_system_program());
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let short = bs58::encode([1u8; 31]).into_string();
        assert_eq!(
            short.parse::<Pubkey>(),
            Err(PubkeyError::InvalidLength(31))
        );
        assert!(matches!(
            "0OIl".parse::<Pubkey>(),
            Err(PubkeyError::InvalidBase58(_))
        ));
    }

    #[test]
    fn test_program_address_is_off_curve_and_stable() {
        let program = Pubkey::new_unique();
        let (a, bump_a) = Pubkey::find_program_address(&[b"leaves", &[7u8; 32]], &program).unwrap();
        let (b, bump_b) = Pubkey::find_program_address(&[b"leaves", &[7u8; 32]], &program).unwrap();
        assert_eq!(a, b);
        assert_eq!(bump_a, bump_b);
        assert!(!a.is_on_curve());

        let (c, _) = Pubkey::find_program_address(&[b"nf", &[7u8; 32]], &program).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_seed_too_long() {
        let program = Pubkey::new_unique();
        let long = [0u8; 33];
        assert_eq!(
            Pubkey::find_program_address(&[&long], &program),
            Err(PubkeyError::MaxSeedLengthExceeded(33))
        );
    }

    #[test]
    fn test_new_unique_differs() {
        assert_ne!(Pubkey::new_unique(), Pubkey::new_unique());
    }

    #[test]
    fn test_serde_json() {
        let key = Pubkey::new_unique();
        let json = serde_json::to_string(&key).unwrap();
        let back: Pubkey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, back);
    }
}
