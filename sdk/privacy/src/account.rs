//! Shielded Accounts
//!
//! An account bundles three independent keys derived from one seed:
//!
//! ```text
//! seed ──┬─ derive_key(SPENDING)   → spending scalar → pubkey = H(spending)
//!        ├─ derive_key(ENCRYPTION) → x25519 secret  → encryption pubkey
//!        └─ derive_key(VIEWING)    → symmetric secret for own notes
//! ```
//!
//! View-only accounts hold just `pubkey` and the x25519 public key. They can
//! own and receive notes but can never produce a nullifier.

use std::fmt;

use ark_bn254::Fr;
use rand::{CryptoRng, RngCore};
use x25519_dalek::{PublicKey as X25519PublicKey, SharedSecret, StaticSecret};

use crate::commitment::Commitment;
use crate::error::{AccountError, AccountErrorCode};
use crate::hasher::{FieldHasher, fr_from_canonical_le, fr_from_le_bytes_mod_order, fr_to_le_bytes};
use shroud_pubkey::Pubkey;

const SPENDING_KEY_CONTEXT: &str = "shroud 2024-06 spending key v1";
const ENCRYPTION_KEY_CONTEXT: &str = "shroud 2024-06 encryption key v1";
const VIEWING_KEY_CONTEXT: &str = "shroud 2024-06 utxo viewing key v1";
const BURNER_CONTEXT: &str = "shroud 2024-06 burner seed v1";

/// Minimum seed length accepted by [`Account::from_seed`].
pub const MIN_SEED_LEN: usize = 32;

/// Length of the base58-decoded public material (pubkey ‖ encryption pubkey).
pub const PUBLIC_MATERIAL_LEN: usize = 64;

enum EncryptionKey {
    Keypair(StaticSecret),
    Public(X25519PublicKey),
}

/// Exported key material, base58 encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateKeys {
    pub spending_key: String,
    pub encryption_key: String,
    pub viewing_key: String,
}

/// A shielded keypair
#[derive(Clone)]
pub struct Account {
    spending_key: Option<Fr>,
    pubkey: Fr,
    encryption: EncryptionKey,
    viewing_key: Option<[u8; 32]>,
    burner_seed: Option<[u8; 32]>,
}

impl Clone for EncryptionKey {
    fn clone(&self) -> Self {
        match self {
            Self::Keypair(secret) => Self::Keypair(secret.clone()),
            Self::Public(public) => Self::Public(*public),
        }
    }
}

impl Account {
    /// Derive a full account from a seed of at least 32 bytes.
    pub fn from_seed(hasher: &impl FieldHasher, seed: &[u8]) -> Result<Self, AccountError> {
        if seed.len() < MIN_SEED_LEN {
            return Err(AccountError::new(
                AccountErrorCode::InvalidSeedSize,
                "Account::from_seed",
                format!("seed is {} bytes, need at least {MIN_SEED_LEN}", seed.len()),
            ));
        }
        Ok(Self::derive(hasher, seed))
    }

    /// Fresh account from a random seed.
    pub fn random<R: RngCore + CryptoRng>(hasher: &impl FieldHasher, rng: &mut R) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self::derive(hasher, &seed)
    }

    fn derive(hasher: &impl FieldHasher, seed: &[u8]) -> Self {
        let spending_key =
            fr_from_le_bytes_mod_order(&blake3::derive_key(SPENDING_KEY_CONTEXT, seed));
        Self {
            spending_key: Some(spending_key),
            pubkey: hasher.hash(&[spending_key]),
            encryption: EncryptionKey::Keypair(StaticSecret::from(blake3::derive_key(
                ENCRYPTION_KEY_CONTEXT,
                seed,
            ))),
            viewing_key: Some(blake3::derive_key(VIEWING_KEY_CONTEXT, seed)),
            burner_seed: None,
        }
    }

    /// Single-use account for change notes. Same (seed, index) gives the same account.
    pub fn create_burner(
        hasher: &impl FieldHasher,
        seed: &[u8],
        index: u64,
    ) -> Result<Self, AccountError> {
        if seed.len() < MIN_SEED_LEN {
            return Err(AccountError::new(
                AccountErrorCode::InvalidSeedSize,
                "Account::create_burner",
                format!("seed is {} bytes, need at least {MIN_SEED_LEN}", seed.len()),
            ));
        }
        let mut hasher_input = blake3::Hasher::new_derive_key(BURNER_CONTEXT);
        hasher_input.update(seed);
        hasher_input.update(&index.to_le_bytes());
        let burner_seed: [u8; 32] = *hasher_input.finalize().as_bytes();
        Ok(Self::from_burner_seed(hasher, burner_seed))
    }

    /// Restore a burner from the seed returned by [`Account::burner_seed`].
    pub fn from_burner_seed(hasher: &impl FieldHasher, burner_seed: [u8; 32]) -> Self {
        let mut account = Self::derive(hasher, &burner_seed);
        account.burner_seed = Some(burner_seed);
        account
    }

    /// View-only account from base58(pubkey LE ‖ encryption pubkey).
    pub fn from_public_material(material: &str) -> Result<Self, AccountError> {
        let bytes = bs58::decode(material).into_vec().map_err(|e| {
            AccountError::new(
                AccountErrorCode::InvalidPublicKey,
                "Account::from_public_material",
                e.to_string(),
            )
        })?;
        if bytes.len() != PUBLIC_MATERIAL_LEN {
            return Err(AccountError::new(
                AccountErrorCode::InvalidPublicKey,
                "Account::from_public_material",
                format!("expected {PUBLIC_MATERIAL_LEN} bytes, got {}", bytes.len()),
            ));
        }
        let mut pubkey_bytes = [0u8; 32];
        pubkey_bytes.copy_from_slice(&bytes[..32]);
        let mut encryption_bytes = [0u8; 32];
        encryption_bytes.copy_from_slice(&bytes[32..]);
        Self::from_public_keys(&pubkey_bytes, encryption_bytes)
    }

    /// View-only account from raw keys.
    pub fn from_public_keys(
        pubkey: &[u8; 32],
        encryption_pubkey: [u8; 32],
    ) -> Result<Self, AccountError> {
        let pubkey = fr_from_canonical_le(pubkey).ok_or_else(|| {
            AccountError::new(
                AccountErrorCode::InvalidPublicKey,
                "Account::from_public_keys",
                "shielded pubkey exceeds field size",
            )
        })?;
        Ok(Self {
            spending_key: None,
            pubkey,
            encryption: EncryptionKey::Public(X25519PublicKey::from(encryption_pubkey)),
            viewing_key: None,
            burner_seed: None,
        })
    }

    /// Restore a full account from keys exported by [`Account::get_private_keys`].
    pub fn from_private_keys(
        hasher: &impl FieldHasher,
        keys: &PrivateKeys,
    ) -> Result<Self, AccountError> {
        let spending = decode_key("spending_key", &keys.spending_key)?;
        let spending_key = fr_from_canonical_le(&spending).ok_or_else(|| {
            AccountError::new(
                AccountErrorCode::InvalidPrivateKey,
                "Account::from_private_keys",
                "spending key exceeds field size",
            )
        })?;
        let encryption = decode_key("encryption_key", &keys.encryption_key)?;
        let viewing = decode_key("viewing_key", &keys.viewing_key)?;

        Ok(Self {
            spending_key: Some(spending_key),
            pubkey: hasher.hash(&[spending_key]),
            encryption: EncryptionKey::Keypair(StaticSecret::from(encryption)),
            viewing_key: Some(viewing),
            burner_seed: None,
        })
    }

    pub fn get_private_keys(&self) -> Result<PrivateKeys, AccountError> {
        let (Some(spending), EncryptionKey::Keypair(secret), Some(viewing)) =
            (self.spending_key, &self.encryption, self.viewing_key)
        else {
            return Err(AccountError::new(
                AccountErrorCode::AccountHasNoPrivkey,
                "Account::get_private_keys",
                "view-only account",
            ));
        };
        Ok(PrivateKeys {
            spending_key: bs58::encode(fr_to_le_bytes(&spending)).into_string(),
            encryption_key: bs58::encode(secret.to_bytes()).into_string(),
            viewing_key: bs58::encode(viewing).into_string(),
        })
    }

    /// The shielded public key (owner field of a note).
    pub fn pubkey(&self) -> Fr {
        self.pubkey
    }

    pub fn encryption_public_key(&self) -> [u8; 32] {
        match &self.encryption {
            EncryptionKey::Keypair(secret) => *X25519PublicKey::from(secret).as_bytes(),
            EncryptionKey::Public(public) => *public.as_bytes(),
        }
    }

    /// base58(pubkey LE ‖ encryption pubkey), accepted by [`Account::from_public_material`].
    pub fn get_public_key(&self) -> String {
        let mut bytes = Vec::with_capacity(PUBLIC_MATERIAL_LEN);
        bytes.extend_from_slice(&fr_to_le_bytes(&self.pubkey));
        bytes.extend_from_slice(&self.encryption_public_key());
        bs58::encode(bytes).into_string()
    }

    pub fn has_spending_key(&self) -> bool {
        self.spending_key.is_some()
    }

    pub fn burner_seed(&self) -> Option<[u8; 32]> {
        self.burner_seed
    }

    /// Spending scalar, the private key input of the circuit.
    pub fn spending_key(&self, function: &'static str) -> Result<Fr, AccountError> {
        self.spending_key.ok_or_else(|| {
            AccountError::new(
                AccountErrorCode::AccountHasNoPrivkey,
                function,
                "view-only account cannot spend",
            )
        })
    }

    /// `H(spending, commitment, index)`, the signature a nullifier is built from.
    pub fn sign(
        &self,
        hasher: &impl FieldHasher,
        commitment: &Commitment,
        index: u64,
    ) -> Result<Fr, AccountError> {
        let spending = self.spending_key("Account::sign")?;
        Ok(hasher.hash(&[spending, commitment.to_field(), Fr::from(index)]))
    }

    /// Symmetric key for a note the account encrypted to itself.
    pub fn get_utxo_viewing_key(
        &self,
        merkle_tree: &Pubkey,
        commitment: &Commitment,
    ) -> Result<[u8; 32], AccountError> {
        let viewing = self.viewing_key.ok_or_else(|| {
            AccountError::new(
                AccountErrorCode::SymmetricSecretUndefined,
                "Account::get_utxo_viewing_key",
                "account holds no viewing secret",
            )
        })?;
        let mut hasher = blake3::Hasher::new_keyed(&viewing);
        hasher.update(merkle_tree.as_bytes());
        hasher.update(commitment.as_bytes());
        Ok(*hasher.finalize().as_bytes())
    }

    pub fn has_viewing_key(&self) -> bool {
        self.viewing_key.is_some()
    }

    /// x25519 agreement with an ephemeral key, `None` for view-only accounts.
    pub fn diffie_hellman(&self, ephemeral: &[u8; 32]) -> Option<SharedSecret> {
        match &self.encryption {
            EncryptionKey::Keypair(secret) => {
                Some(secret.diffie_hellman(&X25519PublicKey::from(*ephemeral)))
            }
            EncryptionKey::Public(_) => None,
        }
    }
}

impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        self.pubkey == other.pubkey
            && self.encryption_public_key() == other.encryption_public_key()
    }
}

impl Eq for Account {}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("pubkey", &bs58::encode(fr_to_le_bytes(&self.pubkey)).into_string())
            .field(
                "encryption_pubkey",
                &bs58::encode(self.encryption_public_key()).into_string(),
            )
            .field("view_only", &!self.has_spending_key())
            .finish()
    }
}

fn decode_key(name: &str, value: &str) -> Result<[u8; 32], AccountError> {
    let bytes = bs58::decode(value).into_vec().map_err(|e| {
        AccountError::new(
            AccountErrorCode::InvalidPrivateKey,
            "Account::from_private_keys",
            format!("{name}: {e}"),
        )
    })?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        AccountError::new(
            AccountErrorCode::InvalidPrivateKey,
            "Account::from_private_keys",
            format!("{name}: expected 32 bytes, got {}", b.len()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Poseidon;

    const SEED: [u8; 32] = [7u8; 32];

    #[test]
    fn test_from_seed_deterministic() {
        let h = Poseidon::new();
        let a = Account::from_seed(&h, &SEED).unwrap();
        let b = Account::from_seed(&h, &SEED).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.pubkey(), h.hash(&[a.spending_key("test").unwrap()]));
        assert_ne!(a, Account::from_seed(&h, &[8u8; 32]).unwrap());
    }

    #[test]
    fn test_short_seed_rejected() {
        let err = Account::from_seed(&Poseidon::new(), &[1u8; 31]).unwrap_err();
        assert_eq!(err.code, AccountErrorCode::InvalidSeedSize);
    }

    #[test]
    fn test_burner_is_stable_per_index() {
        let h = Poseidon::new();
        let b0 = Account::create_burner(&h, &SEED, 0).unwrap();
        let b0_again = Account::create_burner(&h, &SEED, 0).unwrap();
        let b1 = Account::create_burner(&h, &SEED, 1).unwrap();
        assert_eq!(b0, b0_again);
        assert_ne!(b0, b1);
        assert_ne!(b0, Account::from_seed(&h, &SEED).unwrap());

        let restored = Account::from_burner_seed(&h, b1.burner_seed().unwrap());
        assert_eq!(restored, b1);
    }

    #[test]
    fn test_public_material_is_view_only() {
        let h = Poseidon::new();
        let full = Account::from_seed(&h, &SEED).unwrap();
        let view = Account::from_public_material(&full.get_public_key()).unwrap();

        assert_eq!(view, full);
        assert!(!view.has_spending_key());
        assert!(!view.has_viewing_key());

        let err = view.sign(&h, &Commitment([1u8; 32]), 0).unwrap_err();
        assert_eq!(err.code, AccountErrorCode::AccountHasNoPrivkey);
        let err = view.get_private_keys().unwrap_err();
        assert_eq!(err.code, AccountErrorCode::AccountHasNoPrivkey);
    }

    #[test]
    fn test_public_material_wrong_length() {
        let short = bs58::encode([1u8; 40]).into_string();
        let err = Account::from_public_material(&short).unwrap_err();
        assert_eq!(err.code, AccountErrorCode::InvalidPublicKey);
    }

    #[test]
    fn test_private_keys_restore() {
        let h = Poseidon::new();
        let full = Account::from_seed(&h, &SEED).unwrap();
        let keys = full.get_private_keys().unwrap();
        let restored = Account::from_private_keys(&h, &keys).unwrap();

        assert_eq!(restored, full);
        let c = Commitment([3u8; 32]);
        assert_eq!(
            restored.sign(&h, &c, 4).unwrap(),
            full.sign(&h, &c, 4).unwrap()
        );
        let tree = Pubkey::new_unique();
        assert_eq!(
            restored.get_utxo_viewing_key(&tree, &c).unwrap(),
            full.get_utxo_viewing_key(&tree, &c).unwrap()
        );
    }

    #[test]
    fn test_viewing_key_depends_on_tree_and_commitment() {
        let full = Account::from_seed(&Poseidon::new(), &SEED).unwrap();
        let tree = Pubkey::new_unique();
        let k1 = full.get_utxo_viewing_key(&tree, &Commitment([1u8; 32])).unwrap();
        let k2 = full.get_utxo_viewing_key(&tree, &Commitment([2u8; 32])).unwrap();
        let k3 = full
            .get_utxo_viewing_key(&Pubkey::new_unique(), &Commitment([1u8; 32]))
            .unwrap();
        assert_ne!(k1, k2);
        assert_ne!(k1, k3);
    }
}
