//! Note Encryption
//!
//! Two modes, both ChaCha20-Poly1305 with the first 12 bytes of the note
//! commitment as nonce:
//!
//! ```text
//! Symmetric (notes to self):
//!   key = keyed_blake3(viewing_key, merkle_tree ‖ commitment)
//!   out = ciphertext ‖ tag
//!
//! Asymmetric (notes to someone else):
//!   esk, epk  ← fresh x25519 keypair
//!   key = blake3_derive(ECDH(esk, recipient_pk) ‖ epk)
//!   out = epk ‖ ciphertext ‖ tag
//! ```
//!
//! Each key encrypts exactly one note, so the commitment-derived nonce is
//! never reused under the same key.

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit},
};
use rand::{CryptoRng, RngCore};
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::account::Account;
use crate::commitment::Commitment;
use crate::error::{UtxoError, UtxoErrorCode};

const ASYMMETRIC_KEY_CONTEXT: &str = "shroud 2024-06 note encryption v1";

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const EPHEMERAL_KEY_LEN: usize = 32;

/// Which key an encrypted note was sealed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    Symmetric,
    Asymmetric,
}

fn nonce(commitment: &Commitment) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&commitment.as_bytes()[..NONCE_LEN]);
    nonce
}

fn seal(key: &[u8; 32], commitment: &Commitment, plaintext: &[u8]) -> Result<Vec<u8>, UtxoError> {
    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .encrypt(Nonce::from_slice(&nonce(commitment)), plaintext)
        .map_err(|e| {
            UtxoError::new(
                UtxoErrorCode::EncryptionFailed,
                "encryption::seal",
                e.to_string(),
            )
        })
}

fn open(key: &[u8; 32], commitment: &Commitment, ciphertext: &[u8]) -> Option<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(Nonce::from_slice(&nonce(commitment)), ciphertext)
        .ok()
}

/// Encrypt with a per-note symmetric key.
pub fn encrypt_symmetric(
    key: &[u8; 32],
    commitment: &Commitment,
    plaintext: &[u8],
) -> Result<Vec<u8>, UtxoError> {
    seal(key, commitment, plaintext)
}

/// `None` when the key is wrong or the ciphertext was tampered with.
pub fn decrypt_symmetric(
    key: &[u8; 32],
    commitment: &Commitment,
    ciphertext: &[u8],
) -> Option<Vec<u8>> {
    open(key, commitment, ciphertext)
}

/// Encrypt to a recipient's x25519 public key.
pub fn encrypt_asymmetric<R: RngCore + CryptoRng>(
    recipient_pk: &[u8; 32],
    commitment: &Commitment,
    plaintext: &[u8],
    rng: &mut R,
) -> Result<Vec<u8>, UtxoError> {
    let ephemeral_secret = EphemeralSecret::random_from_rng(rng);
    let ephemeral_pk = PublicKey::from(&ephemeral_secret);
    let shared = ephemeral_secret.diffie_hellman(&PublicKey::from(*recipient_pk));

    let key = derive_asymmetric_key(shared.as_bytes(), ephemeral_pk.as_bytes());
    let ciphertext = seal(&key, commitment, plaintext)?;

    let mut out = Vec::with_capacity(EPHEMERAL_KEY_LEN + ciphertext.len());
    out.extend_from_slice(ephemeral_pk.as_bytes());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// `None` for view-only accounts, foreign notes, or corrupted input.
pub fn decrypt_asymmetric(
    account: &Account,
    commitment: &Commitment,
    ciphertext: &[u8],
) -> Option<Vec<u8>> {
    if ciphertext.len() < EPHEMERAL_KEY_LEN + TAG_LEN {
        return None;
    }
    let (epk, body) = ciphertext.split_at(EPHEMERAL_KEY_LEN);
    let epk: [u8; 32] = epk.try_into().ok()?;
    let shared = account.diffie_hellman(&epk)?;
    let key = derive_asymmetric_key(shared.as_bytes(), &epk);
    open(&key, commitment, body)
}

fn derive_asymmetric_key(shared_secret: &[u8], ephemeral_pk: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(ASYMMETRIC_KEY_CONTEXT);
    hasher.update(shared_secret);
    hasher.update(ephemeral_pk);
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Poseidon;

    fn account(seed: u8) -> Account {
        Account::from_seed(&Poseidon::new(), &[seed; 32]).unwrap()
    }

    #[test]
    fn test_symmetric_round_trip() {
        let key = [5u8; 32];
        let commitment = Commitment([9u8; 32]);
        let ct = encrypt_symmetric(&key, &commitment, b"note bytes").unwrap();
        assert_eq!(ct.len(), 10 + TAG_LEN);
        assert_eq!(
            decrypt_symmetric(&key, &commitment, &ct).as_deref(),
            Some(&b"note bytes"[..])
        );
        assert!(decrypt_symmetric(&[6u8; 32], &commitment, &ct).is_none());
        assert!(decrypt_symmetric(&key, &Commitment([8u8; 32]), &ct).is_none());
    }

    #[test]
    fn test_asymmetric_round_trip() {
        let recipient = account(1);
        let commitment = Commitment([3u8; 32]);
        let ct = encrypt_asymmetric(
            &recipient.encryption_public_key(),
            &commitment,
            b"hello",
            &mut rand::thread_rng(),
        )
        .unwrap();
        assert_eq!(ct.len(), EPHEMERAL_KEY_LEN + 5 + TAG_LEN);
        assert_eq!(
            decrypt_asymmetric(&recipient, &commitment, &ct).as_deref(),
            Some(&b"hello"[..])
        );
    }

    #[test]
    fn test_wrong_recipient_gets_none() {
        let recipient = account(1);
        let commitment = Commitment([3u8; 32]);
        let ct = encrypt_asymmetric(
            &recipient.encryption_public_key(),
            &commitment,
            b"hello",
            &mut rand::thread_rng(),
        )
        .unwrap();
        assert!(decrypt_asymmetric(&account(2), &commitment, &ct).is_none());

        let view_only = Account::from_public_material(&recipient.get_public_key()).unwrap();
        assert!(decrypt_asymmetric(&view_only, &commitment, &ct).is_none());
    }

    #[test]
    fn test_truncated_ciphertext_is_none() {
        let recipient = account(1);
        assert!(decrypt_asymmetric(&recipient, &Commitment([0u8; 32]), &[1u8; 20]).is_none());
    }
}
