//! Shroud Privacy SDK
//!
//! Note-based privacy primitives for the shielded pool.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Utxo (note)                            │
//! │  amounts[2] · assets[2] · blinding · owner · app data · pool    │
//! │         │                   │                     │             │
//! │         ▼                   ▼                     ▼             │
//! │  ┌──────────────┐   ┌──────────────┐   ┌───────────────────┐    │
//! │  │  Commitment  │   │  Nullifier   │   │  Encrypted bytes  │    │
//! │  │  (leaf)      │   │  (spend tag) │   │  (sym / x25519)   │    │
//! │  └──────────────┘   └──────────────┘   └───────────────────┘    │
//! │         │                                                       │
//! │         ▼                                                       │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │  MerkleTree (height 18) + RootHistory (256 roots)       │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod account;
pub mod balance;
pub mod commitment;
pub mod encryption;
pub mod error;
pub mod hasher;
pub mod merkle;
pub mod nullifier;
pub mod registry;
pub mod utxo;

pub use account::{Account, PrivateKeys};
pub use balance::{Balance, ProgramUtxoBalance, TokenUtxoBalance, UtxoBucket};
pub use commitment::Commitment;
pub use encryption::EncryptionMode;
pub use error::{
    AccountError, AccountErrorCode, Error, MerkleTreeError, MerkleTreeErrorCode, RegistryError,
    RegistryErrorCode, Result, UtxoError, UtxoErrorCode,
};
pub use hasher::{FIELD_SIZE, FieldHasher, Poseidon};
pub use merkle::{
    MERKLE_TREE_HEIGHT, MERKLE_TREE_HISTORY_SIZE, MerklePath, MerkleTree, RootHistory,
};
pub use nullifier::Nullifier;
pub use registry::{AssetRegistry, Registries, TokenData, VerifierRegistry};
pub use utxo::{AppDataSchema, N_ASSETS, Utxo, UtxoConfig};

/// Re-exported so downstream crates name the same field type.
pub use ark_bn254::Fr;
