//! Error types
//!
//! Every subsystem error carries a stable code, the name of the failing
//! operation, and a human readable message.

/// Declare a code enum plus its error struct.
///
/// ```ignore
/// error_codes! {
///     /// Malformed note.
///     UtxoError, UtxoErrorCode {
///         NegativeAmount => "NEGATIVE_AMOUNT",
///     }
/// }
/// ```
#[macro_export]
macro_rules! error_codes {
    (
        $(#[$meta:meta])*
        $err:ident, $code:ident {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $code {
            $($variant),+
        }

        impl $code {
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl ::std::fmt::Display for $code {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, ::thiserror::Error)]
        #[error("{code} in {function}: {message}")]
        pub struct $err {
            pub code: $code,
            pub function: &'static str,
            pub message: String,
        }

        impl $err {
            pub fn new(code: $code, function: &'static str, message: impl Into<String>) -> Self {
                Self {
                    code,
                    function,
                    message: message.into(),
                }
            }
        }
    };
}

error_codes! {
    /// Malformed or unusable note.
    UtxoError, UtxoErrorCode {
        BlindingExceedsFieldSize => "BLINDING_EXCEEDS_FIELD_SIZE",
        InvalidAssetOrAmountsLength => "INVALID_ASSET_OR_AMOUNTS_LENGTH",
        ExceededMaxAssets => "EXCEEDED_MAX_ASSETS",
        NegativeAmount => "NEGATIVE_AMOUNT",
        NotU64 => "NOT_U64",
        AssetNotFound => "ASSET_NOT_FOUND",
        VerifierIndexNotFound => "VERIFIER_INDEX_NOT_FOUND",
        AppDataIdlUndefined => "APP_DATA_IDL_UNDEFINED",
        InvalidAppData => "INVALID_APP_DATA",
        IndexNotProvided => "INDEX_NOT_PROVIDED",
        AccountHasNoPrivkey => "ACCOUNT_HAS_NO_PRIVKEY",
        AccountUndefined => "ACCOUNT_UNDEFINED",
        InvalidBytes => "INVALID_BYTES",
        EncryptionFailed => "ENCRYPTION_FAILED",
        UtxosNotEqual => "UTXOS_NOT_EQUAL",
    }
}

error_codes! {
    /// Missing or malformed key material.
    AccountError, AccountErrorCode {
        InvalidSeedSize => "INVALID_SEED_SIZE",
        AccountHasNoPrivkey => "ACCOUNT_HAS_NO_PRIVKEY",
        SymmetricSecretUndefined => "AES_SECRET_UNDEFINED",
        InvalidPublicKey => "INVALID_PUBLIC_KEY",
        InvalidPrivateKey => "INVALID_PRIVATE_KEY",
    }
}

error_codes! {
    /// Inconsistent local Merkle tree or balance state.
    MerkleTreeError, MerkleTreeErrorCode {
        TreeFull => "MERKLE_TREE_FULL",
        LeafIndexOutOfRange => "LEAF_INDEX_OUT_OF_RANGE",
        DuplicateCommitment => "DUPLICATE_COMMITMENT",
    }
}

error_codes! {
    /// Unusable asset or verifier table.
    RegistryError, RegistryErrorCode {
        InvalidPubkey => "INVALID_PUBKEY",
        NativeAssetMissing => "NATIVE_ASSET_MISSING",
        DuplicateEntry => "DUPLICATE_ENTRY",
    }
}

/// Crate-level error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Utxo(#[from] UtxoError),
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error(transparent)]
    MerkleTree(#[from] MerkleTreeError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
