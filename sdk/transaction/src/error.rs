//! Error types
//!
//! One error per subsystem, each with a stable code. [`Error::is_recoverable`]
//! tells the caller whether refreshing chain state and rebuilding the
//! transaction can succeed.

use shroud_privacy::error_codes;
use shroud_privacy::{AccountError, MerkleTreeError, UtxoError};

error_codes! {
    /// A transaction stage was called out of order or failed.
    TransactionError, TransactionErrorCode {
        NoUtxosProvided => "NO_UTXOS_PROVIDED",
        TxNotCompiled => "TX_NOT_COMPILED",
        TxAlreadyCompiled => "TX_ALREADY_COMPILED",
        TxNotSent => "TX_NOT_SENT",
        ProofInputUndefined => "PROOF_INPUT_UNDEFINED",
        ProofUndefined => "PROOF_UNDEFINED",
        RootIndexNotFetched => "ROOT_INDEX_NOT_FETCHED",
        RemainingAccountsNotCreated => "REMAINING_ACCOUNTS_NOT_CREATED",
        AppParametersUndefined => "APP_PARAMETERS_UNDEFINED",
        InvalidVerifierSelected => "INVALID_VERIFIER_SELECTED",
        InvalidPoolType => "INVALID_POOL_TYPE",
        ProofGenerationFailed => "PROOF_GENERATION_FAILED",
        InvalidProof => "INVALID_PROOF",
        SendTransactionFailed => "SEND_TRANSACTION_FAILED",
        NullifierNotInserted => "NULLIFIER_NOT_INSERTED",
        RootNotFound => "ROOT_NOT_FOUND",
        InputUtxoNotInsertedInMerkleTree => "INPUT_UTXO_NOT_INSERTED_IN_MERKLE_TREE",
        PdaDerivationFailed => "PDA_DERIVATION_FAILED",
    }
}

error_codes! {
    /// Invalid combination of action, notes and public fields.
    TransactionParametersError, TransactionParametersErrorCode {
        NoUtxosProvided => "NO_UTXOS_PROVIDED",
        MessageUndefined => "MESSAGE_UNDEFINED",
        MessageMerkleTreeUndefined => "MESSAGE_MERKLE_TREE_UNDEFINED",
        InvalidNumberOfInputs => "INVALID_NUMBER_OF_INPUTS",
        InvalidNumberOfOutputs => "INVALID_NUMBER_OF_OUTPUTS",
        ExceededMaxAssets => "EXCEEDED_MAX_ASSETS",
        SolSenderUndefined => "SOL_SENDER_UNDEFINED",
        SplSenderUndefined => "SPL_SENDER_UNDEFINED",
        SolSenderDefined => "SOL_SENDER_DEFINED",
        SplSenderDefined => "SPL_SENDER_DEFINED",
        SolRecipientUndefined => "SOL_RECIPIENT_UNDEFINED",
        SplRecipientUndefined => "SPL_RECIPIENT_UNDEFINED",
        SolRecipientDefined => "SOL_RECIPIENT_DEFINED",
        SplRecipientDefined => "SPL_RECIPIENT_DEFINED",
        RelayerDefined => "RELAYER_DEFINED",
        RelayerUndefined => "RELAYER_UNDEFINED",
        RelayerFeeUndefined => "RELAYER_FEE_UNDEFINED",
        PublicAmountNotU64 => "PUBLIC_AMOUNT_NOT_U64",
        InvalidPublicAmount => "INVALID_PUBLIC_AMOUNT",
        PublicAmountSplNotZero => "PUBLIC_AMOUNT_SPL_NOT_ZERO",
        PublicAmountSolNotZero => "PUBLIC_AMOUNT_SOL_NOT_ZERO",
        ShieldedRecipientUndefined => "SHIELDED_RECIPIENT_UNDEFINED",
        EncryptedUtxoTooLarge => "ENCRYPTED_UTXO_TOO_LARGE",
        EncryptedUtxosUndefined => "ENCRYPTED_UTXOS_UNDEFINED",
    }
}

error_codes! {
    /// Output notes cannot be built from the given inputs and amounts.
    CreateUtxoError, CreateUtxoErrorCode {
        NoPublicAmountsProvided => "NO_PUBLIC_AMOUNTS_PROVIDED",
        NoPublicMintProvided => "NO_PUBLIC_MINT_PROVIDED",
        InvalidNumberOfRecipients => "INVALID_NUMBER_OF_RECIPIENTS",
        InvalidRecipientMint => "INVALID_RECIPIENT_MINT",
        InvalidOutputUtxoLength => "INVALID_OUTPUT_UTXO_LENGTH",
        RecipientsSumAmountMissmatch => "RECIPIENTS_SUM_AMOUNT_MISSMATCH",
    }
}

error_codes! {
    /// Coin selection failed.
    SelectInUtxosError, SelectInUtxosErrorCode {
        NoPublicAmountsProvided => "NO_PUBLIC_AMOUNTS_PROVIDED",
        NoPublicMintProvided => "NO_PUBLIC_MINT_PROVIDED",
        PublicSplAmountUndefined => "PUBLIC_SPL_AMOUNT_UNDEFINED",
        RelayerFeeUndefined => "RELAYER_FEE_UNDEFINED",
        RelayerFeeDefined => "RELAYER_FEE_DEFINED",
        NoUtxosProvided => "NO_UTXOS_PROVIDED",
        InvalidNumberOfRecipients => "INVALID_NUMER_OF_RECIPIENTS",
        InvalidRecipientMint => "INVALID_RECIPIENT_MINT",
        FailedToFindUtxoCombination => "FAILED_TO_FIND_UTXO_COMBINATION",
    }
}

error_codes! {
    /// Local view of the on-chain tree is missing or inconsistent.
    SolMerkleTreeError, SolMerkleTreeErrorCode {
        MerkleTreeUndefined => "MERKLE_TREE_UNDEFINED",
        LeafIndexMismatch => "LEAF_INDEX_MISMATCH",
        LeafQueued => "LEAF_QUEUED",
    }
}

error_codes! {
    /// Missing wallet or chain context.
    ProviderError, ProviderErrorCode {
        WalletUndefined => "WALLET_UNDEFINED",
        SolMerkleTreeUndefined => "SOL_MERKLE_TREE_UNDEFINED",
        AccountFetchFailed => "ACCOUNT_FETCH_FAILED",
        InvalidConfig => "INVALID_CONFIG",
    }
}

error_codes! {
    /// Relayer configuration or submission problem.
    RelayerError, RelayerErrorCode {
        RelayerFeeUndefined => "RELAYER_FEE_UNDEFINED",
        RelayerRequestFailed => "RELAYER_REQUEST_FAILED",
    }
}

/// Crate-level error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Parameters(#[from] TransactionParametersError),
    #[error(transparent)]
    CreateUtxo(#[from] CreateUtxoError),
    #[error(transparent)]
    SelectInUtxos(#[from] SelectInUtxosError),
    #[error(transparent)]
    SolMerkleTree(#[from] SolMerkleTreeError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Relayer(#[from] RelayerError),
    #[error(transparent)]
    Privacy(#[from] shroud_privacy::Error),
}

impl From<UtxoError> for Error {
    fn from(e: UtxoError) -> Self {
        Self::Privacy(e.into())
    }
}

impl From<AccountError> for Error {
    fn from(e: AccountError) -> Self {
        Self::Privacy(e.into())
    }
}

impl From<MerkleTreeError> for Error {
    fn from(e: MerkleTreeError) -> Self {
        Self::Privacy(e.into())
    }
}

impl Error {
    /// Chain-state errors: refresh the tree and retry from coin selection.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transaction(e) => matches!(
                e.code,
                TransactionErrorCode::RootNotFound
                    | TransactionErrorCode::InputUtxoNotInsertedInMerkleTree
            ),
            Self::SolMerkleTree(e) => matches!(
                e.code,
                SolMerkleTreeErrorCode::MerkleTreeUndefined | SolMerkleTreeErrorCode::LeafQueued
            ),
            _ => false,
        }
    }

    /// Stable code of the underlying error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transaction(e) => e.code.as_str(),
            Self::Parameters(e) => e.code.as_str(),
            Self::CreateUtxo(e) => e.code.as_str(),
            Self::SelectInUtxos(e) => e.code.as_str(),
            Self::SolMerkleTree(e) => e.code.as_str(),
            Self::Provider(e) => e.code.as_str(),
            Self::Relayer(e) => e.code.as_str(),
            Self::Privacy(shroud_privacy::Error::Utxo(e)) => e.code.as_str(),
            Self::Privacy(shroud_privacy::Error::Account(e)) => e.code.as_str(),
            Self::Privacy(shroud_privacy::Error::MerkleTree(e)) => e.code.as_str(),
            Self::Privacy(shroud_privacy::Error::Registry(e)) => e.code.as_str(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
