//! Shielded Notes (utxos)
//!
//! A utxo holds up to two assets: slot 0 is always the native asset, slot 1
//! an SPL token (or the native asset again with amount 0).
//!
//! ```text
//! Utxo = {
//!     amounts:          [u64; 2],
//!     assets:           [Pubkey; 2],
//!     blinding:         Fr,
//!     account:          owner (pubkey + encryption key),
//!     index:            leaf position, once inserted,
//!     app_data_hash:    Fr, zero for plain notes,
//!     pool_type:        u32,
//!     verifier_address: Pubkey, system program for plain notes,
//! }
//! ```
//!
//! Compressed byte layout (little-endian):
//!
//! ```text
//! | amount 0 (8) | amount 1 (8) | asset idx (4) | verifier idx (4) | pool type (4) |
//! | flags (1) | blinding (32) | [app data hash (32)] | [n (1) | app data (32 * n)] |
//! | [owner pubkey (32) | encryption pubkey (32)]   (uncompressed only)
//! ```

use std::fmt;

use ark_bn254::Fr;
use ark_ff::Zero;
use rand::RngCore;
use shroud_pubkey::Pubkey;

use crate::account::Account;
use crate::commitment::{Commitment, CommitmentInputs};
use crate::encryption::{
    EncryptionMode, decrypt_asymmetric, decrypt_symmetric, encrypt_asymmetric, encrypt_symmetric,
};
use crate::error::{UtxoError, UtxoErrorCode};
use crate::hasher::{
    FieldHasher, fr_from_canonical_le, fr_to_le_bytes, hash_and_truncate_to_circuit,
};
use crate::nullifier::Nullifier;
use crate::registry::Registries;

/// Maximum number of assets a single note can carry.
pub const N_ASSETS: usize = 2;
/// Maximum number of app data fields.
pub const MAX_APP_DATA_FIELDS: usize = 16;
/// Length of the fixed part of the compressed encoding.
pub const COMPRESSED_HEADER_LEN: usize = 8 + 8 + 4 + 4 + 4 + 1 + 32;

const FLAG_APP_DATA_HASH: u8 = 0b001;
const FLAG_APP_DATA: u8 = 0b010;
const FLAG_OWNER_KEYS: u8 = 0b100;

/// Field names of an app program's utxo data, in hashing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDataSchema {
    pub name: String,
    pub fields: Vec<String>,
}

impl AppDataSchema {
    pub fn new(name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// `H(values)`, checking the values match the declared fields.
    pub fn hash(&self, hasher: &impl FieldHasher, values: &[Fr]) -> Result<Fr, UtxoError> {
        if values.len() != self.fields.len() || values.len() > MAX_APP_DATA_FIELDS {
            return Err(UtxoError::new(
                UtxoErrorCode::InvalidAppData,
                "AppDataSchema::hash",
                format!(
                    "{} declares {} fields, got {} (max {MAX_APP_DATA_FIELDS})",
                    self.name,
                    self.fields.len(),
                    values.len()
                ),
            ));
        }
        Ok(hasher.hash(values))
    }
}

/// Everything needed to build a [`Utxo`].
#[derive(Debug, Clone)]
pub struct UtxoConfig {
    pub account: Account,
    pub assets: Vec<Pubkey>,
    /// Signed so that negative inputs are caught rather than wrapped.
    pub amounts: Vec<i128>,
    /// Little-endian blinding, random 31 bytes when unset.
    pub blinding: Option<[u8; 32]>,
    pub index: Option<u64>,
    pub pool_type: u32,
    pub verifier_address: Pubkey,
    pub app_data: Vec<Fr>,
    pub app_data_hash: Option<Fr>,
    pub app_data_schema: Option<AppDataSchema>,
    /// Whether the app data itself is serialized (and encrypted) with the note.
    pub include_app_data: bool,
}

impl UtxoConfig {
    pub fn new(account: Account) -> Self {
        Self {
            account,
            assets: Vec::new(),
            amounts: Vec::new(),
            blinding: None,
            index: None,
            pool_type: 0,
            verifier_address: Pubkey::SYSTEM_PROGRAM,
            app_data: Vec::new(),
            app_data_hash: None,
            app_data_schema: None,
            include_app_data: false,
        }
    }

    pub fn with_assets(mut self, assets: Vec<Pubkey>) -> Self {
        self.assets = assets;
        self
    }

    pub fn with_amounts(mut self, amounts: Vec<i128>) -> Self {
        self.amounts = amounts;
        self
    }

    pub fn with_blinding(mut self, blinding: [u8; 32]) -> Self {
        self.blinding = Some(blinding);
        self
    }

    pub fn with_index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_pool_type(mut self, pool_type: u32) -> Self {
        self.pool_type = pool_type;
        self
    }

    pub fn with_app_data(
        mut self,
        verifier_address: Pubkey,
        schema: AppDataSchema,
        app_data: Vec<Fr>,
        include_app_data: bool,
    ) -> Self {
        self.verifier_address = verifier_address;
        self.app_data_schema = Some(schema);
        self.app_data = app_data;
        self.include_app_data = include_app_data;
        self
    }
}

/// A shielded note
#[derive(Debug, Clone)]
pub struct Utxo {
    amounts: [u64; N_ASSETS],
    assets: [Pubkey; N_ASSETS],
    assets_circuit: [Fr; N_ASSETS],
    blinding: Fr,
    account: Account,
    index: Option<u64>,
    pool_type: u32,
    verifier_address: Pubkey,
    verifier_address_circuit: Fr,
    verifier_program_index: u32,
    spl_asset_index: u32,
    app_data: Vec<Fr>,
    app_data_hash: Fr,
    app_data_schema: Option<AppDataSchema>,
    include_app_data: bool,
}

impl Utxo {
    pub fn new(
        hasher: &impl FieldHasher,
        config: UtxoConfig,
        registries: &Registries,
    ) -> Result<Self, UtxoError> {
        const FN: &str = "Utxo::new";

        let blinding_bytes = config.blinding.unwrap_or_else(random_blinding);
        let blinding = fr_from_canonical_le(&blinding_bytes).ok_or_else(|| {
            UtxoError::new(
                UtxoErrorCode::BlindingExceedsFieldSize,
                FN,
                "blinding is not below the field modulus",
            )
        })?;

        if config.assets.len() != config.amounts.len() {
            return Err(UtxoError::new(
                UtxoErrorCode::InvalidAssetOrAmountsLength,
                FN,
                format!(
                    "{} assets but {} amounts",
                    config.assets.len(),
                    config.amounts.len()
                ),
            ));
        }
        if config.assets.len() > N_ASSETS {
            return Err(UtxoError::new(
                UtxoErrorCode::ExceededMaxAssets,
                FN,
                format!("{} assets, at most {N_ASSETS}", config.assets.len()),
            ));
        }

        let mut amounts = [0u64; N_ASSETS];
        for (slot, amount) in config.amounts.iter().enumerate() {
            if *amount < 0 {
                return Err(UtxoError::new(
                    UtxoErrorCode::NegativeAmount,
                    FN,
                    format!("amounts[{slot}] = {amount}"),
                ));
            }
            amounts[slot] = u64::try_from(*amount).map_err(|_| {
                UtxoError::new(
                    UtxoErrorCode::NotU64,
                    FN,
                    format!("amounts[{slot}] = {amount} exceeds u64"),
                )
            })?;
        }

        let mut assets = [Pubkey::SYSTEM_PROGRAM; N_ASSETS];
        for (slot, asset) in config.assets.iter().enumerate() {
            assets[slot] = *asset;
        }
        if !assets[0].is_system_program() {
            return Err(UtxoError::new(
                UtxoErrorCode::AssetNotFound,
                FN,
                format!("slot 0 must hold the native asset, got {}", assets[0]),
            ));
        }

        // A second native slot is folded into the first.
        if assets[1].is_system_program() && amounts[1] != 0 {
            amounts[0] = amounts[0].checked_add(amounts[1]).ok_or_else(|| {
                UtxoError::new(
                    UtxoErrorCode::NotU64,
                    FN,
                    "native amounts overflow u64 when folded",
                )
            })?;
            amounts[1] = 0;
        }

        let assets_circuit = assets_circuit(&assets, &amounts);

        let verifier_program_index = registries
            .verifiers
            .index_of(&config.verifier_address)
            .ok_or_else(|| {
                UtxoError::new(
                    UtxoErrorCode::VerifierIndexNotFound,
                    FN,
                    format!("verifier {} not in lookup table", config.verifier_address),
                )
            })?;
        let spl_asset_index = registries.assets.index_of(&assets[1]).ok_or_else(|| {
            UtxoError::new(
                UtxoErrorCode::AssetNotFound,
                FN,
                format!("asset {} not in lookup table", assets[1]),
            )
        })?;

        let app_data_hash = match (&config.app_data_schema, config.app_data.is_empty()) {
            (None, false) => {
                return Err(UtxoError::new(
                    UtxoErrorCode::AppDataIdlUndefined,
                    FN,
                    "app data given without a schema",
                ));
            }
            (Some(schema), false) => {
                let computed = schema.hash(hasher, &config.app_data)?;
                if let Some(given) = config.app_data_hash {
                    if given != computed {
                        return Err(UtxoError::new(
                            UtxoErrorCode::InvalidAppData,
                            FN,
                            "app data hash does not match app data",
                        ));
                    }
                }
                computed
            }
            (_, true) => config.app_data_hash.unwrap_or_else(Fr::zero),
        };

        let index = match config.index {
            None if amounts == [0, 0] => Some(0),
            other => other,
        };

        Ok(Self {
            amounts,
            assets,
            assets_circuit,
            blinding,
            account: config.account,
            index,
            pool_type: config.pool_type,
            verifier_address: config.verifier_address,
            verifier_address_circuit: verifier_address_circuit(&config.verifier_address),
            verifier_program_index,
            spl_asset_index,
            app_data: config.app_data,
            app_data_hash,
            app_data_schema: config.app_data_schema,
            include_app_data: config.include_app_data,
        })
    }

    /// The zero note used to pad unused circuit inputs and outputs.
    pub fn empty(
        hasher: &impl FieldHasher,
        account: Account,
        registries: &Registries,
    ) -> Result<Self, UtxoError> {
        Self::new(hasher, UtxoConfig::new(account), registries)
    }

    pub fn amounts(&self) -> [u64; N_ASSETS] {
        self.amounts
    }

    pub fn sol_amount(&self) -> u64 {
        self.amounts[0]
    }

    pub fn spl_amount(&self) -> u64 {
        self.amounts[1]
    }

    pub fn assets(&self) -> [Pubkey; N_ASSETS] {
        self.assets
    }

    /// The SPL mint, if the note carries one.
    pub fn mint(&self) -> Option<Pubkey> {
        (!self.assets[1].is_system_program()).then_some(self.assets[1])
    }

    pub fn assets_circuit(&self) -> [Fr; N_ASSETS] {
        self.assets_circuit
    }

    pub fn blinding(&self) -> Fr {
        self.blinding
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn index(&self) -> Option<u64> {
        self.index
    }

    pub fn set_index(&mut self, index: u64) {
        self.index = Some(index);
    }

    pub fn pool_type(&self) -> u32 {
        self.pool_type
    }

    pub fn verifier_address(&self) -> Pubkey {
        self.verifier_address
    }

    pub fn verifier_address_circuit(&self) -> Fr {
        self.verifier_address_circuit
    }

    pub fn app_data(&self) -> &[Fr] {
        &self.app_data
    }

    pub fn app_data_hash(&self) -> Fr {
        self.app_data_hash
    }

    pub fn is_app_utxo(&self) -> bool {
        !self.verifier_address.is_system_program()
    }

    /// True for the all-zero placeholder note.
    pub fn is_empty(&self) -> bool {
        self.amounts == [0, 0]
    }

    fn commitment_inputs(&self) -> CommitmentInputs {
        CommitmentInputs {
            amounts: [Fr::from(self.amounts[0]), Fr::from(self.amounts[1])],
            owner: self.account.pubkey(),
            blinding: self.blinding,
            assets_circuit: self.assets_circuit,
            app_data_hash: self.app_data_hash,
            pool_type: Fr::from(self.pool_type),
            verifier_address_circuit: self.verifier_address_circuit,
        }
    }

    pub fn commitment(&self, hasher: &impl FieldHasher) -> Commitment {
        self.commitment_inputs().commit(hasher)
    }

    /// Requires a leaf index and an owner that can sign.
    pub fn nullifier(&self, hasher: &impl FieldHasher) -> Result<Nullifier, UtxoError> {
        const FN: &str = "Utxo::nullifier";
        let index = self.index.ok_or_else(|| {
            UtxoError::new(
                UtxoErrorCode::IndexNotProvided,
                FN,
                "leaf index unknown, note not yet inserted",
            )
        })?;
        if !self.account.has_spending_key() {
            return Err(UtxoError::new(
                UtxoErrorCode::AccountHasNoPrivkey,
                FN,
                "owner account is view-only",
            ));
        }
        let commitment = self.commitment(hasher);
        let signature = self
            .account
            .sign(hasher, &commitment, index)
            .map_err(|e| UtxoError::new(UtxoErrorCode::AccountHasNoPrivkey, FN, e.message))?;
        Ok(Nullifier::derive(hasher, &commitment, index, signature))
    }

    // ------------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------------

    /// Compressed form omits the owner keys; the reader supplies the account.
    pub fn to_bytes(&self, compressed: bool) -> Vec<u8> {
        let mut flags = 0u8;
        if !self.app_data_hash.is_zero() {
            flags |= FLAG_APP_DATA_HASH;
        }
        if self.include_app_data && !self.app_data.is_empty() {
            flags |= FLAG_APP_DATA;
        }
        if !compressed {
            flags |= FLAG_OWNER_KEYS;
        }

        let mut bytes = Vec::with_capacity(COMPRESSED_HEADER_LEN + 64);
        bytes.extend_from_slice(&self.amounts[0].to_le_bytes());
        bytes.extend_from_slice(&self.amounts[1].to_le_bytes());
        bytes.extend_from_slice(&self.spl_asset_index.to_le_bytes());
        bytes.extend_from_slice(&self.verifier_program_index.to_le_bytes());
        bytes.extend_from_slice(&self.pool_type.to_le_bytes());
        bytes.push(flags);
        bytes.extend_from_slice(&fr_to_le_bytes(&self.blinding));

        if flags & FLAG_APP_DATA_HASH != 0 {
            bytes.extend_from_slice(&fr_to_le_bytes(&self.app_data_hash));
        }
        if flags & FLAG_APP_DATA != 0 {
            bytes.push(self.app_data.len() as u8);
            for field in &self.app_data {
                bytes.extend_from_slice(&fr_to_le_bytes(field));
            }
        }
        if flags & FLAG_OWNER_KEYS != 0 {
            bytes.extend_from_slice(&fr_to_le_bytes(&self.account.pubkey()));
            bytes.extend_from_slice(&self.account.encryption_public_key());
        }
        bytes
    }

    /// Inverse of [`Utxo::to_bytes`].
    ///
    /// `account` is required for the compressed form. For the uncompressed
    /// form it replaces the embedded keys when it matches them, which keeps
    /// the spending key (and so the nullifier) available.
    pub fn from_bytes(
        hasher: &impl FieldHasher,
        bytes: &[u8],
        account: Option<Account>,
        index: Option<u64>,
        registries: &Registries,
        app_data_schema: Option<&AppDataSchema>,
    ) -> Result<Self, UtxoError> {
        const FN: &str = "Utxo::from_bytes";
        let mut reader = Reader::new(bytes, FN);

        let amount0 = reader.u64()?;
        let amount1 = reader.u64()?;
        let spl_asset_index = reader.u32()?;
        let verifier_index = reader.u32()?;
        let pool_type = reader.u32()?;
        let flags = reader.u8()?;
        let blinding = reader.array32()?;

        let app_data_hash = if flags & FLAG_APP_DATA_HASH != 0 {
            Some(reader.field()?)
        } else {
            None
        };
        let mut app_data = Vec::new();
        if flags & FLAG_APP_DATA != 0 {
            let n = reader.u8()? as usize;
            if n > MAX_APP_DATA_FIELDS {
                return Err(UtxoError::new(
                    UtxoErrorCode::InvalidAppData,
                    FN,
                    format!("{n} app data fields, at most {MAX_APP_DATA_FIELDS}"),
                ));
            }
            for _ in 0..n {
                app_data.push(reader.field()?);
            }
        }

        let account = if flags & FLAG_OWNER_KEYS != 0 {
            let pubkey = reader.array32()?;
            let encryption_pubkey = reader.array32()?;
            let embedded = Account::from_public_keys(&pubkey, encryption_pubkey)
                .map_err(|e| UtxoError::new(UtxoErrorCode::InvalidBytes, FN, e.message))?;
            match account {
                Some(given) if given == embedded => given,
                _ => embedded,
            }
        } else {
            account.ok_or_else(|| {
                UtxoError::new(
                    UtxoErrorCode::AccountUndefined,
                    FN,
                    "compressed note needs the owner account",
                )
            })?
        };
        reader.finish()?;

        let spl_asset = *registries.assets.get(spl_asset_index).ok_or_else(|| {
            UtxoError::new(
                UtxoErrorCode::AssetNotFound,
                FN,
                format!("asset index {spl_asset_index} not in lookup table"),
            )
        })?;
        let verifier_address = *registries.verifiers.get(verifier_index).ok_or_else(|| {
            UtxoError::new(
                UtxoErrorCode::VerifierIndexNotFound,
                FN,
                format!("verifier index {verifier_index} not in lookup table"),
            )
        })?;

        let include_app_data = !app_data.is_empty();
        let mut config = UtxoConfig::new(account)
            .with_assets(vec![Pubkey::SYSTEM_PROGRAM, spl_asset])
            .with_amounts(vec![amount0 as i128, amount1 as i128])
            .with_blinding(blinding)
            .with_pool_type(pool_type);
        config.index = index;
        config.verifier_address = verifier_address;
        config.app_data = app_data;
        config.app_data_hash = app_data_hash;
        config.app_data_schema = app_data_schema.cloned();
        config.include_app_data = include_app_data;

        Self::new(hasher, config, registries)
    }

    pub fn from_string(
        hasher: &impl FieldHasher,
        s: &str,
        account: Option<Account>,
        index: Option<u64>,
        registries: &Registries,
        app_data_schema: Option<&AppDataSchema>,
    ) -> Result<Self, UtxoError> {
        let bytes = bs58::decode(s).into_vec().map_err(|e| {
            UtxoError::new(UtxoErrorCode::InvalidBytes, "Utxo::from_string", e.to_string())
        })?;
        Self::from_bytes(hasher, &bytes, account, index, registries, app_data_schema)
    }

    // ------------------------------------------------------------------------
    // Encryption
    // ------------------------------------------------------------------------

    /// Symmetric when the owner holds a viewing key, otherwise sealed to the
    /// owner's encryption public key.
    pub fn encrypt(
        &self,
        hasher: &impl FieldHasher,
        merkle_tree: &Pubkey,
    ) -> Result<Vec<u8>, UtxoError> {
        let commitment = self.commitment(hasher);
        let plaintext = self.to_bytes(true);
        if self.account.has_viewing_key() {
            let key = self
                .account
                .get_utxo_viewing_key(merkle_tree, &commitment)
                .map_err(|e| {
                    UtxoError::new(UtxoErrorCode::EncryptionFailed, "Utxo::encrypt", e.message)
                })?;
            encrypt_symmetric(&key, &commitment, &plaintext)
        } else {
            encrypt_asymmetric(
                &self.account.encryption_public_key(),
                &commitment,
                &plaintext,
                &mut rand::thread_rng(),
            )
        }
    }

    pub fn encryption_mode(&self) -> EncryptionMode {
        if self.account.has_viewing_key() {
            EncryptionMode::Symmetric
        } else {
            EncryptionMode::Asymmetric
        }
    }

    /// Decrypt a note addressed to `account`.
    ///
    /// Returns `None` when the ciphertext is not for this account, is
    /// corrupted, or decrypts to a note whose commitment differs.
    #[allow(clippy::too_many_arguments)]
    pub fn decrypt(
        hasher: &impl FieldHasher,
        mode: EncryptionMode,
        ciphertext: &[u8],
        account: &Account,
        merkle_tree: &Pubkey,
        commitment: &Commitment,
        index: Option<u64>,
        registries: &Registries,
        app_data_schema: Option<&AppDataSchema>,
    ) -> Option<Self> {
        let plaintext = match mode {
            EncryptionMode::Symmetric => {
                let key = account.get_utxo_viewing_key(merkle_tree, commitment).ok()?;
                decrypt_symmetric(&key, commitment, ciphertext)?
            }
            EncryptionMode::Asymmetric => decrypt_asymmetric(account, commitment, ciphertext)?,
        };

        let utxo = match Self::from_bytes(
            hasher,
            &plaintext,
            Some(account.clone()),
            index,
            registries,
            app_data_schema,
        ) {
            Ok(utxo) => utxo,
            Err(e) => {
                log::debug!("decrypted note does not parse: {e}");
                return None;
            }
        };
        if utxo.commitment(hasher) != *commitment {
            log::debug!("decrypted note does not match commitment");
            return None;
        }
        Some(utxo)
    }

    /// Try symmetric first (own notes), then asymmetric.
    #[allow(clippy::too_many_arguments)]
    pub fn decrypt_any(
        hasher: &impl FieldHasher,
        ciphertext: &[u8],
        account: &Account,
        merkle_tree: &Pubkey,
        commitment: &Commitment,
        index: Option<u64>,
        registries: &Registries,
        app_data_schema: Option<&AppDataSchema>,
    ) -> Option<Self> {
        [EncryptionMode::Symmetric, EncryptionMode::Asymmetric]
            .into_iter()
            .find_map(|mode| {
                Self::decrypt(
                    hasher,
                    mode,
                    ciphertext,
                    account,
                    merkle_tree,
                    commitment,
                    index,
                    registries,
                    app_data_schema,
                )
            })
    }

    /// Compare every public field, and the nullifiers unless skipped.
    pub fn equal(
        hasher: &impl FieldHasher,
        a: &Utxo,
        b: &Utxo,
        skip_nullifier: bool,
    ) -> Result<(), UtxoError> {
        fn check(same: bool, field: &str) -> Result<(), UtxoError> {
            if same {
                Ok(())
            } else {
                Err(UtxoError::new(
                    UtxoErrorCode::UtxosNotEqual,
                    "Utxo::equal",
                    format!("{field} differs"),
                ))
            }
        }

        check(a.amounts == b.amounts, "amounts")?;
        check(a.assets == b.assets, "assets")?;
        check(a.assets_circuit == b.assets_circuit, "assets_circuit")?;
        check(a.blinding == b.blinding, "blinding")?;
        check(a.account.pubkey() == b.account.pubkey(), "owner pubkey")?;
        check(
            a.account.encryption_public_key() == b.account.encryption_public_key(),
            "encryption pubkey",
        )?;
        check(a.pool_type == b.pool_type, "pool_type")?;
        check(a.verifier_address == b.verifier_address, "verifier_address")?;
        check(a.app_data_hash == b.app_data_hash, "app_data_hash")?;
        check(a.commitment(hasher) == b.commitment(hasher), "commitment")?;
        if !skip_nullifier {
            check(a.index == b.index, "index")?;
            check(a.nullifier(hasher)? == b.nullifier(hasher)?, "nullifier")?;
        }
        Ok(())
    }
}

/// base58 of the uncompressed bytes, read back by [`Utxo::from_string`].
impl fmt::Display for Utxo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.to_bytes(false)).into_string())
    }
}

/// `[h(native), h(mint)]` for token notes, `[h(native), 0]` for native-only
/// notes and `[0, 0]` for the empty note.
fn assets_circuit(assets: &[Pubkey; N_ASSETS], amounts: &[u64; N_ASSETS]) -> [Fr; N_ASSETS] {
    let native = hash_and_truncate_to_circuit(Pubkey::SYSTEM_PROGRAM.as_bytes());
    if !assets[1].is_system_program() {
        [native, hash_and_truncate_to_circuit(assets[1].as_bytes())]
    } else if amounts[0] == 0 {
        [Fr::zero(), Fr::zero()]
    } else {
        [native, Fr::zero()]
    }
}

fn verifier_address_circuit(address: &Pubkey) -> Fr {
    if address.is_system_program() {
        Fr::zero()
    } else {
        hash_and_truncate_to_circuit(address.as_bytes())
    }
}

/// 31 random bytes, always below the field modulus.
fn random_blinding() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes[..31]);
    bytes
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    function: &'static str,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], function: &'static str) -> Self {
        Self {
            bytes,
            pos: 0,
            function,
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], UtxoError> {
        let end = self.pos + n;
        let slice = self.bytes.get(self.pos..end).ok_or_else(|| {
            UtxoError::new(
                UtxoErrorCode::InvalidBytes,
                self.function,
                format!("need {end} bytes, have {}", self.bytes.len()),
            )
        })?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, UtxoError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, UtxoError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64, UtxoError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn array32(&mut self) -> Result<[u8; 32], UtxoError> {
        let mut buf = [0u8; 32];
        buf.copy_from_slice(self.take(32)?);
        Ok(buf)
    }

    fn field(&mut self) -> Result<Fr, UtxoError> {
        let bytes = self.array32()?;
        fr_from_canonical_le(&bytes).ok_or_else(|| {
            UtxoError::new(
                UtxoErrorCode::InvalidBytes,
                self.function,
                "field element exceeds modulus",
            )
        })
    }

    fn finish(&self) -> Result<(), UtxoError> {
        if self.pos != self.bytes.len() {
            return Err(UtxoError::new(
                UtxoErrorCode::InvalidBytes,
                self.function,
                format!("{} trailing bytes", self.bytes.len() - self.pos),
            ));
        }
        Ok(())
    }
}
