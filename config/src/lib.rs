//! Shroud Configuration
//!
//! Shared configuration crate for all Shroud components.
//!
//! Handles loading configuration from:
//! 1. SHROUD_CONFIG env var (explicit path)
//! 2. ./config.toml (current directory)
//! 3. ~/.shroud/config.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shroud_pubkey::Pubkey;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::{env, fs};

/// Global config instance for convenience access
pub static GLOBAL_CONFIG: OnceLock<ShroudConfig> = OnceLock::new();

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".shroud";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8899";
const DEFAULT_MERKLE_TREE_PROGRAM: &str = "6Byxr4eYKPgd6AABnzd94CA8n3Ftx39L38X5obquUxcX";
const DEFAULT_TRANSACTION_MERKLE_TREE: &str = "CjEUAXHvgGJVbR6scatthvCABuHo97VUSiHQ87L2QjGY";
const DEFAULT_EVENT_MERKLE_TREE: &str = "CbRMi5XfGdaCA82xqKmyCbAPtpHfUoKoVVqvb2bAdvb1";
const DEFAULT_VERIFIER_ZERO: &str = "AywxCVDB1sWoHDtE3rDNt1osdTJR5C2SWtJZtcweak1v";
const DEFAULT_VERIFIER_ONE: &str = "8DxjTGoUxfcXutQ4awhxqFv6bmWQm1XMN3mtFWFNon33";
const DEFAULT_VERIFIER_APP: &str = "7AQxunjcZzrTBA6JejQhbseAKpVPK5HhxQMCjC7HcAF1";
const DEFAULT_APP_PROGRAM: &str = "GpN5s1Zu8FQBcyaVCZuCD9bsBT9txZvm1gxBbhsQxwn2";
const DEFAULT_RELAYER: &str = "fZgHKTu2vRszz9oquDhqS9jiBLE3knFe9LBserWR2vw";
const DEFAULT_RELAYER_RECIPIENT: &str = "8MUKSoQzrTYofF7gpt1Dmg1SwHFVN1N47N1GgbZQatuc";
const DEFAULT_USDC_MINT: &str = "GVyzwFtme9tQNq7Y4VRHQXSJGjJxV36Fi2y9yxhLGL92";
const SYSTEM_PROGRAM: &str = "11111111111111111111111111111111";

/// Leaf index after which the next Merkle tree pair is attached.
const DEFAULT_ROLLOVER_THRESHOLD: u64 = (1 << 18) - 256;
const DEFAULT_ENCRYPTED_UTXO_SLOT: usize = 128;
const DEFAULT_RELAYER_FEE: u64 = 100_000;
const DEFAULT_ATA_CREATION_FEE: u64 = 2_039_280;
const DEFAULT_SOL_DECIMALS: u64 = 1_000_000_000;
const DEFAULT_USDC_DECIMALS: u64 = 100;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShroudConfig {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub relayer: RelayerConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub verifiers: VerifiersConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
}

/// Merkle tree accounts of the pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_merkle_tree_program")]
    pub merkle_tree_program_id: String,
    #[serde(default = "default_transaction_merkle_tree")]
    pub transaction_merkle_tree: String,
    #[serde(default = "default_event_merkle_tree")]
    pub event_merkle_tree: String,
    /// Next pair of trees, attached once `rollover_threshold` is reached.
    #[serde(default)]
    pub next_transaction_merkle_tree: Option<String>,
    #[serde(default)]
    pub next_event_merkle_tree: Option<String>,
    #[serde(default = "default_rollover_threshold")]
    pub rollover_threshold: u64,
    #[serde(default = "default_encrypted_utxo_slot")]
    pub encrypted_utxo_slot_size: usize,
    #[serde(default)]
    pub shuffle: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            merkle_tree_program_id: DEFAULT_MERKLE_TREE_PROGRAM.into(),
            transaction_merkle_tree: DEFAULT_TRANSACTION_MERKLE_TREE.into(),
            event_merkle_tree: DEFAULT_EVENT_MERKLE_TREE.into(),
            next_transaction_merkle_tree: None,
            next_event_merkle_tree: None,
            rollover_threshold: DEFAULT_ROLLOVER_THRESHOLD,
            encrypted_utxo_slot_size: DEFAULT_ENCRYPTED_UTXO_SLOT,
            shuffle: false,
        }
    }
}

fn default_merkle_tree_program() -> String {
    DEFAULT_MERKLE_TREE_PROGRAM.into()
}
fn default_transaction_merkle_tree() -> String {
    DEFAULT_TRANSACTION_MERKLE_TREE.into()
}
fn default_event_merkle_tree() -> String {
    DEFAULT_EVENT_MERKLE_TREE.into()
}
fn default_rollover_threshold() -> u64 {
    DEFAULT_ROLLOVER_THRESHOLD
}
fn default_encrypted_utxo_slot() -> usize {
    DEFAULT_ENCRYPTED_UTXO_SLOT
}

/// Relayer account and fee schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerConfig {
    #[serde(default = "default_relayer")]
    pub pubkey: String,
    #[serde(default = "default_relayer_recipient")]
    pub recipient_sol: String,
    #[serde(default = "default_relayer_fee")]
    pub fee: u64,
    #[serde(default = "default_ata_creation_fee")]
    pub ata_creation_fee: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            pubkey: DEFAULT_RELAYER.into(),
            recipient_sol: DEFAULT_RELAYER_RECIPIENT.into(),
            fee: DEFAULT_RELAYER_FEE,
            ata_creation_fee: DEFAULT_ATA_CREATION_FEE,
            url: None,
        }
    }
}

fn default_relayer() -> String {
    DEFAULT_RELAYER.into()
}
fn default_relayer_recipient() -> String {
    DEFAULT_RELAYER_RECIPIENT.into()
}
fn default_relayer_fee() -> u64 {
    DEFAULT_RELAYER_FEE
}
fn default_ata_creation_fee() -> u64 {
    DEFAULT_ATA_CREATION_FEE
}

/// One supported token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    pub mint: String,
    /// Base units per whole token.
    pub decimals: u64,
}

/// Supported assets. The native asset (system program) is always index 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    #[serde(default = "default_tokens")]
    pub tokens: Vec<TokenConfig>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            tokens: default_tokens(),
        }
    }
}

fn default_tokens() -> Vec<TokenConfig> {
    vec![
        TokenConfig {
            symbol: "SOL".into(),
            mint: SYSTEM_PROGRAM.into(),
            decimals: DEFAULT_SOL_DECIMALS,
        },
        TokenConfig {
            symbol: "USDC".into(),
            mint: DEFAULT_USDC_MINT.into(),
            decimals: DEFAULT_USDC_DECIMALS,
        },
    ]
}

/// Verifier programs and the app program lookup table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiersConfig {
    #[serde(default = "default_verifier_zero")]
    pub two_in_two_out: String,
    #[serde(default = "default_verifier_one")]
    pub ten_in_two_out: String,
    #[serde(default = "default_verifier_app")]
    pub four_in_four_out: String,
    /// Programs that may own app utxos, in lookup-table order after the system program.
    #[serde(default = "default_app_programs")]
    pub app_programs: Vec<String>,
}

impl Default for VerifiersConfig {
    fn default() -> Self {
        Self {
            two_in_two_out: DEFAULT_VERIFIER_ZERO.into(),
            ten_in_two_out: DEFAULT_VERIFIER_ONE.into(),
            four_in_four_out: DEFAULT_VERIFIER_APP.into(),
            app_programs: default_app_programs(),
        }
    }
}

fn default_verifier_zero() -> String {
    DEFAULT_VERIFIER_ZERO.into()
}
fn default_verifier_one() -> String {
    DEFAULT_VERIFIER_ONE.into()
}
fn default_verifier_app() -> String {
    DEFAULT_VERIFIER_APP.into()
}
fn default_app_programs() -> Vec<String> {
    vec![DEFAULT_APP_PROGRAM.into()]
}

/// RPC endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_url")]
    pub url: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RPC_URL.into(),
        }
    }
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.into()
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

/// Set field from env var if present
fn env_string(key: &str, field: &mut String) {
    if let Ok(v) = env::var(key) {
        *field = v;
    }
}

/// Set Option<String> from env var if present
fn env_option_string(key: &str, field: &mut Option<String>) {
    if let Ok(v) = env::var(key) {
        *field = Some(v);
    }
}

/// Set field from env var if present and parseable
fn env_parse<T: std::str::FromStr>(key: &str, field: &mut T) {
    if let Ok(v) = env::var(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => log::warn!("Ignoring unparseable {key}={v}"),
        }
    }
}

/// Check if env var is set to a truthy value ("1" or "true")
fn env_bool(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

// ============================================================================
// Implementation
// ============================================================================

impl ShroudConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::read(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn read(path: &std::path::Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = env::var("SHROUD_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            log::warn!("SHROUD_CONFIG points at {}, which does not exist", path.display());
        }

        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        Self::default_config_path().filter(|p| p.exists())
    }

    fn apply_env_overrides(&mut self) {
        // Pool
        env_string(
            "SHROUD_MERKLE_TREE_PROGRAM",
            &mut self.pool.merkle_tree_program_id,
        );
        env_string(
            "SHROUD_TRANSACTION_MERKLE_TREE",
            &mut self.pool.transaction_merkle_tree,
        );
        env_string("SHROUD_EVENT_MERKLE_TREE", &mut self.pool.event_merkle_tree);
        env_option_string(
            "SHROUD_NEXT_TRANSACTION_MERKLE_TREE",
            &mut self.pool.next_transaction_merkle_tree,
        );
        env_option_string(
            "SHROUD_NEXT_EVENT_MERKLE_TREE",
            &mut self.pool.next_event_merkle_tree,
        );
        env_parse("SHROUD_ROLLOVER_THRESHOLD", &mut self.pool.rollover_threshold);
        if let Some(v) = env_bool("SHROUD_SHUFFLE") {
            self.pool.shuffle = v;
        }

        // Relayer
        env_string("SHROUD_RELAYER_PUBKEY", &mut self.relayer.pubkey);
        env_string("SHROUD_RELAYER_RECIPIENT", &mut self.relayer.recipient_sol);
        env_parse("SHROUD_RELAYER_FEE", &mut self.relayer.fee);
        env_option_string("SHROUD_RELAYER_URL", &mut self.relayer.url);

        // Verifiers
        env_string("SHROUD_VERIFIER_ZERO", &mut self.verifiers.two_in_two_out);
        env_string("SHROUD_VERIFIER_ONE", &mut self.verifiers.ten_in_two_out);
        env_string("SHROUD_VERIFIER_APP", &mut self.verifiers.four_in_four_out);

        // Rpc
        env_string("SHROUD_RPC_URL", &mut self.rpc.url);
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.pool.shuffle = true;
        sample.relayer.url = Some("http://127.0.0.1:3332".into());
        toml::to_string_pretty(&sample).unwrap_or_default()
    }

    /// Parse the pool section into typed keys.
    pub fn pool_runtime(&self) -> Result<PoolRuntime> {
        let pool = &self.pool;
        let next_trees = match (
            &pool.next_transaction_merkle_tree,
            &pool.next_event_merkle_tree,
        ) {
            (Some(tx), Some(event)) => Some((
                parse_pubkey("pool.next_transaction_merkle_tree", tx)?,
                parse_pubkey("pool.next_event_merkle_tree", event)?,
            )),
            (None, None) => None,
            _ => anyhow::bail!(
                "pool.next_transaction_merkle_tree and pool.next_event_merkle_tree go together"
            ),
        };
        Ok(PoolRuntime {
            merkle_tree_program: parse_pubkey(
                "pool.merkle_tree_program_id",
                &pool.merkle_tree_program_id,
            )?,
            transaction_merkle_tree: parse_pubkey(
                "pool.transaction_merkle_tree",
                &pool.transaction_merkle_tree,
            )?,
            event_merkle_tree: parse_pubkey("pool.event_merkle_tree", &pool.event_merkle_tree)?,
            next_trees,
            rollover_threshold: pool.rollover_threshold,
            encrypted_utxo_slot_size: pool.encrypted_utxo_slot_size,
            shuffle: pool.shuffle,
        })
    }

    /// Parse the relayer section into typed keys.
    pub fn relayer_runtime(&self) -> Result<RelayerRuntime> {
        Ok(RelayerRuntime {
            pubkey: parse_pubkey("relayer.pubkey", &self.relayer.pubkey)?,
            recipient_sol: parse_pubkey("relayer.recipient_sol", &self.relayer.recipient_sol)?,
            fee: self.relayer.fee,
            ata_creation_fee: self.relayer.ata_creation_fee,
        })
    }

    /// Get the global config instance, initializing it if necessary.
    ///
    /// Falls back to defaults if loading fails.
    pub fn global() -> &'static ShroudConfig {
        GLOBAL_CONFIG.get_or_init(|| {
            Self::load().unwrap_or_else(|e| {
                log::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            })
        })
    }

    /// Returns `None` if config hasn't been initialized yet.
    pub fn try_global() -> Option<&'static ShroudConfig> {
        GLOBAL_CONFIG.get()
    }

    /// Returns `Err(config)` if already initialized.
    pub fn set_global(config: ShroudConfig) -> Result<(), ShroudConfig> {
        GLOBAL_CONFIG.set(config)
    }
}

/// Shorthand for `ShroudConfig::global()`.
#[inline]
pub fn global_config() -> &'static ShroudConfig {
    ShroudConfig::global()
}

/// Parse a base58 key, naming the config field on failure.
pub fn parse_pubkey(field: &str, value: &str) -> Result<Pubkey> {
    Pubkey::from_str(value).with_context(|| format!("Invalid {field} in config: {value}"))
}

// ============================================================================
// Parsed Config
// ============================================================================

/// Pool configuration with `Pubkey` fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolRuntime {
    pub merkle_tree_program: Pubkey,
    pub transaction_merkle_tree: Pubkey,
    pub event_merkle_tree: Pubkey,
    /// (transaction tree, event tree) to attach after rollover
    pub next_trees: Option<(Pubkey, Pubkey)>,
    pub rollover_threshold: u64,
    pub encrypted_utxo_slot_size: usize,
    pub shuffle: bool,
}

/// Relayer configuration with `Pubkey` fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayerRuntime {
    pub pubkey: Pubkey,
    pub recipient_sol: Pubkey,
    pub fee: u64,
    pub ata_creation_fee: u64,
}

// ============================================================================
// Tests
// ============================================================================
