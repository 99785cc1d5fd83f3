//! Asset and verifier lookup tables
//!
//! Notes store small indices instead of full keys. Both tables are built
//! once from configuration and passed explicitly to everything that needs
//! to resolve an index.

use std::str::FromStr;

use shroud_config::{AssetsConfig, ShroudConfig, VerifiersConfig};
use shroud_pubkey::Pubkey;

use crate::error::{RegistryError, RegistryErrorCode};

/// A supported token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenData {
    pub symbol: String,
    pub mint: Pubkey,
    /// Base units per whole token.
    pub decimals: u64,
}

/// Ordered asset table. Index 0 is always the native asset (system program).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRegistry {
    tokens: Vec<TokenData>,
}

impl AssetRegistry {
    pub fn new(tokens: Vec<TokenData>) -> Result<Self, RegistryError> {
        match tokens.first() {
            Some(native) if native.mint.is_system_program() => {}
            _ => {
                return Err(RegistryError::new(
                    RegistryErrorCode::NativeAssetMissing,
                    "AssetRegistry::new",
                    "first asset must be the system program",
                ));
            }
        }
        for (i, token) in tokens.iter().enumerate() {
            if tokens[..i].iter().any(|t| t.mint == token.mint) {
                return Err(RegistryError::new(
                    RegistryErrorCode::DuplicateEntry,
                    "AssetRegistry::new",
                    format!("mint {} listed twice", token.mint),
                ));
            }
        }
        Ok(Self { tokens })
    }

    pub fn from_config(config: &AssetsConfig) -> Result<Self, RegistryError> {
        let tokens = config
            .tokens
            .iter()
            .map(|t| {
                Ok(TokenData {
                    symbol: t.symbol.clone(),
                    mint: parse(&t.mint, "AssetRegistry::from_config")?,
                    decimals: t.decimals,
                })
            })
            .collect::<Result<Vec<_>, RegistryError>>()?;
        Self::new(tokens)
    }

    pub fn index_of(&self, mint: &Pubkey) -> Option<u32> {
        self.tokens
            .iter()
            .position(|t| t.mint == *mint)
            .map(|i| i as u32)
    }

    pub fn get(&self, index: u32) -> Option<&Pubkey> {
        self.tokens.get(index as usize).map(|t| &t.mint)
    }

    pub fn token_by_mint(&self, mint: &Pubkey) -> Option<&TokenData> {
        self.tokens.iter().find(|t| t.mint == *mint)
    }

    pub fn token_by_symbol(&self, symbol: &str) -> Option<&TokenData> {
        self.tokens
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn tokens(&self) -> &[TokenData] {
        &self.tokens
    }
}

/// Verifier programs plus the table app utxos index into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierRegistry {
    /// Index 0 is the system program (no app verifier).
    programs: Vec<Pubkey>,
    pub two_in_two_out: Pubkey,
    pub ten_in_two_out: Pubkey,
    pub four_in_four_out: Pubkey,
}

impl VerifierRegistry {
    pub fn new(
        two_in_two_out: Pubkey,
        ten_in_two_out: Pubkey,
        four_in_four_out: Pubkey,
        app_programs: Vec<Pubkey>,
    ) -> Self {
        let mut programs = Vec::with_capacity(app_programs.len() + 1);
        programs.push(Pubkey::SYSTEM_PROGRAM);
        programs.extend(app_programs.into_iter().filter(|p| !p.is_system_program()));
        Self {
            programs,
            two_in_two_out,
            ten_in_two_out,
            four_in_four_out,
        }
    }

    pub fn from_config(config: &VerifiersConfig) -> Result<Self, RegistryError> {
        const FN: &str = "VerifierRegistry::from_config";
        let app_programs = config
            .app_programs
            .iter()
            .map(|p| parse(p, FN))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(
            parse(&config.two_in_two_out, FN)?,
            parse(&config.ten_in_two_out, FN)?,
            parse(&config.four_in_four_out, FN)?,
            app_programs,
        ))
    }

    pub fn index_of(&self, program: &Pubkey) -> Option<u32> {
        self.programs
            .iter()
            .position(|p| p == program)
            .map(|i| i as u32)
    }

    pub fn get(&self, index: u32) -> Option<&Pubkey> {
        self.programs.get(index as usize)
    }
}

/// Both lookup tables, threaded through note and transaction construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registries {
    pub assets: AssetRegistry,
    pub verifiers: VerifierRegistry,
}

impl Registries {
    pub fn from_config(config: &ShroudConfig) -> Result<Self, RegistryError> {
        Ok(Self {
            assets: AssetRegistry::from_config(&config.assets)?,
            verifiers: VerifierRegistry::from_config(&config.verifiers)?,
        })
    }
}

fn parse(value: &str, function: &'static str) -> Result<Pubkey, RegistryError> {
    Pubkey::from_str(value).map_err(|e| {
        RegistryError::new(RegistryErrorCode::InvalidPubkey, function, format!("{value}: {e}"))
    })
}
