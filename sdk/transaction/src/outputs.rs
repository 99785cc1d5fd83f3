//! Output construction
//!
//! Builds recipient notes and the change note returning what is left of the
//! inputs to the sender:
//!
//! ```text
//! change = Σ inputs + shield − unshield − Σ recipients − relayer fee (SOL only)
//! ```
//!
//! Value conservation is re-checked on the finished outputs.

use shroud_privacy::{Account, AppDataSchema, FieldHasher, Fr, Registries, Utxo, UtxoConfig};
use shroud_pubkey::Pubkey;

use crate::error::{CreateUtxoError, CreateUtxoErrorCode, Result};
use crate::params::Action;

/// A shielded payment to someone.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub account: Account,
    pub sol_amount: u64,
    pub spl_amount: u64,
    pub mint: Option<Pubkey>,
}

/// Makes the change note an app note.
#[derive(Debug, Clone)]
pub struct AppUtxoConfig {
    pub verifier_address: Pubkey,
    pub schema: AppDataSchema,
    pub app_data: Vec<Fr>,
    pub include_app_data: bool,
}

/// Net public flow into the pool per asset; unshields and fees are negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublicAmounts {
    pub sol: i128,
    pub spl: i128,
    pub mint: Option<Pubkey>,
}

impl PublicAmounts {
    pub fn new(
        action: Action,
        sol: Option<u64>,
        spl: Option<u64>,
        mint: Option<Pubkey>,
        relayer_fee: Option<u64>,
    ) -> Self {
        let sol = sol.unwrap_or(0) as i128;
        let spl = spl.unwrap_or(0) as i128;
        match action {
            Action::Shield => Self { sol, spl, mint },
            Action::Unshield => Self {
                sol: -sol - relayer_fee.unwrap_or(0) as i128,
                spl: -spl,
                mint,
            },
            Action::Transfer => Self {
                sol: -(relayer_fee.unwrap_or(0) as i128),
                spl: 0,
                mint,
            },
        }
    }

    fn of(&self, asset: &Pubkey) -> i128 {
        if asset.is_system_program() {
            self.sol
        } else if Some(*asset) == self.mint {
            self.spl
        } else {
            0
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateOutUtxosRequest<'a> {
    pub action: Action,
    /// Owner of the change note
    pub change_account: &'a Account,
    pub in_utxos: &'a [Utxo],
    /// Recipient notes, placed before the change
    pub out_utxos: &'a [Utxo],
    pub public_mint: Option<Pubkey>,
    pub public_amount_sol: Option<u64>,
    pub public_amount_spl: Option<u64>,
    pub relayer_fee: Option<u64>,
    pub number_max_out_utxos: usize,
    /// Return SOL change in its own note
    pub separate_sol_utxo: bool,
    pub app_utxo: Option<&'a AppUtxoConfig>,
}

fn error(code: CreateUtxoErrorCode, message: impl Into<String>) -> CreateUtxoError {
    CreateUtxoError::new(code, "createOutUtxos", message)
}

/// Amount of `asset` held by the notes.
fn asset_sum(utxos: &[Utxo], asset: &Pubkey) -> i128 {
    utxos
        .iter()
        .flat_map(|u| u.assets().into_iter().zip(u.amounts()))
        .filter(|(a, amount)| a == asset && *amount > 0)
        .map(|(_, amount)| amount as i128)
        .sum()
}

pub fn create_out_utxos(
    hasher: &impl FieldHasher,
    request: &CreateOutUtxosRequest<'_>,
    registries: &Registries,
) -> Result<Vec<Utxo>> {
    use CreateUtxoErrorCode as Code;

    if request.public_amount_sol.is_none()
        && request.public_amount_spl.is_none()
        && request.out_utxos.is_empty()
    {
        return Err(error(
            Code::NoPublicAmountsProvided,
            "no public amounts and no recipients",
        )
        .into());
    }
    if request.public_amount_spl.unwrap_or(0) > 0 && request.public_mint.is_none() {
        return Err(error(Code::NoPublicMintProvided, "spl amount given without a mint").into());
    }
    if request.out_utxos.len() >= request.number_max_out_utxos {
        return Err(error(
            Code::InvalidNumberOfRecipients,
            format!(
                "{} recipients, at most {} besides the change note",
                request.out_utxos.len(),
                request.number_max_out_utxos.saturating_sub(1)
            ),
        )
        .into());
    }

    let in_mints: Vec<Pubkey> = request.in_utxos.iter().filter_map(Utxo::mint).collect();
    let mint = request
        .public_mint
        .or_else(|| in_mints.first().copied())
        .or_else(|| request.out_utxos.iter().find_map(Utxo::mint));
    if let Some(bad) = request
        .out_utxos
        .iter()
        .filter_map(Utxo::mint)
        .find(|m| Some(*m) != mint)
    {
        return Err(error(
            Code::InvalidRecipientMint,
            format!("recipient mint {bad} is not in use"),
        )
        .into());
    }
    if in_mints.iter().any(|m| Some(*m) != mint) {
        return Err(error(
            Code::InvalidOutputUtxoLength,
            "inputs hold more than one spl asset, change would need extra notes",
        )
        .into());
    }

    let public = PublicAmounts::new(
        request.action,
        request.public_amount_sol,
        request.public_amount_spl,
        mint,
        request.relayer_fee,
    );
    let mut assets = vec![Pubkey::SYSTEM_PROGRAM];
    assets.extend(mint);
    validate_utxo_amounts(&assets, request.in_utxos, request.out_utxos, &public)?;

    let change_sol = asset_sum(request.in_utxos, &Pubkey::SYSTEM_PROGRAM) + public.sol
        - asset_sum(request.out_utxos, &Pubkey::SYSTEM_PROGRAM);
    let change_spl = match &mint {
        Some(m) => asset_sum(request.in_utxos, m) + public.spl - asset_sum(request.out_utxos, m),
        None => 0,
    };

    let mut changes = Vec::with_capacity(2);
    match mint {
        Some(m) if request.separate_sol_utxo && change_sol > 0 && change_spl > 0 => {
            changes.push((vec![Pubkey::SYSTEM_PROGRAM, m], vec![0, change_spl]));
            changes.push((vec![Pubkey::SYSTEM_PROGRAM], vec![change_sol]));
        }
        Some(m) => changes.push((vec![Pubkey::SYSTEM_PROGRAM, m], vec![change_sol, change_spl])),
        None => changes.push((vec![Pubkey::SYSTEM_PROGRAM], vec![change_sol])),
    }

    let mut outputs = request.out_utxos.to_vec();
    for (i, (assets, amounts)) in changes.into_iter().enumerate() {
        let mut config = UtxoConfig::new(request.change_account.clone())
            .with_assets(assets)
            .with_amounts(amounts);
        if let (0, Some(app)) = (i, request.app_utxo) {
            config = config.with_app_data(
                app.verifier_address,
                app.schema.clone(),
                app.app_data.clone(),
                app.include_app_data,
            );
        }
        outputs.push(Utxo::new(hasher, config, registries)?);
    }

    if outputs.len() > request.number_max_out_utxos {
        return Err(error(
            Code::InvalidOutputUtxoLength,
            format!(
                "{} outputs, verifier takes {}",
                outputs.len(),
                request.number_max_out_utxos
            ),
        )
        .into());
    }

    for asset in &assets {
        let expected = asset_sum(request.in_utxos, asset) + public.of(asset);
        let actual = asset_sum(&outputs, asset);
        if expected != actual {
            return Err(error(
                Code::RecipientsSumAmountMissmatch,
                format!("{asset}: outputs hold {actual}, inputs and public amounts {expected}"),
            )
            .into());
        }
    }

    log::debug!(
        "{:?}: {} recipient notes, change sol {change_sol} spl {change_spl}",
        request.action,
        request.out_utxos.len()
    );
    Ok(outputs)
}

/// Outputs of every asset must be covered by inputs plus the public flow.
pub fn validate_utxo_amounts(
    asset_pubkeys: &[Pubkey],
    in_utxos: &[Utxo],
    out_utxos: &[Utxo],
    public: &PublicAmounts,
) -> Result<(), CreateUtxoError> {
    for asset in asset_pubkeys {
        let available = asset_sum(in_utxos, asset) + public.of(asset);
        let spent = asset_sum(out_utxos, asset);
        if spent > available {
            return Err(CreateUtxoError::new(
                CreateUtxoErrorCode::RecipientsSumAmountMissmatch,
                "validateUtxoAmounts",
                format!("{asset}: outputs need {spent}, only {available} available"),
            ));
        }
    }
    Ok(())
}

/// One note per recipient.
pub fn create_recipient_utxos(
    hasher: &impl FieldHasher,
    recipients: &[Recipient],
    registries: &Registries,
) -> Result<Vec<Utxo>> {
    recipients
        .iter()
        .map(|recipient| -> Result<Utxo> {
            let (assets, amounts) = match recipient.mint {
                Some(mint) => (
                    vec![Pubkey::SYSTEM_PROGRAM, mint],
                    vec![recipient.sol_amount as i128, recipient.spl_amount as i128],
                ),
                None if recipient.spl_amount == 0 => {
                    (vec![Pubkey::SYSTEM_PROGRAM], vec![recipient.sol_amount as i128])
                }
                None => {
                    return Err(CreateUtxoError::new(
                        CreateUtxoErrorCode::InvalidRecipientMint,
                        "createRecipientUtxos",
                        "spl amount without a mint",
                    )
                    .into());
                }
            };
            let config = UtxoConfig::new(recipient.account.clone())
                .with_assets(assets)
                .with_amounts(amounts);
            Ok(Utxo::new(hasher, config, registries)?)
        })
        .collect()
}
