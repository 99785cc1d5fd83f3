//! Transaction parameters
//!
//! Validates a set of input and output notes against the action being
//! performed and derives everything public about the transaction: the asset
//! table, the public SOL and SPL amounts and the integrity hash binding the
//! fields the circuit does not constrain.
//!
//! ```text
//! public amount = Σ outputs − Σ inputs   (mod p, per asset slot)
//!
//!   shield     > 0, fits u64, paid by the sender accounts
//!   unshield   < 0, its negation fits u64, paid to the recipient accounts
//!   transfer   spl = 0, sol = −relayer fee
//! ```

use ark_ff::{PrimeField, Zero};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shroud_privacy::hasher::{fr_to_u64, hash_and_truncate_to_circuit};
use shroud_privacy::{Account, FieldHasher, Fr, Registries, Utxo};
use shroud_pubkey::Pubkey;

use crate::error::{Result, TransactionParametersError, TransactionParametersErrorCode};
use crate::outputs::{AppUtxoConfig, CreateOutUtxosRequest, create_out_utxos};
use crate::relayer::Relayer;
use crate::selection::{SelectInUtxosRequest, select_in_utxos};
use crate::verifier::VerifierKind;

/// Number of distinct assets one transaction can move (native plus two).
pub const N_ASSET_PUBKEYS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Shield,
    Transfer,
    Unshield,
}

/// Public accounts touched by the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionAccounts {
    pub sender_sol: Option<Pubkey>,
    pub sender_spl: Option<Pubkey>,
    pub recipient_sol: Option<Pubkey>,
    pub recipient_spl: Option<Pubkey>,
    /// Relayer for relayed actions, the wallet for shields
    pub signer: Pubkey,
    pub transaction_merkle_tree: Pubkey,
    pub verifier_program: Pubkey,
}

/// Inputs to [`TransactionParameters::new`].
#[derive(Debug, Clone)]
pub struct TransactionParametersConfig {
    pub action: Action,
    pub verifier: VerifierKind,
    pub input_utxos: Vec<Utxo>,
    pub output_utxos: Vec<Utxo>,
    pub transaction_merkle_tree: Pubkey,
    pub sender_sol: Option<Pubkey>,
    pub sender_spl: Option<Pubkey>,
    pub recipient_sol: Option<Pubkey>,
    pub recipient_spl: Option<Pubkey>,
    pub relayer: Option<Relayer>,
    pub message: Option<Vec<u8>>,
    pub message_merkle_tree: Option<Pubkey>,
    /// Pre-built slot bytes; encrypted from the outputs when unset
    pub encrypted_utxos: Option<Vec<u8>>,
}

impl TransactionParametersConfig {
    pub fn new(action: Action, verifier: VerifierKind, transaction_merkle_tree: Pubkey) -> Self {
        Self {
            action,
            verifier,
            input_utxos: Vec::new(),
            output_utxos: Vec::new(),
            transaction_merkle_tree,
            sender_sol: None,
            sender_spl: None,
            recipient_sol: None,
            recipient_spl: None,
            relayer: None,
            message: None,
            message_merkle_tree: None,
            encrypted_utxos: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransactionParameters {
    pub action: Action,
    pub verifier: VerifierKind,
    /// Padded to the verifier's input width
    pub input_utxos: Vec<Utxo>,
    /// Padded to the verifier's output width
    pub output_utxos: Vec<Utxo>,
    pub accounts: TransactionAccounts,
    pub relayer: Relayer,
    pub asset_pubkeys: [Pubkey; N_ASSET_PUBKEYS],
    pub asset_pubkeys_circuit: [Fr; N_ASSET_PUBKEYS],
    pub public_amount_sol: Fr,
    pub public_amount_spl: Fr,
    pub message: Option<Vec<u8>>,
    pub message_merkle_tree: Option<Pubkey>,
    pub encrypted_utxos: Option<Vec<u8>>,
}

fn param_error(
    code: TransactionParametersErrorCode,
    message: impl Into<String>,
) -> TransactionParametersError {
    TransactionParametersError::new(code, "TransactionParameters::new", message)
}

impl TransactionParameters {
    pub fn new(
        hasher: &impl FieldHasher,
        config: TransactionParametersConfig,
        registries: &Registries,
    ) -> Result<Self> {
        use TransactionParametersErrorCode as Code;

        let TransactionParametersConfig {
            action,
            verifier,
            mut input_utxos,
            mut output_utxos,
            transaction_merkle_tree,
            sender_sol,
            sender_spl,
            recipient_sol,
            recipient_spl,
            relayer,
            message,
            message_merkle_tree,
            encrypted_utxos,
        } = config;

        if input_utxos.is_empty() && output_utxos.is_empty() {
            return Err(
                param_error(Code::NoUtxosProvided, "neither inputs nor outputs given").into(),
            );
        }
        match (&message, &message_merkle_tree) {
            (Some(_), None) => {
                return Err(param_error(
                    Code::MessageMerkleTreeUndefined,
                    "message given without a message merkle tree",
                )
                .into());
            }
            (None, Some(_)) => {
                return Err(param_error(
                    Code::MessageUndefined,
                    "message merkle tree given without a message",
                )
                .into());
            }
            _ => {}
        }

        let width = verifier.config();
        if input_utxos.len() > width.inputs {
            return Err(param_error(
                Code::InvalidNumberOfInputs,
                format!("{} inputs, verifier takes {}", input_utxos.len(), width.inputs),
            )
            .into());
        }
        if output_utxos.len() > width.outputs {
            return Err(param_error(
                Code::InvalidNumberOfOutputs,
                format!("{} outputs, verifier takes {}", output_utxos.len(), width.outputs),
            )
            .into());
        }
        pad_with_empty(hasher, &mut input_utxos, width.inputs, registries)?;
        pad_with_empty(hasher, &mut output_utxos, width.outputs, registries)?;

        let relayer = match action {
            Action::Shield => {
                let sender = sender_sol.ok_or_else(|| {
                    param_error(Code::SolSenderUndefined, "shield needs a SOL sender")
                })?;
                if relayer.is_some() {
                    return Err(param_error(Code::RelayerDefined, "shields are not relayed").into());
                }
                Relayer::for_sender(sender)
            }
            Action::Transfer | Action::Unshield => {
                let relayer = relayer
                    .ok_or_else(|| param_error(Code::RelayerUndefined, "relayer required"))?;
                if relayer.fee == 0 {
                    return Err(param_error(
                        Code::RelayerFeeUndefined,
                        "relayed transactions need a relayer fee",
                    )
                    .into());
                }
                relayer
            }
        };

        let (asset_pubkeys, asset_pubkeys_circuit) =
            collect_asset_pubkeys(&input_utxos, &output_utxos)?;
        let public_amount_sol =
            external_amount(0, &input_utxos, &output_utxos, &asset_pubkeys_circuit);
        let public_amount_spl =
            external_amount(1, &input_utxos, &output_utxos, &asset_pubkeys_circuit);

        let accounts = TransactionAccounts {
            sender_sol,
            sender_spl,
            recipient_sol,
            recipient_spl,
            signer: relayer.account,
            transaction_merkle_tree,
            verifier_program: verifier.program_id(&registries.verifiers),
        };

        match action {
            Action::Shield => check_shield(&accounts, public_amount_sol, public_amount_spl)?,
            Action::Unshield => {
                check_unshield(&accounts, public_amount_sol, public_amount_spl, relayer.fee)?
            }
            Action::Transfer => {
                check_transfer(&accounts, public_amount_sol, public_amount_spl, relayer.fee)?
            }
        }

        log::debug!(
            "{action:?} parameters: {} inputs, {} outputs, assets {:?}",
            input_utxos.len(),
            output_utxos.len(),
            asset_pubkeys
        );

        Ok(Self {
            action,
            verifier,
            input_utxos,
            output_utxos,
            accounts,
            relayer,
            asset_pubkeys,
            asset_pubkeys_circuit,
            public_amount_sol,
            public_amount_spl,
            message,
            message_merkle_tree,
            encrypted_utxos,
        })
    }

    /// Encrypt every output into its slot, keeping already encrypted bytes.
    pub fn encrypt_utxos(&mut self, hasher: &impl FieldHasher, slot_size: usize) -> Result<&[u8]> {
        if self.encrypted_utxos.is_none() {
            let mut bytes = Vec::with_capacity(self.output_utxos.len() * slot_size);
            for (i, utxo) in self.output_utxos.iter().enumerate() {
                let ciphertext = utxo.encrypt(hasher, &self.accounts.transaction_merkle_tree)?;
                write_slot(&mut bytes, &ciphertext, slot_size).map_err(|len| {
                    TransactionParametersError::new(
                        TransactionParametersErrorCode::EncryptedUtxoTooLarge,
                        "TransactionParameters::encrypt_utxos",
                        format!(
                            "output {i}: {len} byte ciphertext, slot holds {}",
                            slot_size.saturating_sub(1)
                        ),
                    )
                })?;
            }
            self.encrypted_utxos = Some(bytes);
        }
        Ok(self.encrypted_utxos.as_deref().unwrap_or_default())
    }

    /// `sha256(message hash ‖ recipient spl ‖ recipient sol ‖ relayer ‖ fee ‖ ciphertexts)`
    /// reduced into the field. Missing accounts hash as 32 zero bytes.
    pub fn get_tx_integrity_hash(&self, slot_size: usize) -> Result<Fr> {
        let encrypted = self.encrypted_utxos.as_deref().ok_or_else(|| {
            TransactionParametersError::new(
                TransactionParametersErrorCode::EncryptedUtxosUndefined,
                "TransactionParameters::get_tx_integrity_hash",
                "encrypt the outputs first",
            )
        })?;

        let message_hash: [u8; 32] = match &self.message {
            Some(message) => Sha256::digest(message).into(),
            None => [0u8; 32],
        };
        let mut padded = vec![0u8; self.output_utxos.len() * slot_size];
        let n = padded.len().min(encrypted.len());
        padded[..n].copy_from_slice(&encrypted[..n]);

        let mut hasher = Sha256::new();
        hasher.update(message_hash);
        hasher.update(self.accounts.recipient_spl.unwrap_or_default().as_bytes());
        hasher.update(self.accounts.recipient_sol.unwrap_or_default().as_bytes());
        hasher.update(self.relayer.account.as_bytes());
        hasher.update(self.relayer.fee.to_le_bytes());
        hasher.update(&padded);
        Ok(Fr::from_be_bytes_mod_order(&hasher.finalize()))
    }

    /// Real (non-padding) inputs.
    pub fn spent_utxos(&self) -> impl Iterator<Item = &Utxo> {
        self.input_utxos.iter().filter(|u| !u.is_empty())
    }
}

fn pad_with_empty(
    hasher: &impl FieldHasher,
    utxos: &mut Vec<Utxo>,
    width: usize,
    registries: &Registries,
) -> Result<()> {
    let mut rng = rand::thread_rng();
    while utxos.len() < width {
        utxos.push(Utxo::empty(hasher, Account::random(hasher, &mut rng), registries)?);
    }
    Ok(())
}

/// Native asset first, then every new SPL asset of inputs and outputs.
fn collect_asset_pubkeys(
    inputs: &[Utxo],
    outputs: &[Utxo],
) -> Result<([Pubkey; N_ASSET_PUBKEYS], [Fr; N_ASSET_PUBKEYS]), TransactionParametersError> {
    let mut pubkeys = vec![Pubkey::SYSTEM_PROGRAM];
    let mut circuit = vec![hash_and_truncate_to_circuit(Pubkey::SYSTEM_PROGRAM.as_bytes())];
    for utxo in inputs.iter().chain(outputs) {
        let asset = utxo.assets_circuit()[1];
        if !asset.is_zero() && !circuit.contains(&asset) {
            circuit.push(asset);
            pubkeys.push(utxo.assets()[1]);
        }
    }
    if circuit.len() > N_ASSET_PUBKEYS {
        return Err(TransactionParametersError::new(
            TransactionParametersErrorCode::ExceededMaxAssets,
            "TransactionParameters::new",
            format!("{} assets, at most {N_ASSET_PUBKEYS}", circuit.len()),
        ));
    }

    let mut asset_pubkeys = [Pubkey::SYSTEM_PROGRAM; N_ASSET_PUBKEYS];
    let mut asset_pubkeys_circuit = [Fr::zero(); N_ASSET_PUBKEYS];
    asset_pubkeys[..pubkeys.len()].copy_from_slice(&pubkeys);
    asset_pubkeys_circuit[..circuit.len()].copy_from_slice(&circuit);
    Ok((asset_pubkeys, asset_pubkeys_circuit))
}

/// `Σ outputs − Σ inputs` over notes whose slot holds the table's asset.
fn external_amount(
    slot: usize,
    inputs: &[Utxo],
    outputs: &[Utxo],
    asset_pubkeys_circuit: &[Fr],
) -> Fr {
    let sum = |utxos: &[Utxo]| {
        utxos
            .iter()
            .filter(|u| u.assets_circuit()[slot] == asset_pubkeys_circuit[slot])
            .fold(Fr::zero(), |acc, u| acc + Fr::from(u.amounts()[slot]))
    };
    sum(outputs) - sum(inputs)
}

/// One public asset row: amount, recipient, sender and its name in messages.
type PublicRow = (Fr, Option<Pubkey>, Option<Pubkey>, &'static str);

fn public_rows(accounts: &TransactionAccounts, sol: Fr, spl: Fr) -> [PublicRow; 2] {
    [
        (sol, accounts.recipient_sol, accounts.sender_sol, "sol"),
        (spl, accounts.recipient_spl, accounts.sender_spl, "spl"),
    ]
}

fn check_shield(
    accounts: &TransactionAccounts,
    sol: Fr,
    spl: Fr,
) -> Result<(), TransactionParametersError> {
    use TransactionParametersErrorCode as Code;

    let rows = public_rows(accounts, sol, spl);
    for (i, (amount, recipient, sender, asset)) in rows.into_iter().enumerate() {
        let is_sol = i == 0;
        if fr_to_u64(&amount).is_none() {
            return Err(param_error(
                Code::PublicAmountNotU64,
                format!("public {asset} amount of a shield must be a u64"),
            ));
        }
        if amount.is_zero() {
            continue;
        }
        if recipient.is_some() {
            let code = if is_sol {
                Code::SolRecipientDefined
            } else {
                Code::SplRecipientDefined
            };
            return Err(param_error(code, format!("shield has a public {asset} recipient")));
        }
        if sender.is_none() {
            let code = if is_sol {
                Code::SolSenderUndefined
            } else {
                Code::SplSenderUndefined
            };
            return Err(param_error(code, format!("shield of {asset} has no sender")));
        }
    }
    Ok(())
}

/// The relayer fee leaves the pool with the unshielded SOL, so a SOL
/// recipient is only needed for SOL beyond the fee.
fn check_unshield(
    accounts: &TransactionAccounts,
    sol: Fr,
    spl: Fr,
    relayer_fee: u64,
) -> Result<(), TransactionParametersError> {
    use TransactionParametersErrorCode as Code;

    let rows = public_rows(accounts, sol, spl);
    for (i, (amount, recipient, sender, asset)) in rows.into_iter().enumerate() {
        let is_sol = i == 0;
        if amount.is_zero() {
            continue;
        }
        if fr_to_u64(&amount).is_some() {
            return Err(param_error(
                Code::InvalidPublicAmount,
                format!("unshield increases the shielded {asset} amount"),
            ));
        }
        if fr_to_u64(&-amount).is_none() {
            return Err(param_error(
                Code::PublicAmountNotU64,
                format!("unshielded {asset} amount exceeds u64"),
            ));
        }
        let fee_only = is_sol && -amount == Fr::from(relayer_fee);
        if recipient.is_none() && !fee_only {
            let code = if is_sol {
                Code::SolRecipientUndefined
            } else {
                Code::SplRecipientUndefined
            };
            return Err(param_error(code, format!("unshield of {asset} has no recipient")));
        }
        if sender.is_some() {
            let code = if is_sol {
                Code::SolSenderDefined
            } else {
                Code::SplSenderDefined
            };
            return Err(param_error(code, format!("unshield has a public {asset} sender")));
        }
    }
    Ok(())
}

fn check_transfer(
    accounts: &TransactionAccounts,
    sol: Fr,
    spl: Fr,
    relayer_fee: u64,
) -> Result<(), TransactionParametersError> {
    use TransactionParametersErrorCode as Code;

    if !spl.is_zero() {
        return Err(param_error(Code::PublicAmountSplNotZero, "transfers move no public spl"));
    }
    if !(sol + Fr::from(relayer_fee)).is_zero() {
        return Err(param_error(
            Code::PublicAmountSolNotZero,
            "public sol of a transfer must equal the negated relayer fee",
        ));
    }
    if accounts.recipient_spl.is_some() {
        return Err(param_error(Code::SplRecipientDefined, "transfer has a public spl recipient"));
    }
    if accounts.recipient_sol.is_some() {
        return Err(param_error(Code::SolRecipientDefined, "transfer has a public sol recipient"));
    }
    if accounts.sender_sol.is_some() {
        return Err(param_error(Code::SolSenderDefined, "transfer has a public sol sender"));
    }
    if accounts.sender_spl.is_some() {
        return Err(param_error(Code::SplSenderDefined, "transfer has a public spl sender"));
    }
    Ok(())
}

// ============================================================================
// Encrypted utxo slots
// ============================================================================

/// Append `[len | ciphertext | zero padding]`, returning the length on overflow.
fn write_slot(out: &mut Vec<u8>, ciphertext: &[u8], slot_size: usize) -> Result<(), usize> {
    if ciphertext.len() + 1 > slot_size || ciphertext.len() > u8::MAX as usize {
        return Err(ciphertext.len());
    }
    let start = out.len();
    out.push(ciphertext.len() as u8);
    out.extend_from_slice(ciphertext);
    out.resize(start + slot_size, 0);
    Ok(())
}

/// Ciphertext stored in slot `index`, `None` for a short or malformed slot.
pub fn encrypted_utxo_at(bytes: &[u8], index: usize, slot_size: usize) -> Option<&[u8]> {
    let slot = bytes.get(index * slot_size..(index + 1) * slot_size)?;
    let (len, rest) = slot.split_first()?;
    rest.get(..*len as usize).filter(|ct| !ct.is_empty())
}

// ============================================================================
// High-level builder
// ============================================================================

/// Inputs to [`get_tx_params`].
#[derive(Debug, Clone)]
pub struct TxParamsRequest {
    pub action: Action,
    pub verifier: VerifierKind,
    /// Owner of the change note
    pub account: Account,
    /// Spendable notes to select from
    pub utxos: Vec<Utxo>,
    /// Used as is when `add_in_utxos` is false
    pub in_utxos: Vec<Utxo>,
    /// Recipient notes
    pub out_utxos: Vec<Utxo>,
    pub public_mint: Option<Pubkey>,
    pub public_amount_sol: Option<u64>,
    pub public_amount_spl: Option<u64>,
    pub relayer: Option<Relayer>,
    /// Wallet paying a shield
    pub wallet: Option<Pubkey>,
    /// Token account paying an SPL shield
    pub user_spl_account: Option<Pubkey>,
    pub recipient_sol: Option<Pubkey>,
    pub recipient_spl: Option<Pubkey>,
    pub transaction_merkle_tree: Pubkey,
    pub add_in_utxos: bool,
    pub add_out_utxos: bool,
    pub separate_sol_utxo: bool,
    pub app_utxo: Option<AppUtxoConfig>,
    pub message: Option<Vec<u8>>,
    pub message_merkle_tree: Option<Pubkey>,
}

impl TxParamsRequest {
    pub fn new(action: Action, account: Account, transaction_merkle_tree: Pubkey) -> Self {
        Self {
            action,
            verifier: VerifierKind::Zero,
            account,
            utxos: Vec::new(),
            in_utxos: Vec::new(),
            out_utxos: Vec::new(),
            public_mint: None,
            public_amount_sol: None,
            public_amount_spl: None,
            relayer: None,
            wallet: None,
            user_spl_account: None,
            recipient_sol: None,
            recipient_spl: None,
            transaction_merkle_tree,
            add_in_utxos: true,
            add_out_utxos: true,
            separate_sol_utxo: false,
            app_utxo: None,
            message: None,
            message_merkle_tree: None,
        }
    }
}

/// Select inputs, build change and recipients, then validate the result.
pub fn get_tx_params(
    hasher: &impl FieldHasher,
    request: TxParamsRequest,
    registries: &Registries,
) -> Result<TransactionParameters> {
    const FN: &str = "get_tx_params";
    let action = request.action;

    if action == Action::Transfer && request.out_utxos.is_empty() {
        return Err(TransactionParametersError::new(
            TransactionParametersErrorCode::ShieldedRecipientUndefined,
            FN,
            "transfer without a shielded recipient",
        )
        .into());
    }
    let relayer_fee = match action {
        Action::Shield => None,
        Action::Transfer | Action::Unshield => {
            let relayer = request.relayer.as_ref().ok_or_else(|| {
                TransactionParametersError::new(
                    TransactionParametersErrorCode::RelayerUndefined,
                    FN,
                    "relayed action without a relayer",
                )
            })?;
            if relayer.fee == 0 {
                return Err(TransactionParametersError::new(
                    TransactionParametersErrorCode::RelayerFeeUndefined,
                    FN,
                    "relayer fee is zero",
                )
                .into());
            }
            Some(relayer.fee)
        }
    };
    let width = request.verifier.config();

    let in_utxos = if request.add_in_utxos {
        select_in_utxos(&SelectInUtxosRequest {
            utxos: &request.utxos,
            action,
            public_mint: request.public_mint,
            public_amount_sol: request.public_amount_sol,
            public_amount_spl: request.public_amount_spl,
            relayer_fee,
            out_utxos: &request.out_utxos,
            number_max_in_utxos: width.inputs,
            number_max_out_utxos: width.outputs,
        })?
    } else {
        request.in_utxos
    };

    let out_utxos = if request.add_out_utxos {
        create_out_utxos(
            hasher,
            &CreateOutUtxosRequest {
                action,
                change_account: &request.account,
                in_utxos: &in_utxos,
                out_utxos: &request.out_utxos,
                public_mint: request.public_mint,
                public_amount_sol: request.public_amount_sol,
                public_amount_spl: request.public_amount_spl,
                relayer_fee,
                number_max_out_utxos: width.outputs,
                separate_sol_utxo: request.separate_sol_utxo,
                app_utxo: request.app_utxo.as_ref(),
            },
            registries,
        )?
    } else {
        request.out_utxos
    };

    let mut config =
        TransactionParametersConfig::new(action, request.verifier, request.transaction_merkle_tree);
    config.input_utxos = in_utxos;
    config.output_utxos = out_utxos;
    config.message = request.message;
    config.message_merkle_tree = request.message_merkle_tree;
    match action {
        Action::Shield => {
            config.sender_sol = request.wallet;
            config.sender_spl = request.user_spl_account;
        }
        Action::Unshield => {
            config.recipient_sol = request.recipient_sol;
            config.recipient_spl = request.recipient_spl;
            config.relayer = request.relayer;
        }
        Action::Transfer => config.relayer = request.relayer,
    }
    TransactionParameters::new(hasher, config, registries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use shroud_config::ShroudConfig;
    use shroud_privacy::{Poseidon, UtxoConfig};

    fn registries() -> Registries {
        Registries::from_config(&ShroudConfig::default()).unwrap()
    }

    fn account(seed: u8) -> Account {
        Account::from_seed(&Poseidon::new(), &[seed; 32]).unwrap()
    }

    fn sol_utxo(amount: i128) -> Utxo {
        Utxo::new(
            &Poseidon::new(),
            UtxoConfig::new(account(1))
                .with_assets(vec![Pubkey::SYSTEM_PROGRAM])
                .with_amounts(vec![amount]),
            &registries(),
        )
        .unwrap()
    }

    fn relayer(fee: u64) -> Relayer {
        Relayer::new(Pubkey::new_unique(), Pubkey::new_unique(), fee, 0)
    }

    fn code_of(err: Error) -> TransactionParametersErrorCode {
        match err {
            Error::Parameters(e) => e.code,
            other => panic!("unexpected error {other}"),
        }
    }

    fn shield_config() -> TransactionParametersConfig {
        let mut config = TransactionParametersConfig::new(
            Action::Shield,
            VerifierKind::Zero,
            Pubkey::new_unique(),
        );
        config.output_utxos = vec![sol_utxo(1_000)];
        config.sender_sol = Some(Pubkey::new_unique());
        config
    }

    #[test]
    fn test_shield_pads_and_computes_public_amount() {
        let h = Poseidon::new();
        let params = TransactionParameters::new(&h, shield_config(), &registries()).unwrap();
        assert_eq!(params.input_utxos.len(), 2);
        assert_eq!(params.output_utxos.len(), 2);
        assert_eq!(params.public_amount_sol, Fr::from(1_000u64));
        assert!(params.public_amount_spl.is_zero());
        assert_eq!(params.asset_pubkeys[0], Pubkey::SYSTEM_PROGRAM);
        assert!(params.asset_pubkeys_circuit[1].is_zero());
        assert_eq!(params.accounts.signer, params.accounts.sender_sol.unwrap());
        assert_eq!(params.relayer.fee, 0);
    }

    #[test]
    fn test_shield_rejections() {
        let h = Poseidon::new();
        let r = registries();

        let mut config = shield_config();
        config.sender_sol = None;
        assert_eq!(
            code_of(TransactionParameters::new(&h, config, &r).unwrap_err()),
            TransactionParametersErrorCode::SolSenderUndefined
        );

        let mut config = shield_config();
        config.relayer = Some(relayer(1));
        assert_eq!(
            code_of(TransactionParameters::new(&h, config, &r).unwrap_err()),
            TransactionParametersErrorCode::RelayerDefined
        );

        let mut config = shield_config();
        config.recipient_sol = Some(Pubkey::new_unique());
        assert_eq!(
            code_of(TransactionParameters::new(&h, config, &r).unwrap_err()),
            TransactionParametersErrorCode::SolRecipientDefined
        );

        let mut config = shield_config();
        config.input_utxos = vec![sol_utxo(5_000)];
        assert_eq!(
            code_of(TransactionParameters::new(&h, config, &r).unwrap_err()),
            TransactionParametersErrorCode::PublicAmountNotU64
        );
    }

    #[test]
    fn test_unshield_checks() {
        let h = Poseidon::new();
        let r = registries();
        let mut config = TransactionParametersConfig::new(
            Action::Unshield,
            VerifierKind::Zero,
            Pubkey::new_unique(),
        );
        config.input_utxos = vec![sol_utxo(10_000)];
        config.relayer = Some(relayer(1_000));

        let err = TransactionParameters::new(&h, config.clone(), &r).unwrap_err();
        assert_eq!(code_of(err), TransactionParametersErrorCode::SolRecipientUndefined);

        config.recipient_sol = Some(Pubkey::new_unique());
        let params = TransactionParameters::new(&h, config.clone(), &r).unwrap();
        assert_eq!(params.public_amount_sol, -Fr::from(10_000u64));

        config.sender_sol = Some(Pubkey::new_unique());
        let err = TransactionParameters::new(&h, config.clone(), &r).unwrap_err();
        assert_eq!(code_of(err), TransactionParametersErrorCode::SolSenderDefined);

        config.sender_sol = None;
        config.relayer = None;
        let err = TransactionParameters::new(&h, config.clone(), &r).unwrap_err();
        assert_eq!(code_of(err), TransactionParametersErrorCode::RelayerUndefined);

        config.relayer = Some(relayer(0));
        let err = TransactionParameters::new(&h, config, &r).unwrap_err();
        assert_eq!(code_of(err), TransactionParametersErrorCode::RelayerFeeUndefined);
    }

    #[test]
    fn test_spl_unshield_needs_no_sol_recipient() {
        let h = Poseidon::new();
        let r = registries();
        let usdc = r.assets.token_by_symbol("USDC").unwrap().clone();
        let token_utxo = |sol: i128, spl: i128| {
            Utxo::new(
                &h,
                UtxoConfig::new(account(1))
                    .with_assets(vec![Pubkey::SYSTEM_PROGRAM, usdc.mint])
                    .with_amounts(vec![sol, spl]),
                &r,
            )
            .unwrap()
        };
        let spl_out = 3 * usdc.decimals as i128;

        let mut config = TransactionParametersConfig::new(
            Action::Unshield,
            VerifierKind::Zero,
            Pubkey::new_unique(),
        );
        config.input_utxos = vec![token_utxo(10_000, 20_000)];
        config.output_utxos = vec![token_utxo(9_000, 20_000 - spl_out)];
        config.recipient_spl = Some(Pubkey::new_unique());
        config.relayer = Some(relayer(1_000));

        // only the relayer fee leaves as sol
        let params = TransactionParameters::new(&h, config.clone(), &r).unwrap();
        assert_eq!(params.public_amount_sol, -Fr::from(1_000u64));
        assert_eq!(params.public_amount_spl, -Fr::from(spl_out as u64));
        assert!(params.accounts.recipient_sol.is_none());

        // sol beyond the fee still needs a recipient
        config.relayer = Some(relayer(999));
        let err = TransactionParameters::new(&h, config, &r).unwrap_err();
        assert_eq!(code_of(err), TransactionParametersErrorCode::SolRecipientUndefined);
    }

    #[test]
    fn test_unshield_cannot_grow_the_pool() {
        let h = Poseidon::new();
        let mut config = TransactionParametersConfig::new(
            Action::Unshield,
            VerifierKind::Zero,
            Pubkey::new_unique(),
        );
        config.output_utxos = vec![sol_utxo(10_000)];
        config.recipient_sol = Some(Pubkey::new_unique());
        config.relayer = Some(relayer(1_000));
        let err = TransactionParameters::new(&h, config, &registries()).unwrap_err();
        assert_eq!(code_of(err), TransactionParametersErrorCode::InvalidPublicAmount);
    }

    #[test]
    fn test_transfer_checks() {
        let h = Poseidon::new();
        let r = registries();
        let mut config = TransactionParametersConfig::new(
            Action::Transfer,
            VerifierKind::Zero,
            Pubkey::new_unique(),
        );
        config.input_utxos = vec![sol_utxo(10_000)];
        config.output_utxos = vec![sol_utxo(9_000)];
        config.relayer = Some(relayer(1_000));
        let params = TransactionParameters::new(&h, config.clone(), &r).unwrap();
        assert_eq!(params.public_amount_sol, -Fr::from(1_000u64));

        config.relayer = Some(relayer(999));
        let err = TransactionParameters::new(&h, config.clone(), &r).unwrap_err();
        assert_eq!(code_of(err), TransactionParametersErrorCode::PublicAmountSolNotZero);

        config.relayer = Some(relayer(1_000));
        config.recipient_sol = Some(Pubkey::new_unique());
        let err = TransactionParameters::new(&h, config, &r).unwrap_err();
        assert_eq!(code_of(err), TransactionParametersErrorCode::SolRecipientDefined);
    }

    #[test]
    fn test_widths_and_message() {
        let h = Poseidon::new();
        let r = registries();

        let mut config = shield_config();
        config.output_utxos = vec![sol_utxo(1), sol_utxo(2), sol_utxo(3)];
        assert_eq!(
            code_of(TransactionParameters::new(&h, config, &r).unwrap_err()),
            TransactionParametersErrorCode::InvalidNumberOfOutputs
        );

        let mut config = shield_config();
        config.message = Some(b"hi".to_vec());
        assert_eq!(
            code_of(TransactionParameters::new(&h, config, &r).unwrap_err()),
            TransactionParametersErrorCode::MessageMerkleTreeUndefined
        );

        let mut config = shield_config();
        config.output_utxos.clear();
        assert_eq!(
            code_of(TransactionParameters::new(&h, config, &r).unwrap_err()),
            TransactionParametersErrorCode::NoUtxosProvided
        );
    }

    #[test]
    fn test_slot_layout() {
        let mut bytes = Vec::new();
        write_slot(&mut bytes, &[1, 2, 3], 8).unwrap();
        write_slot(&mut bytes, &[4], 8).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(encrypted_utxo_at(&bytes, 0, 8), Some(&[1u8, 2, 3][..]));
        assert_eq!(encrypted_utxo_at(&bytes, 1, 8), Some(&[4u8][..]));
        assert_eq!(encrypted_utxo_at(&bytes, 2, 8), None);
        assert_eq!(write_slot(&mut bytes, &[0u8; 8], 8), Err(8));
    }

    #[test]
    fn test_integrity_hash_requires_encryption() {
        let h = Poseidon::new();
        let mut params = TransactionParameters::new(&h, shield_config(), &registries()).unwrap();
        assert!(params.get_tx_integrity_hash(128).is_err());

        params.encrypt_utxos(&h, 128).unwrap();
        let first = params.get_tx_integrity_hash(128).unwrap();
        // cached ciphertexts keep the hash stable
        params.encrypt_utxos(&h, 128).unwrap();
        assert_eq!(first, params.get_tx_integrity_hash(128).unwrap());

        params.message = Some(b"memo".to_vec());
        assert_ne!(first, params.get_tx_integrity_hash(128).unwrap());
    }
}
