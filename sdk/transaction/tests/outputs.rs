use shroud_config::{ShroudConfig, TokenConfig};
use shroud_privacy::{Account, Poseidon, Registries, Utxo, UtxoConfig};
use shroud_pubkey::Pubkey;
use shroud_transaction::{
    Action, CreateOutUtxosRequest, PublicAmounts, Recipient, create_out_utxos,
    create_recipient_utxos, validate_utxo_amounts,
};

fn registries() -> Registries {
    Registries::from_config(&ShroudConfig::default()).unwrap()
}

fn account(seed: u8) -> Account {
    Account::from_seed(&Poseidon::new(), &[seed; 32]).unwrap()
}

fn token_note(registries: &Registries, sol: i128, spl: i128) -> Utxo {
    let mint = registries.assets.token_by_symbol("USDC").unwrap().mint;
    Utxo::new(
        &Poseidon::new(),
        UtxoConfig::new(account(1))
            .with_assets(vec![Pubkey::SYSTEM_PROGRAM, mint])
            .with_amounts(vec![sol, spl]),
        registries,
    )
    .unwrap()
}

fn request<'a>(
    action: Action,
    change: &'a Account,
    ins: &'a [Utxo],
    outs: &'a [Utxo],
) -> CreateOutUtxosRequest<'a> {
    CreateOutUtxosRequest {
        action,
        change_account: change,
        in_utxos: ins,
        out_utxos: outs,
        public_mint: None,
        public_amount_sol: None,
        public_amount_spl: None,
        relayer_fee: None,
        number_max_out_utxos: 2,
        separate_sol_utxo: false,
        app_utxo: None,
    }
}

#[test]
fn shield_without_inputs_puts_everything_in_change() {
    let r = registries();
    let sender = account(1);
    let mut req = request(Action::Shield, &sender, &[], &[]);
    req.public_amount_sol = Some(1_000_000);

    let outputs = create_out_utxos(&Poseidon::new(), &req, &r).unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].amounts(), [1_000_000, 0]);
}

#[test]
fn unshield_deducts_fee_from_sol_and_amount_from_token() {
    let r = registries();
    let usdc = r.assets.token_by_symbol("USDC").unwrap();
    let sender = account(1);
    let ins = [token_note(&r, 10_000, 20_000)];

    let mut req = request(Action::Unshield, &sender, &ins, &[]);
    req.public_mint = Some(usdc.mint);
    req.public_amount_spl = Some(3 * usdc.decimals);
    req.relayer_fee = Some(1_000);

    let outputs = create_out_utxos(&Poseidon::new(), &req, &r).unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].amounts(), [10_000 - 1_000, 20_000 - 3 * usdc.decimals]);
    assert_eq!(outputs[0].mint(), Some(usdc.mint));
}

#[test]
fn transfer_places_recipients_before_change() {
    let h = Poseidon::new();
    let r = registries();
    let sender = account(1);
    let ins = [token_note(&r, 10_000, 20_000)];
    let usdc = r.assets.token_by_symbol("USDC").unwrap().mint;
    let outs = create_recipient_utxos(
        &h,
        &[Recipient {
            account: account(2),
            sol_amount: 2_000,
            spl_amount: 5_000,
            mint: Some(usdc),
        }],
        &r,
    )
    .unwrap();

    let mut req = request(Action::Transfer, &sender, &ins, &outs);
    req.relayer_fee = Some(500);
    let outputs = create_out_utxos(&h, &req, &r).unwrap();

    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].account().pubkey(), account(2).pubkey());
    assert_eq!(outputs[1].amounts(), [10_000 - 2_000 - 500, 15_000]);
}

#[test]
fn separate_sol_change_uses_second_slot() {
    let r = registries();
    let sender = account(1);
    let ins = [token_note(&r, 10_000, 20_000)];
    let usdc = r.assets.token_by_symbol("USDC").unwrap().mint;

    let mut req = request(Action::Unshield, &sender, &ins, &[]);
    req.public_mint = Some(usdc);
    req.public_amount_spl = Some(1_000);
    req.relayer_fee = Some(1_000);
    req.separate_sol_utxo = true;

    let outputs = create_out_utxos(&Poseidon::new(), &req, &r).unwrap();
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].amounts(), [0, 19_000]);
    assert_eq!(outputs[1].amounts(), [9_000, 0]);
    assert_eq!(outputs[1].mint(), None);
}

#[test]
fn overspending_recipients_is_rejected() {
    let h = Poseidon::new();
    let r = registries();
    let sender = account(1);
    let ins = [token_note(&r, 1_000, 0)];
    let outs = create_recipient_utxos(
        &h,
        &[Recipient {
            account: account(2),
            sol_amount: 5_000,
            spl_amount: 0,
            mint: None,
        }],
        &r,
    )
    .unwrap();

    let mut req = request(Action::Transfer, &sender, &ins, &outs);
    req.relayer_fee = Some(100);
    let err = create_out_utxos(&h, &req, &r).unwrap_err();
    assert_eq!(err.code(), "RECIPIENTS_SUM_AMOUNT_MISSMATCH");

    let public = PublicAmounts::new(Action::Transfer, None, None, None, Some(100));
    let err = validate_utxo_amounts(&[Pubkey::SYSTEM_PROGRAM], &ins, &outs, &public).unwrap_err();
    assert_eq!(err.function, "validateUtxoAmounts");
}

#[test]
fn missing_amounts_and_mint() {
    let r = registries();
    let sender = account(1);

    let req = request(Action::Shield, &sender, &[], &[]);
    let err = create_out_utxos(&Poseidon::new(), &req, &r).unwrap_err();
    assert_eq!(err.code(), "NO_PUBLIC_AMOUNTS_PROVIDED");

    let mut req = request(Action::Shield, &sender, &[], &[]);
    req.public_amount_spl = Some(10);
    let err = create_out_utxos(&Poseidon::new(), &req, &r).unwrap_err();
    assert_eq!(err.code(), "NO_PUBLIC_MINT_PROVIDED");
}

#[test]
fn change_follows_the_single_input_mint() {
    let mut config = ShroudConfig::default();
    config.assets.tokens.push(TokenConfig {
        symbol: "USDT".into(),
        mint: Pubkey::new_unique().to_string(),
        decimals: 100,
    });
    let r = Registries::from_config(&config).unwrap();
    let usdc = r.assets.token_by_symbol("USDC").unwrap().mint;
    let usdt = r.assets.token_by_symbol("USDT").unwrap().mint;
    let sender = account(1);

    // two notes of one mint still fit a single change note
    let ins = [token_note(&r, 5_000, 200), token_note(&r, 5_000, 300)];
    let mut req = request(Action::Unshield, &sender, &ins, &[]);
    req.public_amount_sol = Some(1_000);
    req.relayer_fee = Some(500);
    let outputs = create_out_utxos(&Poseidon::new(), &req, &r).unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].amounts(), [10_000 - 1_500, 500]);
    assert_eq!(outputs[0].mint(), Some(usdc));

    let other = Utxo::new(
        &Poseidon::new(),
        UtxoConfig::new(account(1))
            .with_assets(vec![Pubkey::SYSTEM_PROGRAM, usdt])
            .with_amounts(vec![0, 400]),
        &r,
    )
    .unwrap();
    let ins = [token_note(&r, 5_000, 200), other];
    let mut req = request(Action::Unshield, &sender, &ins, &[]);
    req.public_amount_sol = Some(1_000);
    req.relayer_fee = Some(500);
    let err = create_out_utxos(&Poseidon::new(), &req, &r).unwrap_err();
    assert_eq!(err.code(), "INVALID_OUTPUT_UTXO_LENGTH");
}
