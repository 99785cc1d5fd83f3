use shroud_config::ShroudConfig;
use shroud_privacy::{Account, AssetRegistry, Poseidon, Registries, TokenData, Utxo, UtxoConfig};
use shroud_pubkey::Pubkey;
use shroud_transaction::error::SelectInUtxosErrorCode;
use shroud_transaction::{Action, SelectInUtxosRequest, select_in_utxos};

const FEE: u64 = 1_000;

fn registries_with(extra: Pubkey) -> Registries {
    let mut registries = Registries::from_config(&ShroudConfig::default()).unwrap();
    let mut tokens = registries.assets.tokens().to_vec();
    tokens.push(TokenData {
        symbol: "BONK".into(),
        mint: extra,
        decimals: 100_000,
    });
    registries.assets = AssetRegistry::new(tokens).unwrap();
    registries
}

fn usdc(registries: &Registries) -> Pubkey {
    registries.assets.token_by_symbol("USDC").unwrap().mint
}

fn note(registries: &Registries, mint: Option<Pubkey>, sol: i128, spl: i128) -> Utxo {
    let h = Poseidon::new();
    let account = Account::from_seed(&h, &[9u8; 32]).unwrap();
    let config = match mint {
        Some(mint) => UtxoConfig::new(account)
            .with_assets(vec![Pubkey::SYSTEM_PROGRAM, mint])
            .with_amounts(vec![sol, spl]),
        None => UtxoConfig::new(account)
            .with_assets(vec![Pubkey::SYSTEM_PROGRAM])
            .with_amounts(vec![sol]),
    };
    Utxo::new(&h, config, registries).unwrap()
}

fn unshield<'a>(
    utxos: &'a [Utxo],
    mint: Option<Pubkey>,
    sol: Option<u64>,
    spl: Option<u64>,
) -> SelectInUtxosRequest<'a> {
    SelectInUtxosRequest {
        utxos,
        action: Action::Unshield,
        public_mint: mint,
        public_amount_sol: sol,
        public_amount_spl: spl,
        relayer_fee: Some(FEE),
        out_utxos: &[],
        number_max_in_utxos: 2,
        number_max_out_utxos: 2,
    }
}

#[test]
fn spl_unshield_prefers_largest_token_note() {
    let registries = registries_with(Pubkey::new_unique());
    let mint = usdc(&registries);
    let utxos = [
        note(&registries, None, 100_000_000, 0),
        note(&registries, Some(mint), 100_000, 500),
        note(&registries, Some(mint), 1_000_000, 1_000),
    ];

    let selected = select_in_utxos(&unshield(&utxos, Some(mint), None, Some(1_000))).unwrap();
    assert_eq!(selected.len(), 2);
    assert_eq!(selected[0].spl_amount(), 1_000);
    // the free slot consolidates the next token note
    assert_eq!(selected[1].spl_amount(), 500);
}

#[test]
fn sol_and_spl_target_needs_both_notes() {
    let registries = registries_with(Pubkey::new_unique());
    let mint = usdc(&registries);
    let utxos = [
        note(&registries, None, 100_000_000, 0),
        note(&registries, Some(mint), 1_000_000, 1_000),
    ];

    let selected =
        select_in_utxos(&unshield(&utxos, Some(mint), Some(50_000_000), Some(1_000))).unwrap();
    assert_eq!(selected.len(), 2);
    assert_eq!(selected[0].mint(), Some(mint));
    assert_eq!(selected[1].mint(), None);
}

#[test]
fn never_exceeds_input_width() {
    let registries = registries_with(Pubkey::new_unique());
    let utxos: Vec<Utxo> = (0..5).map(|_| note(&registries, None, 10_000, 0)).collect();

    let request = unshield(&utxos, None, Some(25_000), None);
    let err = select_in_utxos(&request).unwrap_err();
    assert_eq!(err.code, SelectInUtxosErrorCode::FailedToFindUtxoCombination);

    let request = unshield(&utxos, None, Some(15_000), None);
    assert_eq!(select_in_utxos(&request).unwrap().len(), 2);
}

#[test]
fn other_mints_are_not_candidates() {
    let bonk = Pubkey::new_unique();
    let registries = registries_with(bonk);
    let mint = usdc(&registries);
    let utxos = [
        note(&registries, Some(bonk), 50_000_000, 9_000),
        note(&registries, Some(mint), 1_000_000, 1_000),
    ];

    let selected = select_in_utxos(&unshield(&utxos, Some(mint), None, Some(500))).unwrap();
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].mint(), Some(mint));
}

#[test]
fn transfer_covers_recipients_and_fee() {
    let registries = registries_with(Pubkey::new_unique());
    let utxos = [
        note(&registries, None, 4_000, 0),
        note(&registries, None, 3_000, 0),
        note(&registries, None, 2_000, 0),
    ];
    let recipients = [note(&registries, None, 5_500, 0)];

    let request = SelectInUtxosRequest {
        utxos: &utxos,
        action: Action::Transfer,
        public_mint: None,
        public_amount_sol: None,
        public_amount_spl: None,
        relayer_fee: Some(FEE),
        out_utxos: &recipients,
        number_max_in_utxos: 2,
        number_max_out_utxos: 2,
    };
    let selected = select_in_utxos(&request).unwrap();
    let total: u64 = selected.iter().map(Utxo::sol_amount).sum();
    assert!(total >= 5_500 + FEE);
    assert_eq!(selected.len(), 2);
    assert_eq!(selected[0].sol_amount(), 4_000);
    assert_eq!(selected[1].sol_amount(), 3_000);
}

#[test]
fn recipient_mint_must_match() {
    let bonk = Pubkey::new_unique();
    let registries = registries_with(bonk);
    let mint = usdc(&registries);
    let utxos = [note(&registries, Some(mint), 1_000_000, 1_000)];
    let recipients = [note(&registries, Some(bonk), 0, 10)];

    let mut request = unshield(&utxos, Some(mint), None, Some(100));
    request.out_utxos = &recipients;
    let err = select_in_utxos(&request).unwrap_err();
    assert_eq!(err.code, SelectInUtxosErrorCode::InvalidRecipientMint);

    let recipients = [note(&registries, None, 10, 0), note(&registries, None, 10, 0)];
    let mut request = unshield(&utxos, Some(mint), None, Some(100));
    request.out_utxos = &recipients;
    let err = select_in_utxos(&request).unwrap_err();
    assert_eq!(err.code, SelectInUtxosErrorCode::InvalidNumberOfRecipients);
}
