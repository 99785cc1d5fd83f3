//! Coin selection
//!
//! Picks the input notes for a transaction. The circuit has a fixed input
//! width, so selection searches combinations of increasing size up to that
//! width and gives up rather than exceeding it.
//!
//! ```text
//! candidates ─sort─▶ [c0, c1, c2, ...]
//!   k = 1: {c0} {c1} {c2} ...
//!   k = 2: {c0,c1} {c0,c2} ... {c1,c2} ...      first cover wins
//!   fill free slots with the remaining candidates (consolidation)
//! ```

use shroud_privacy::Utxo;
use shroud_pubkey::Pubkey;

use crate::error::{SelectInUtxosError, SelectInUtxosErrorCode};
use crate::params::Action;

/// Only the largest candidates take part in the combination search.
pub const MAX_SELECTION_CANDIDATES: usize = 20;

const FN: &str = "selectInUtxos";

#[derive(Debug, Clone)]
pub struct SelectInUtxosRequest<'a> {
    /// Spendable notes
    pub utxos: &'a [Utxo],
    pub action: Action,
    pub public_mint: Option<Pubkey>,
    pub public_amount_sol: Option<u64>,
    pub public_amount_spl: Option<u64>,
    pub relayer_fee: Option<u64>,
    /// Recipient notes the inputs have to fund
    pub out_utxos: &'a [Utxo],
    pub number_max_in_utxos: usize,
    pub number_max_out_utxos: usize,
}

fn error(code: SelectInUtxosErrorCode, message: impl Into<String>) -> SelectInUtxosError {
    SelectInUtxosError::new(code, FN, message)
}

#[derive(Debug, Clone, Copy, Default)]
struct Target {
    sol: u128,
    spl: u128,
}

pub fn select_in_utxos(
    request: &SelectInUtxosRequest<'_>,
) -> Result<Vec<Utxo>, SelectInUtxosError> {
    use SelectInUtxosErrorCode as Code;
    let action = request.action;

    let no_public_amounts =
        request.public_amount_sol.is_none() && request.public_amount_spl.is_none();
    if no_public_amounts && (action == Action::Unshield || request.out_utxos.is_empty()) {
        return Err(error(Code::NoPublicAmountsProvided, "no public amounts and no recipients"));
    }
    if request.public_amount_spl.unwrap_or(0) > 0 && request.public_mint.is_none() {
        return Err(error(Code::NoPublicMintProvided, "spl amount given without a mint"));
    }
    if action == Action::Unshield
        && request.public_mint.is_some()
        && request.public_amount_spl.is_none()
    {
        return Err(error(Code::PublicSplAmountUndefined, "mint given without an spl amount"));
    }
    match (action, request.relayer_fee) {
        (Action::Unshield | Action::Transfer, None) => {
            return Err(error(Code::RelayerFeeUndefined, format!("{action:?} needs a relayer fee")));
        }
        (Action::Shield, Some(_)) => {
            return Err(error(Code::RelayerFeeDefined, "shields pay no relayer fee"));
        }
        _ => {}
    }
    if request.utxos.is_empty() {
        if action == Action::Shield {
            return Ok(Vec::new());
        }
        return Err(error(Code::NoUtxosProvided, "no spendable notes"));
    }
    if request.out_utxos.len() >= request.number_max_out_utxos {
        return Err(error(
            Code::InvalidNumberOfRecipients,
            format!(
                "{} recipients, at most {} besides the change note",
                request.out_utxos.len(),
                request.number_max_out_utxos.saturating_sub(1)
            ),
        ));
    }

    let mint = request
        .public_mint
        .or_else(|| request.out_utxos.first().and_then(Utxo::mint));
    if let Some(bad) = request
        .out_utxos
        .iter()
        .filter_map(Utxo::mint)
        .find(|m| Some(*m) != mint)
    {
        return Err(error(
            Code::InvalidRecipientMint,
            format!("recipient mint {bad} is not in use"),
        ));
    }

    let target = target(request);
    let mut candidates: Vec<&Utxo> = request
        .utxos
        .iter()
        .filter(|u| !u.is_empty())
        .filter(|u| match mint {
            Some(m) if action == Action::Shield && request.public_mint.is_some() => {
                u.mint() == Some(m)
            }
            Some(m) => u.mint().is_none() || u.mint() == Some(m),
            None => true,
        })
        .collect();
    if target.spl > 0 {
        candidates.sort_by(|a, b| b.spl_amount().cmp(&a.spl_amount()));
    } else {
        candidates.sort_by(|a, b| b.sol_amount().cmp(&a.sol_amount()));
    }

    let searched = &candidates[..candidates.len().min(MAX_SELECTION_CANDIDATES)];
    let mut selected = (1..=request.number_max_in_utxos)
        .find_map(|k| first_covering(searched, k, target))
        .ok_or_else(|| {
            error(
                Code::FailedToFindUtxoCombination,
                format!(
                    "no {} notes cover sol {} spl {}",
                    request.number_max_in_utxos, target.sol, target.spl
                ),
            )
        })?;

    // consolidate: spend more notes while input slots are free
    for (i, candidate) in candidates.iter().enumerate() {
        if selected.len() >= request.number_max_in_utxos {
            break;
        }
        if selected.contains(&i) {
            continue;
        }
        let mut with = selected.iter().map(|j| candidates[*j]).collect::<Vec<_>>();
        with.push(*candidate);
        if single_spl_mint(&with) {
            selected.push(i);
        }
    }

    log::debug!("selected {} of {} candidate notes", selected.len(), candidates.len());
    Ok(selected.into_iter().map(|i| candidates[i].clone()).collect())
}

fn target(request: &SelectInUtxosRequest<'_>) -> Target {
    let out_sol: u128 = request.out_utxos.iter().map(|u| u.sol_amount() as u128).sum();
    let out_spl: u128 = request.out_utxos.iter().map(|u| u.spl_amount() as u128).sum();
    let fee = request.relayer_fee.unwrap_or(0) as u128;
    match request.action {
        Action::Shield => Target::default(),
        Action::Unshield => Target {
            sol: request.public_amount_sol.unwrap_or(0) as u128 + fee + out_sol,
            spl: request.public_amount_spl.unwrap_or(0) as u128 + out_spl,
        },
        Action::Transfer => Target {
            sol: out_sol + fee,
            spl: out_spl,
        },
    }
}

fn single_spl_mint(utxos: &[&Utxo]) -> bool {
    let mut mints = utxos.iter().filter_map(|u| u.mint());
    match mints.next() {
        Some(first) => mints.all(|m| m == first),
        None => true,
    }
}

fn covers(utxos: &[&Utxo], target: Target) -> bool {
    let sol: u128 = utxos.iter().map(|u| u.sol_amount() as u128).sum();
    let spl: u128 = utxos.iter().map(|u| u.spl_amount() as u128).sum();
    sol >= target.sol && spl >= target.spl && single_spl_mint(utxos)
}

/// First size-`k` combination in lexicographic index order that covers `target`.
fn first_covering(candidates: &[&Utxo], k: usize, target: Target) -> Option<Vec<usize>> {
    let n = candidates.len();
    if k == 0 || k > n {
        return None;
    }
    let mut indices: Vec<usize> = (0..k).collect();
    'search: loop {
        let picked: Vec<&Utxo> = indices.iter().map(|i| candidates[*i]).collect();
        if covers(&picked, target) {
            return Some(indices);
        }

        let mut i = k;
        while i > 0 {
            i -= 1;
            if indices[i] != i + n - k {
                indices[i] += 1;
                for j in i + 1..k {
                    indices[j] = indices[j - 1] + 1;
                }
                continue 'search;
            }
        }
        return None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_config::ShroudConfig;
    use shroud_privacy::{Account, Poseidon, Registries, UtxoConfig};

    fn registries() -> Registries {
        Registries::from_config(&ShroudConfig::default()).unwrap()
    }

    fn utxo(sol: i128) -> Utxo {
        Utxo::new(
            &Poseidon::new(),
            UtxoConfig::new(Account::from_seed(&Poseidon::new(), &[1u8; 32]).unwrap())
                .with_assets(vec![Pubkey::SYSTEM_PROGRAM])
                .with_amounts(vec![sol]),
            &registries(),
        )
        .unwrap()
    }

    fn request<'a>(utxos: &'a [Utxo], action: Action) -> SelectInUtxosRequest<'a> {
        SelectInUtxosRequest {
            utxos,
            action,
            public_mint: None,
            public_amount_sol: Some(100),
            public_amount_spl: None,
            relayer_fee: Some(10),
            out_utxos: &[],
            number_max_in_utxos: 2,
            number_max_out_utxos: 2,
        }
    }

    #[test]
    fn test_first_covering_is_lexicographic() {
        let utxos = [utxo(50), utxo(40), utxo(30)];
        let refs: Vec<&Utxo> = utxos.iter().collect();
        let t = Target { sol: 70, spl: 0 };
        assert_eq!(first_covering(&refs, 1, t), None);
        assert_eq!(first_covering(&refs, 2, t), Some(vec![0, 1]));
        let t = Target { sol: 80, spl: 0 };
        assert_eq!(first_covering(&refs, 2, t), Some(vec![0, 1]));
        let t = Target { sol: 95, spl: 0 };
        assert_eq!(first_covering(&refs, 2, t), None);
        assert_eq!(first_covering(&refs, 3, t), Some(vec![0, 1, 2]));
    }

    #[test]
    fn test_unshield_picks_smallest_cover_then_fills() {
        let utxos = [utxo(60), utxo(200), utxo(5)];
        let selected = select_in_utxos(&request(&utxos, Action::Unshield)).unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].sol_amount(), 200);
        assert_eq!(selected[1].sol_amount(), 60);
    }

    #[test]
    fn test_precondition_codes() {
        let utxos = [utxo(60)];

        let mut r = request(&utxos, Action::Unshield);
        r.public_amount_sol = None;
        assert_eq!(
            select_in_utxos(&r).unwrap_err().code,
            SelectInUtxosErrorCode::NoPublicAmountsProvided
        );

        let mut r = request(&utxos, Action::Unshield);
        r.public_amount_spl = Some(5);
        assert_eq!(
            select_in_utxos(&r).unwrap_err().code,
            SelectInUtxosErrorCode::NoPublicMintProvided
        );

        let mut r = request(&utxos, Action::Unshield);
        r.relayer_fee = None;
        assert_eq!(
            select_in_utxos(&r).unwrap_err().code,
            SelectInUtxosErrorCode::RelayerFeeUndefined
        );

        let r = request(&utxos, Action::Shield);
        assert_eq!(
            select_in_utxos(&r).unwrap_err().code,
            SelectInUtxosErrorCode::RelayerFeeDefined
        );

        let r = request(&[], Action::Unshield);
        assert_eq!(
            select_in_utxos(&r).unwrap_err().code,
            SelectInUtxosErrorCode::NoUtxosProvided
        );

        let mut r = request(&[], Action::Shield);
        r.relayer_fee = None;
        assert!(select_in_utxos(&r).unwrap().is_empty());
    }

    #[test]
    fn test_bounded_by_input_width() {
        let utxos = [utxo(40), utxo(40), utxo(40)];
        let mut r = request(&utxos, Action::Unshield);
        r.public_amount_sol = Some(100);
        r.relayer_fee = Some(10);
        let err = select_in_utxos(&r).unwrap_err();
        assert_eq!(err.code, SelectInUtxosErrorCode::FailedToFindUtxoCombination);

        r.number_max_in_utxos = 3;
        assert_eq!(select_in_utxos(&r).unwrap().len(), 3);
    }
}
