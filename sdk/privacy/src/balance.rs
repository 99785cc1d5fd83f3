//! Balance cache
//!
//! The wallet's only plaintext view of its notes. Every note sits in exactly
//! one bucket:
//!
//! ```text
//! committed ──confirm──▶ spendable ──nullifier seen──▶ spent
//!     └──────────────nullifier seen──────────────────────▲
//! ```

use std::collections::BTreeMap;

use shroud_pubkey::Pubkey;

use crate::commitment::Commitment;
use crate::registry::{Registries, TokenData};
use crate::utxo::Utxo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtxoBucket {
    Spendable,
    /// Leaf queued on-chain but not yet folded into the tree
    Committed,
    Spent,
}

/// Notes of one token.
#[derive(Debug, Clone)]
pub struct TokenUtxoBalance {
    pub token_data: TokenData,
    total_sol_amount: u64,
    total_spl_amount: u64,
    utxos: BTreeMap<Commitment, Utxo>,
    committed_utxos: BTreeMap<Commitment, Utxo>,
    spent_utxos: BTreeMap<Commitment, Utxo>,
}

impl TokenUtxoBalance {
    pub fn new(token_data: TokenData) -> Self {
        Self {
            token_data,
            total_sol_amount: 0,
            total_spl_amount: 0,
            utxos: BTreeMap::new(),
            committed_utxos: BTreeMap::new(),
            spent_utxos: BTreeMap::new(),
        }
    }

    pub fn contains(&self, commitment: &Commitment) -> bool {
        self.bucket_of(commitment).is_some()
    }

    pub fn bucket_of(&self, commitment: &Commitment) -> Option<UtxoBucket> {
        if self.utxos.contains_key(commitment) {
            Some(UtxoBucket::Spendable)
        } else if self.committed_utxos.contains_key(commitment) {
            Some(UtxoBucket::Committed)
        } else if self.spent_utxos.contains_key(commitment) {
            Some(UtxoBucket::Spent)
        } else {
            None
        }
    }

    /// Returns false if the commitment is already tracked in any bucket.
    pub fn add_utxo(&mut self, commitment: Commitment, utxo: Utxo, bucket: UtxoBucket) -> bool {
        if self.contains(&commitment) {
            return false;
        }
        match bucket {
            UtxoBucket::Spendable => {
                self.credit(&utxo);
                self.utxos.insert(commitment, utxo);
            }
            UtxoBucket::Committed => {
                self.committed_utxos.insert(commitment, utxo);
            }
            UtxoBucket::Spent => {
                self.spent_utxos.insert(commitment, utxo);
            }
        }
        true
    }

    /// Nullifier observed: spendable or committed → spent.
    pub fn move_to_spent(&mut self, commitment: &Commitment) -> bool {
        if let Some(utxo) = self.utxos.remove(commitment) {
            self.debit(&utxo);
            self.spent_utxos.insert(*commitment, utxo);
            true
        } else if let Some(utxo) = self.committed_utxos.remove(commitment) {
            self.spent_utxos.insert(*commitment, utxo);
            true
        } else {
            false
        }
    }

    /// Spendable → committed, for a note whose leaf turns out to be queued.
    pub fn move_to_committed(&mut self, commitment: &Commitment) -> bool {
        match self.utxos.remove(commitment) {
            Some(utxo) => {
                self.debit(&utxo);
                self.committed_utxos.insert(*commitment, utxo);
                true
            }
            None => false,
        }
    }

    /// Committed → spendable once the leaf is in the tree.
    pub fn confirm(&mut self, commitment: &Commitment, index: u64) -> bool {
        match self.committed_utxos.remove(commitment) {
            Some(mut utxo) => {
                utxo.set_index(index);
                self.credit(&utxo);
                self.utxos.insert(*commitment, utxo);
                true
            }
            None => false,
        }
    }

    fn credit(&mut self, utxo: &Utxo) {
        self.total_sol_amount = self.total_sol_amount.saturating_add(utxo.sol_amount());
        self.total_spl_amount = self.total_spl_amount.saturating_add(utxo.spl_amount());
    }

    fn debit(&mut self, utxo: &Utxo) {
        self.total_sol_amount = self.total_sol_amount.saturating_sub(utxo.sol_amount());
        self.total_spl_amount = self.total_spl_amount.saturating_sub(utxo.spl_amount());
    }

    pub fn total_sol_amount(&self) -> u64 {
        self.total_sol_amount
    }

    pub fn total_spl_amount(&self) -> u64 {
        self.total_spl_amount
    }

    pub fn spendable_utxos(&self) -> Vec<Utxo> {
        self.utxos.values().cloned().collect()
    }

    pub fn committed_utxos(&self) -> Vec<Utxo> {
        self.committed_utxos.values().cloned().collect()
    }

    pub fn spent_utxos(&self) -> Vec<Utxo> {
        self.spent_utxos.values().cloned().collect()
    }
}

/// App notes owned by one program, bucketed per token.
#[derive(Debug, Clone)]
pub struct ProgramUtxoBalance {
    pub program_address: Pubkey,
    pub token_balances: BTreeMap<Pubkey, TokenUtxoBalance>,
}

impl ProgramUtxoBalance {
    pub fn new(program_address: Pubkey) -> Self {
        Self {
            program_address,
            token_balances: BTreeMap::new(),
        }
    }

    pub fn add_utxo(
        &mut self,
        commitment: Commitment,
        utxo: Utxo,
        bucket: UtxoBucket,
        token_data: &TokenData,
    ) -> bool {
        self.token_balances
            .entry(token_data.mint)
            .or_insert_with(|| TokenUtxoBalance::new(token_data.clone()))
            .add_utxo(commitment, utxo, bucket)
    }
}

/// Everything the wallet knows about its notes.
#[derive(Debug, Clone, Default)]
pub struct Balance {
    pub token_balances: BTreeMap<Pubkey, TokenUtxoBalance>,
    pub program_balances: BTreeMap<Pubkey, ProgramUtxoBalance>,
    /// Number of transactions sent, the next burner index
    pub transaction_nonce: u64,
}

impl Balance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a note to its token (or app program) bucket.
    pub fn add_utxo(
        &mut self,
        commitment: Commitment,
        utxo: Utxo,
        bucket: UtxoBucket,
        registries: &Registries,
    ) -> bool {
        let mint = utxo.mint().unwrap_or(Pubkey::SYSTEM_PROGRAM);
        let Some(token_data) = registries.assets.token_by_mint(&mint) else {
            log::warn!("note {commitment:?} holds unknown mint {mint}, not tracked");
            return false;
        };
        if self.contains(&commitment) {
            return false;
        }

        if utxo.is_app_utxo() {
            let program = utxo.verifier_address();
            self.program_balances
                .entry(program)
                .or_insert_with(|| ProgramUtxoBalance::new(program))
                .add_utxo(commitment, utxo, bucket, token_data)
        } else {
            self.token_balances
                .entry(mint)
                .or_insert_with(|| TokenUtxoBalance::new(token_data.clone()))
                .add_utxo(commitment, utxo, bucket)
        }
    }

    fn all_token_balances_mut(&mut self) -> impl Iterator<Item = &mut TokenUtxoBalance> {
        self.token_balances.values_mut().chain(
            self.program_balances
                .values_mut()
                .flat_map(|p| p.token_balances.values_mut()),
        )
    }

    pub fn contains(&self, commitment: &Commitment) -> bool {
        self.token_balances.values().any(|b| b.contains(commitment))
            || self
                .program_balances
                .values()
                .flat_map(|p| p.token_balances.values())
                .any(|b| b.contains(commitment))
    }

    pub fn move_to_spent(&mut self, commitment: &Commitment) -> bool {
        self.all_token_balances_mut()
            .any(|b| b.move_to_spent(commitment))
    }

    pub fn move_to_committed(&mut self, commitment: &Commitment) -> bool {
        self.all_token_balances_mut()
            .any(|b| b.move_to_committed(commitment))
    }

    pub fn confirm(&mut self, commitment: &Commitment, index: u64) -> bool {
        self.all_token_balances_mut()
            .any(|b| b.confirm(commitment, index))
    }

    pub fn token_balance(&self, mint: &Pubkey) -> Option<&TokenUtxoBalance> {
        self.token_balances.get(mint)
    }

    /// Spendable plain notes of `mint`, or of the native asset for `None`.
    pub fn spendable_utxos(&self, mint: Option<&Pubkey>) -> Vec<Utxo> {
        self.token_balances
            .get(mint.unwrap_or(&Pubkey::SYSTEM_PROGRAM))
            .map(TokenUtxoBalance::spendable_utxos)
            .unwrap_or_default()
    }

    /// All spendable plain notes across tokens.
    pub fn all_spendable_utxos(&self) -> Vec<Utxo> {
        self.token_balances
            .values()
            .flat_map(|b| b.utxos.values().cloned())
            .collect()
    }

    pub fn total_sol_amount(&self) -> u64 {
        self.token_balances
            .values()
            .map(TokenUtxoBalance::total_sol_amount)
            .fold(0u64, u64::saturating_add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::hasher::Poseidon;
    use crate::utxo::UtxoConfig;
    use shroud_config::ShroudConfig;

    fn registries() -> Registries {
        Registries::from_config(&ShroudConfig::default()).unwrap()
    }

    fn note(registries: &Registries, sol: i128, spl: i128) -> (Commitment, Utxo) {
        let h = Poseidon::new();
        let account = Account::from_seed(&h, &[1u8; 32]).unwrap();
        let usdc = registries.assets.token_by_symbol("USDC").unwrap().mint;
        let assets = if spl > 0 {
            vec![Pubkey::SYSTEM_PROGRAM, usdc]
        } else {
            vec![Pubkey::SYSTEM_PROGRAM]
        };
        let amounts = if spl > 0 { vec![sol, spl] } else { vec![sol] };
        let utxo = Utxo::new(
            &h,
            UtxoConfig::new(account).with_assets(assets).with_amounts(amounts),
            registries,
        )
        .unwrap();
        (utxo.commitment(&h), utxo)
    }

    #[test]
    fn test_spendable_totals() {
        let r = registries();
        let mut balance = Balance::new();
        let (c1, u1) = note(&r, 100, 0);
        let (c2, u2) = note(&r, 50, 7);
        assert!(balance.add_utxo(c1, u1.clone(), UtxoBucket::Spendable, &r));
        assert!(balance.add_utxo(c2, u2, UtxoBucket::Spendable, &r));
        assert!(!balance.add_utxo(c1, u1, UtxoBucket::Spendable, &r));

        assert_eq!(balance.total_sol_amount(), 150);
        assert_eq!(balance.spendable_utxos(None).len(), 1);
        let usdc = r.assets.token_by_symbol("USDC").unwrap().mint;
        let usdc_balance = balance.token_balance(&usdc).unwrap();
        assert_eq!(usdc_balance.total_spl_amount(), 7);
        assert_eq!(usdc_balance.total_sol_amount(), 50);
    }

    #[test]
    fn test_commitment_in_one_bucket() {
        let r = registries();
        let mut balance = Balance::new();
        let (c, u) = note(&r, 100, 0);
        balance.add_utxo(c, u.clone(), UtxoBucket::Committed, &r);
        assert_eq!(balance.total_sol_amount(), 0);
        assert!(!balance.add_utxo(c, u, UtxoBucket::Spendable, &r));

        assert!(balance.confirm(&c, 12));
        assert_eq!(balance.total_sol_amount(), 100);
        let native = balance.token_balance(&Pubkey::SYSTEM_PROGRAM).unwrap();
        assert_eq!(native.bucket_of(&c), Some(UtxoBucket::Spendable));
        assert_eq!(native.spendable_utxos()[0].index(), Some(12));

        assert!(balance.move_to_spent(&c));
        assert_eq!(balance.total_sol_amount(), 0);
        assert!(!balance.move_to_spent(&c));
        let native = balance.token_balance(&Pubkey::SYSTEM_PROGRAM).unwrap();
        assert_eq!(native.bucket_of(&c), Some(UtxoBucket::Spent));
        assert!(native.spendable_utxos().is_empty());
        assert!(native.committed_utxos().is_empty());
    }

    #[test]
    fn test_move_to_committed() {
        let r = registries();
        let mut balance = Balance::new();
        let (c, u) = note(&r, 9, 0);
        balance.add_utxo(c, u, UtxoBucket::Spendable, &r);
        assert!(balance.move_to_committed(&c));
        assert_eq!(balance.total_sol_amount(), 0);
        assert!(!balance.move_to_committed(&c));
    }
}
