//! Balance sync
//!
//! Trial-decrypts every ciphertext in the indexed history with the wallet's
//! account and sorts the notes it owns into buckets:
//!
//! - Spent: its nullifier account exists
//! - Committed: written to chain, not yet in the local tree
//! - Spendable: in the tree and not nullified

use shroud_privacy::{Account, Balance, FieldHasher, Utxo, UtxoBucket};

use crate::error::Result;
use crate::params::encrypted_utxo_at;
use crate::pda::nullifier_pda;
use crate::provider::{Chain, IndexedTransaction, Provider};
use crate::sol_merkle_tree::LeafStatus;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Notes owned by the account found in this pass
    pub decrypted: usize,
    pub spendable: usize,
    pub committed: usize,
    pub spent: usize,
}

pub async fn sync_balance<H: FieldHasher + Clone, C: Chain>(
    provider: &Provider<H>,
    balance: &mut Balance,
    account: &Account,
    history: &[IndexedTransaction],
    chain: &C,
) -> Result<SyncReport> {
    let tree = provider.merkle_tree("sync_balance")?;
    let program = &provider.pool.merkle_tree_program;
    let slot_size = provider.pool.encrypted_utxo_slot_size;
    let mut report = SyncReport::default();

    for tx in history {
        for (j, commitment) in tx.leaves.iter().enumerate() {
            let Some(ciphertext) = encrypted_utxo_at(&tx.encrypted_utxos, j, slot_size) else {
                continue;
            };
            let index = tx.first_leaf_index + j as u64;
            let Some(utxo) = Utxo::decrypt_any(
                &provider.hasher,
                ciphertext,
                account,
                &tree.pubkey,
                commitment,
                Some(index),
                &provider.registries,
                None,
            ) else {
                continue;
            };
            if utxo.is_empty() {
                continue;
            }
            report.decrypted += 1;

            let bucket = match tree.leaf_status(chain, program, commitment).await? {
                LeafStatus::Inserted(_) => {
                    if is_spent(provider, &utxo, chain).await? {
                        UtxoBucket::Spent
                    } else {
                        UtxoBucket::Spendable
                    }
                }
                LeafStatus::Queued | LeafStatus::Unknown => UtxoBucket::Committed,
            };

            match bucket {
                UtxoBucket::Spent => report.spent += 1,
                UtxoBucket::Committed => report.committed += 1,
                UtxoBucket::Spendable => report.spendable += 1,
            }

            if !balance.contains(commitment) {
                balance.add_utxo(*commitment, utxo, bucket, &provider.registries);
                continue;
            }
            match bucket {
                UtxoBucket::Spent => {
                    balance.move_to_spent(commitment);
                }
                UtxoBucket::Spendable => {
                    balance.confirm(commitment, index);
                }
                UtxoBucket::Committed => {}
            }
        }
    }

    log::info!(
        "synced {} notes: {} spendable, {} committed, {} spent",
        report.decrypted,
        report.spendable,
        report.committed,
        report.spent
    );
    Ok(report)
}

async fn is_spent<H: FieldHasher + Clone, C: Chain>(
    provider: &Provider<H>,
    utxo: &Utxo,
    chain: &C,
) -> Result<bool> {
    // view-only accounts cannot derive nullifiers
    if !utxo.account().has_spending_key() {
        log::debug!("cannot check spent status without a spending key");
        return Ok(false);
    }
    let nullifier = utxo.nullifier(&provider.hasher)?;
    let pda = nullifier_pda(&provider.pool.merkle_tree_program, &nullifier)?;
    Ok(chain.account_exists(&pda).await?)
}
