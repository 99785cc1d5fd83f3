//! Program-derived accounts the pool creates per transaction.

use shroud_privacy::{Commitment, Nullifier};
use shroud_pubkey::Pubkey;

use crate::error::{TransactionError, TransactionErrorCode};

pub const NULLIFIER_SEED: &[u8] = b"nf";
pub const LEAVES_SEED: &[u8] = b"leaves";
pub const VERIFIER_STATE_SEED: &[u8] = b"VERIFIER_STATE";

fn derive(
    seeds: &[&[u8]],
    program: &Pubkey,
    function: &'static str,
) -> Result<Pubkey, TransactionError> {
    Pubkey::find_program_address(seeds, program)
        .map(|(address, _)| address)
        .map_err(|e| {
            TransactionError::new(
                TransactionErrorCode::PdaDerivationFailed,
                function,
                e.to_string(),
            )
        })
}

/// Exists once the nullifier has been spent.
pub fn nullifier_pda(
    merkle_tree_program: &Pubkey,
    nullifier: &Nullifier,
) -> Result<Pubkey, TransactionError> {
    derive(
        &[&nullifier.to_be_bytes(), NULLIFIER_SEED],
        merkle_tree_program,
        "nullifier_pda",
    )
}

/// Holds a pair of leaves until they are inserted into the tree.
/// Seeded with the first commitment of the pair.
pub fn leaves_pda(
    merkle_tree_program: &Pubkey,
    pair_leader: &Commitment,
) -> Result<Pubkey, TransactionError> {
    derive(
        &[pair_leader.as_bytes(), LEAVES_SEED],
        merkle_tree_program,
        "leaves_pda",
    )
}

pub fn verifier_state_pda(verifier: &Pubkey, signer: &Pubkey) -> Result<Pubkey, TransactionError> {
    derive(
        &[signer.as_bytes(), VERIFIER_STATE_SEED],
        verifier,
        "verifier_state_pda",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdas_are_deterministic_and_distinct() {
        let program = Pubkey::new_unique();
        let nullifier = Nullifier([7u8; 32]);
        let a = nullifier_pda(&program, &nullifier).unwrap();
        assert_eq!(a, nullifier_pda(&program, &nullifier).unwrap());
        assert_ne!(a, nullifier_pda(&program, &Nullifier([8u8; 32])).unwrap());
        assert_ne!(a, nullifier_pda(&Pubkey::new_unique(), &nullifier).unwrap());

        // same bytes, different seed tag
        let leaves = leaves_pda(&program, &Commitment(nullifier.to_be_bytes())).unwrap();
        assert_ne!(a, leaves);
        assert!(!a.is_on_curve());
    }
}
