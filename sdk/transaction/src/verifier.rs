//! Verifier table
//!
//! Each verifier program checks proofs of one fixed circuit shape. The
//! shape decides how many notes are padded in and out of a transaction.
//!
//! | kind  | inputs | outputs | app data |
//! |-------|--------|---------|----------|
//! | Zero  | 2      | 2       | no       |
//! | One   | 10     | 2       | no       |
//! | App   | 4      | 4       | yes      |

use serde::{Deserialize, Serialize};
use shroud_privacy::VerifierRegistry;
use shroud_pubkey::Pubkey;

/// Circuit width of a verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifierConfig {
    pub inputs: usize,
    pub outputs: usize,
    pub has_app_data: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerifierKind {
    /// 2 in, 2 out
    Zero,
    /// 10 in, 2 out, used to merge many small notes
    One,
    /// 4 in, 4 out, proves alongside an app circuit
    App,
}

impl VerifierKind {
    pub const fn config(self) -> VerifierConfig {
        match self {
            Self::Zero => VerifierConfig {
                inputs: 2,
                outputs: 2,
                has_app_data: false,
            },
            Self::One => VerifierConfig {
                inputs: 10,
                outputs: 2,
                has_app_data: false,
            },
            Self::App => VerifierConfig {
                inputs: 4,
                outputs: 4,
                has_app_data: true,
            },
        }
    }

    pub fn program_id(self, registry: &VerifierRegistry) -> Pubkey {
        match self {
            Self::Zero => registry.two_in_two_out,
            Self::One => registry.ten_in_two_out,
            Self::App => registry.four_in_four_out,
        }
    }

    /// Reverse lookup of a program id.
    pub fn from_program_id(program: &Pubkey, registry: &VerifierRegistry) -> Option<Self> {
        [Self::Zero, Self::One, Self::App]
            .into_iter()
            .find(|kind| kind.program_id(registry) == *program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_config::ShroudConfig;
    use shroud_privacy::Registries;

    #[test]
    fn test_widths() {
        assert_eq!(VerifierKind::Zero.config().inputs, 2);
        assert_eq!(VerifierKind::One.config().inputs, 10);
        assert_eq!(VerifierKind::One.config().outputs, 2);
        assert!(VerifierKind::App.config().has_app_data);
        assert!(!VerifierKind::Zero.config().has_app_data);
    }

    #[test]
    fn test_program_id_round_trip() {
        let registries = Registries::from_config(&ShroudConfig::default()).unwrap();
        for kind in [VerifierKind::Zero, VerifierKind::One, VerifierKind::App] {
            let id = kind.program_id(&registries.verifiers);
            assert_eq!(VerifierKind::from_program_id(&id, &registries.verifiers), Some(kind));
        }
        assert_eq!(
            VerifierKind::from_program_id(&Pubkey::new_unique(), &registries.verifiers),
            None
        );
    }
}
