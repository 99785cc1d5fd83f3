//! Relayer
//!
//! The relayer signs and pays for unshield and transfer transactions so the
//! user's wallet never appears on-chain. Its fee is bound into the
//! integrity hash and taken out of the spent notes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shroud_config::RelayerRuntime;
use shroud_pubkey::Pubkey;

use crate::error::{RelayerError, RelayerErrorCode};
use crate::transaction::SendRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relayer {
    /// Signs the transaction
    pub account: Pubkey,
    /// Receives the fee
    pub recipient_sol: Pubkey,
    pub fee: u64,
    /// Charged on top when the recipient token account has to be created
    pub ata_creation_fee: u64,
}

impl Relayer {
    pub fn new(account: Pubkey, recipient_sol: Pubkey, fee: u64, ata_creation_fee: u64) -> Self {
        Self {
            account,
            recipient_sol,
            fee,
            ata_creation_fee,
        }
    }

    /// A relayer for shields: the wallet pays and no fee is charged.
    pub fn for_sender(sender: Pubkey) -> Self {
        Self::new(sender, sender, 0, 0)
    }

    pub fn from_runtime(runtime: &RelayerRuntime) -> Self {
        Self::new(
            runtime.pubkey,
            runtime.recipient_sol,
            runtime.fee,
            runtime.ata_creation_fee,
        )
    }

    pub fn get_relayer_fee(&self, ata_creation: bool) -> u64 {
        if ata_creation {
            self.fee.saturating_add(self.ata_creation_fee)
        } else {
            self.fee
        }
    }

    /// Fee check for relayed actions.
    pub fn ensure_fee(&self) -> Result<u64, RelayerError> {
        if self.fee == 0 {
            return Err(RelayerError::new(
                RelayerErrorCode::RelayerFeeUndefined,
                "Relayer::ensure_fee",
                format!("relayer {} charges no fee", self.account),
            ));
        }
        Ok(self.fee)
    }
}

/// Submits compiled and proved transactions.
///
/// Implementations wrap an HTTP relayer or a wallet that signs itself. The
/// transaction layer never retries a submission.
#[async_trait]
pub trait RelayerClient: Send + Sync {
    /// Returns the transaction signature.
    async fn send_transaction(&self, request: &SendRequest) -> Result<String, RelayerError>;
}
