//! # Release Effects
//!
//! Moving value *out* of custody is the one thing the vault cannot do on
//! its own books: something outside has to pay the recipient. That
//! something is a [`ReleaseHandler`]. The vault only calls it after the
//! debit is committed, and treats it as untrusted: it may fail, and it may
//! try to call back into the vault.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use vault_protocol::{Principal, VaultError};

/// Why a release did not go through.
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// The payout sink refused the transfer.
    #[error("release refused: {0}")]
    Refused(String),

    /// A nested vault call made by the handler failed.
    #[error("nested vault call failed: {0}")]
    Vault(#[from] VaultError),
}

/// Performs the external transfer of released funds.
pub trait ReleaseHandler: Send + Sync {
    /// Pays `amount` to `recipient`. Called with the ledger already debited.
    fn release(&self, recipient: &Principal, amount: u64) -> Result<(), ReleaseError>;
}

/// A completed external transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub recipient: Principal,
    pub amount: u64,
    pub released_at: DateTime<Utc>,
}

/// In-process payout sink: records every release in order.
#[derive(Debug, Default)]
pub struct ReleaseJournal {
    payouts: Mutex<Vec<Payout>>,
}

impl ReleaseJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// All payouts so far, oldest first.
    pub fn payouts(&self) -> Vec<Payout> {
        self.payouts.lock().clone()
    }

    /// Sum of every payout.
    pub fn total_released(&self) -> u64 {
        self.payouts.lock().iter().map(|p| p.amount).sum()
    }
}

impl ReleaseHandler for ReleaseJournal {
    fn release(&self, recipient: &Principal, amount: u64) -> Result<(), ReleaseError> {
        self.payouts.lock().push(Payout {
            recipient: recipient.clone(),
            amount,
            released_at: Utc::now(),
        });
        info!(%recipient, amount, "funds released");
        Ok(())
    }
}
