//! # Ledger Events
//!
//! Every committed state change, in either component, produces exactly one
//! [`EventRecord`]. Records are appended to an [`EventLog`] and never
//! touched again: there is no API to mutate or remove one. An auditor who
//! replays a log from sequence 1 reconstructs the component's state.
//!
//! Each component owns its own log, so sequence numbers are per log and
//! gap-free, starting at 1.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::principal::Principal;
use crate::role::Role;

/// A committed state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A role was granted. `version` is the grant-table version after the change.
    RoleGranted {
        principal: Principal,
        role: Role,
        version: u64,
    },
    /// A role was revoked or renounced.
    RoleRevoked {
        principal: Principal,
        role: Role,
        version: u64,
    },
    /// Admin authority moved from one principal to another in one step.
    AdminTransferred {
        old_admin: Principal,
        new_admin: Principal,
        version: u64,
    },
    /// Funds were credited to the depositor's account.
    Deposited {
        principal: Principal,
        amount: u64,
        new_balance: u64,
    },
    /// Funds were debited and released to the account holder.
    Withdrawn {
        principal: Principal,
        amount: u64,
        new_balance: u64,
    },
    /// Funds were debited from `principal` and released to `admin`.
    AdminWithdrawn {
        admin: Principal,
        principal: Principal,
        amount: u64,
        new_balance: u64,
    },
    /// The vault was halted.
    Paused { by: Principal },
    /// The vault was resumed.
    Unpaused { by: Principal },
}

impl LedgerEvent {
    /// Short event name, matching the variant.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::RoleGranted { .. } => "RoleGranted",
            LedgerEvent::RoleRevoked { .. } => "RoleRevoked",
            LedgerEvent::AdminTransferred { .. } => "AdminTransferred",
            LedgerEvent::Deposited { .. } => "Deposited",
            LedgerEvent::Withdrawn { .. } => "Withdrawn",
            LedgerEvent::AdminWithdrawn { .. } => "AdminWithdrawn",
            LedgerEvent::Paused { .. } => "Paused",
            LedgerEvent::Unpaused { .. } => "Unpaused",
        }
    }

    /// Net effect of this event on total custody: `(credited, debited)`.
    pub fn custody_delta(&self) -> (u64, u64) {
        match self {
            LedgerEvent::Deposited { amount, .. } => (*amount, 0),
            LedgerEvent::Withdrawn { amount, .. } | LedgerEvent::AdminWithdrawn { amount, .. } => {
                (0, *amount)
            }
            _ => (0, 0),
        }
    }
}

/// An event with its position in the log and the time it was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// 1-based position in the owning log.
    pub sequence: u64,
    /// Wall-clock time of the commit.
    pub recorded_at: DateTime<Utc>,
    /// What happened.
    pub event: LedgerEvent,
}

/// Append-only event history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event and returns a copy of the stored record.
    pub fn append(&mut self, event: LedgerEvent) -> EventRecord {
        let record = EventRecord {
            sequence: self.records.len() as u64 + 1,
            recorded_at: Utc::now(),
            event,
        };
        self.records.push(record.clone());
        record
    }

    /// All records, oldest first.
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Records with a sequence number strictly greater than `sequence`.
    pub fn since(&self, sequence: u64) -> &[EventRecord] {
        let start = usize::try_from(sequence)
            .unwrap_or(usize::MAX)
            .min(self.records.len());
        &self.records[start..]
    }

    /// Sequence number of the newest record, or 0 for an empty log.
    pub fn last_sequence(&self) -> u64 {
        self.records.len() as u64
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
