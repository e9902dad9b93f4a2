//! Error types shared by the authorization manager and the vault.
//!
//! Every failing operation returns a [`VaultError`] and leaves no state
//! behind. The variants split into two classes: *rejections* (the request
//! was not allowed or not valid; the caller may fix something and try
//! again) and *faults* (the vault refused to finish an operation it had
//! started). [`VaultError::is_fault`] tells them apart.

use thiserror::Error;

use crate::role::Role;

/// Result alias used throughout the vault crates.
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors that can occur during authorization or vault operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// The caller does not hold admin authority.
    #[error("not admin: {caller} does not hold admin authority")]
    NotAdmin {
        /// The principal that attempted the admin operation.
        caller: String,
    },

    /// A null or empty principal was supplied where a real identity is required.
    #[error("invalid principal: {0:?}")]
    InvalidPrincipal(String),

    /// The role is outside the closed role enumeration.
    #[error("invalid role: {0:?}")]
    InvalidRole(String),

    /// The caller lacks a current grant for the required role.
    #[error("unauthorized: {principal} does not hold role {role}")]
    Unauthorized {
        /// The principal whose check failed.
        principal: String,
        /// The role the operation requires.
        role: Role,
    },

    /// Zero amounts are rejected.
    #[error("invalid amount: {0}")]
    InvalidAmount(u64),

    /// The account holds less than the requested amount.
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        /// The account's current balance.
        available: u64,
        /// The amount the caller tried to move.
        requested: u64,
    },

    /// Crediting the account would overflow `u64`.
    #[error("balance overflow: current {current}, credit {credit}")]
    BalanceOverflow {
        /// The balance before the failed credit.
        current: u64,
        /// The amount that caused the overflow.
        credit: u64,
    },

    /// The vault is paused.
    #[error("vault is paused")]
    Paused,

    /// A call re-entered the vault while another operation was in flight.
    #[error("re-entrant call rejected")]
    ReentrantCall,

    /// The external release of funds failed; the debit was rolled back.
    #[error("release failed: {0}")]
    ReleaseFailed(String),
}

impl VaultError {
    /// Stable snake_case code, suitable for metrics labels and API bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            VaultError::NotAdmin { .. } => "not_admin",
            VaultError::InvalidPrincipal(_) => "invalid_principal",
            VaultError::InvalidRole(_) => "invalid_role",
            VaultError::Unauthorized { .. } => "unauthorized",
            VaultError::InvalidAmount(_) => "invalid_amount",
            VaultError::InsufficientBalance { .. } => "insufficient_balance",
            VaultError::BalanceOverflow { .. } => "balance_overflow",
            VaultError::Paused => "paused",
            VaultError::ReentrantCall => "reentrant_call",
            VaultError::ReleaseFailed(_) => "release_failed",
        }
    }

    /// `true` for system faults, `false` for ordinary rejections.
    pub fn is_fault(&self) -> bool {
        matches!(self, VaultError::ReentrantCall | VaultError::ReleaseFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faults_are_distinguished_from_rejections() {
        assert!(VaultError::ReentrantCall.is_fault());
        assert!(VaultError::ReleaseFailed("sink offline".into()).is_fault());
        assert!(!VaultError::Paused.is_fault());
        assert!(!VaultError::Unauthorized {
            principal: "bob".into(),
            role: Role::Withdrawer,
        }
        .is_fault());
    }

    #[test]
    fn messages_name_the_offending_values() {
        let err = VaultError::InsufficientBalance {
            available: 100,
            requested: 150,
        };
        assert_eq!(
            err.to_string(),
            "insufficient balance: available 100, requested 150"
        );
        let err = VaultError::Unauthorized {
            principal: "bob".into(),
            role: Role::Withdrawer,
        };
        assert_eq!(err.to_string(), "unauthorized: bob does not hold role Withdrawer");
    }

    #[test]
    fn kinds_are_unique() {
        let all = [
            VaultError::NotAdmin { caller: "x".into() },
            VaultError::InvalidPrincipal(String::new()),
            VaultError::InvalidRole("x".into()),
            VaultError::Unauthorized {
                principal: "x".into(),
                role: Role::Admin,
            },
            VaultError::InvalidAmount(0),
            VaultError::InsufficientBalance {
                available: 0,
                requested: 1,
            },
            VaultError::BalanceOverflow {
                current: u64::MAX,
                credit: 1,
            },
            VaultError::Paused,
            VaultError::ReentrantCall,
            VaultError::ReleaseFailed("x".into()),
        ];
        let mut kinds: Vec<_> = all.iter().map(VaultError::kind).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), all.len());
    }
}
