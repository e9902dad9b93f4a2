//! # Roles
//!
//! The closed set of permission classes the vault understands. Adding a
//! role is a design-time change: every `match` on [`Role`] is exhaustive
//! on purpose, and anything arriving from outside the process (strings,
//! numeric codes) goes through [`FromStr`] or [`TryFrom<u8>`] and fails
//! with [`VaultError::InvalidRole`] when it does not name a known role.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VaultError;

/// A permission class checked by the vault before any state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May credit funds to their own account.
    Depositor,
    /// May withdraw funds from their own account.
    Withdrawer,
    /// May pause the vault and perform recovery withdrawals.
    Admin,
}

impl Role {
    /// Every role, in code order.
    pub const ALL: [Role; 3] = [Role::Depositor, Role::Withdrawer, Role::Admin];

    /// Stable numeric code used by compact encodings.
    pub fn code(self) -> u8 {
        match self {
            Role::Depositor => 0,
            Role::Withdrawer => 1,
            Role::Admin => 2,
        }
    }

    /// Lowercase name, as used in URLs and JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Depositor => "depositor",
            Role::Withdrawer => "withdrawer",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Depositor => write!(f, "Depositor"),
            Role::Withdrawer => write!(f, "Withdrawer"),
            Role::Admin => write!(f, "Admin"),
        }
    }
}

impl FromStr for Role {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "depositor" => Ok(Role::Depositor),
            "withdrawer" => Ok(Role::Withdrawer),
            "admin" => Ok(Role::Admin),
            _ => Err(VaultError::InvalidRole(s.to_string())),
        }
    }
}

impl TryFrom<u8> for Role {
    type Error = VaultError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Role::ALL
            .into_iter()
            .find(|role| role.code() == code)
            .ok_or_else(|| VaultError::InvalidRole(code.to_string()))
    }
}
