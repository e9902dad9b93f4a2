// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Secure Vault — Shared Protocol Types
//!
//! The vocabulary both vault components speak. Nothing in here moves value
//! or decides anything; it only names things so the authorization manager
//! and the vault agree on them.
//!
//! - **principal** — opaque caller identities and the null-identity rule.
//! - **role** — the closed set of permission classes.
//! - **event** — committed state changes and the append-only log.
//! - **error** — the shared rejection/fault taxonomy.
//! - **config** — constants, pause policy, and the node config file.

pub mod config;
pub mod error;
pub mod event;
pub mod principal;
pub mod role;

pub use config::{PausePolicy, VaultConfig};
pub use error::{VaultError, VaultResult};
pub use event::{EventLog, EventRecord, LedgerEvent};
pub use principal::Principal;
pub use role::Role;
