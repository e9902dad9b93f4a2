//! # Secure Vault Components
//!
//! The two halves of the vault and the seams between them:
//!
//! - **Authorization Manager** — the permission ledger: admin identity,
//!   versioned `(principal, role)` grants, and their history.
//! - **Secure Vault** — custody of balances. Every state change asks an
//!   [`Authorizer`] first and commits only on a current grant.
//! - **Release** — the external payout effect, invoked only after the
//!   ledger debit is committed.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow and underflow; balances
//!    are `u64` and never go negative.
//! 2. Internal commit before external effect. Always.
//! 3. Authorization is read fresh for every request and held until commit.
//! 4. Every rejected request leaves state exactly as it found it.

pub mod authorization_manager;
pub mod authorizer;
pub mod operation;
pub mod release;
pub mod secure_vault;

pub use authorization_manager::{AuthorizationManager, GrantAudit, GrantStatus, PermissionGrant};
pub use authorizer::{Authorizer, GrantSnapshot};
pub use operation::{OperationKind, OperationPhase};
pub use release::{Payout, ReleaseError, ReleaseHandler, ReleaseJournal};
pub use secure_vault::{CustodyAudit, SecureVault};
