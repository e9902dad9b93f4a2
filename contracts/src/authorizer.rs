//! # Authorizer Seam
//!
//! The vault never talks to a concrete permission store. It talks to an
//! [`Authorizer`], asks it for a [`GrantSnapshot`], and runs one capability
//! check against that snapshot. The snapshot stays alive while the vault
//! commits, so no grant change can land between "checked" and "committed".
//!
//! [`AuthorizationManager`](crate::authorization_manager::AuthorizationManager)
//! is the production implementation; tests can supply their own.

use vault_protocol::{Principal, Role};

/// A consistent read view of the grant table.
pub trait GrantSnapshot {
    /// Does `principal` currently hold `role`?
    fn is_authorized(&self, principal: &Principal, role: Role) -> bool;

    /// Grant-table version this view was taken at.
    fn version(&self) -> u64;
}

/// Source of authorization decisions for the vault.
pub trait Authorizer: Send + Sync {
    /// View type handed out by [`snapshot`](Self::snapshot).
    type Snapshot<'a>: GrantSnapshot
    where
        Self: 'a;

    /// Takes a snapshot of the latest committed grant state.
    fn snapshot(&self) -> Self::Snapshot<'_>;

    /// One-shot check against a fresh snapshot.
    fn is_authorized(&self, principal: &Principal, role: Role) -> bool {
        self.snapshot().is_authorized(principal, role)
    }
}
