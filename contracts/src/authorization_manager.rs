//! # Authorization Manager
//!
//! The single source of truth for "who may do what". Holds the admin
//! identity, the `(principal, role)` grant table, a version counter that
//! moves on every effective change, and the append-only history of those
//! changes.
//!
//! ## Security Model
//!
//! - **Admin gating**: only the current admin identity may grant, revoke,
//!   or hand admin authority on. Anyone may renounce their own grants.
//! - **Atomic admin transfer**: the old admin loses authority under the
//!   same write lock in which the new admin gains it. There is never a
//!   moment with zero admins.
//! - **Replayable history**: every mutation is expressed as a
//!   [`LedgerEvent`] and applied through the same code path an auditor
//!   uses to rebuild the table from the log (see [`AuthorizationManager::audit`]).

use std::collections::BTreeMap;

use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use vault_protocol::{
    EventLog, EventRecord, LedgerEvent, Principal, Role, VaultError, VaultResult,
};

use crate::authorizer::{Authorizer, GrantSnapshot};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Whether a recorded grant is currently in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
    Granted,
    Revoked,
}

/// Current state of one `(principal, role)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    /// Granted or revoked.
    pub status: GrantStatus,
    /// Grant-table version at which this pair last changed.
    pub version: u64,
}

impl PermissionGrant {
    pub fn is_granted(&self) -> bool {
        self.status == GrantStatus::Granted
    }
}

/// The permission table proper. Mutated only through [`GrantTable::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
struct GrantTable {
    admin: Principal,
    grants: BTreeMap<(Principal, Role), PermissionGrant>,
    version: u64,
}

impl GrantTable {
    fn genesis(admin: Principal) -> Self {
        Self {
            admin,
            grants: BTreeMap::new(),
            version: 0,
        }
    }

    fn holds_grant(&self, principal: &Principal, role: Role) -> bool {
        self.grants
            .get(&(principal.clone(), role))
            .is_some_and(PermissionGrant::is_granted)
    }

    fn is_authorized(&self, principal: &Principal, role: Role) -> bool {
        if role == Role::Admin && *principal == self.admin {
            return true;
        }
        self.holds_grant(principal, role)
    }

    fn apply(&mut self, event: &LedgerEvent) {
        match event {
            LedgerEvent::RoleGranted {
                principal,
                role,
                version,
            } => {
                self.set(principal, *role, GrantStatus::Granted, *version);
            }
            LedgerEvent::RoleRevoked {
                principal,
                role,
                version,
            } => {
                self.set(principal, *role, GrantStatus::Revoked, *version);
            }
            LedgerEvent::AdminTransferred {
                new_admin, version, ..
            } => {
                self.admin = new_admin.clone();
                self.version = *version;
            }
            // Vault events carry no permission state.
            _ => {}
        }
    }

    fn set(&mut self, principal: &Principal, role: Role, status: GrantStatus, version: u64) {
        self.grants
            .insert((principal.clone(), role), PermissionGrant { status, version });
        self.version = version;
    }
}

#[derive(Debug)]
struct AuthState {
    genesis_admin: Principal,
    table: GrantTable,
    events: EventLog,
}

impl AuthState {
    fn commit(&mut self, event: LedgerEvent) -> EventRecord {
        self.table.apply(&event);
        self.events.append(event)
    }

    fn require_admin(&self, caller: &Principal) -> VaultResult<()> {
        if *caller != self.table.admin {
            warn!(caller = %caller, "admin operation rejected");
            return Err(VaultError::NotAdmin {
                caller: caller.to_string(),
            });
        }
        Ok(())
    }
}

/// Outcome of replaying the permission history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantAudit {
    /// Number of events replayed.
    pub events_replayed: usize,
    /// Version reached by the replay.
    pub replayed_version: u64,
    /// Version of the live table.
    pub live_version: u64,
    /// `true` if the replayed table equals the live one.
    pub consistent: bool,
}

// ---------------------------------------------------------------------------
// AuthorizationManager
// ---------------------------------------------------------------------------

/// Owns the permission ledger. Share it behind an `Arc`.
#[derive(Debug)]
pub struct AuthorizationManager {
    state: RwLock<AuthState>,
}

impl AuthorizationManager {
    /// Creates a manager with `bootstrap_admin` as the only authority and
    /// an empty grant table.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidPrincipal`] if `bootstrap_admin` is null.
    pub fn new(bootstrap_admin: Principal) -> VaultResult<Self> {
        bootstrap_admin.ensure_not_null()?;
        info!(admin = %bootstrap_admin, "authorization manager initialized");
        Ok(Self {
            state: RwLock::new(AuthState {
                genesis_admin: bootstrap_admin.clone(),
                table: GrantTable::genesis(bootstrap_admin),
                events: EventLog::new(),
            }),
        })
    }

    /// Grants `role` to `principal`.
    ///
    /// Returns `Ok(None)` when the grant is already in force: no version
    /// bump and no event.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotAdmin`] if `caller` is not the admin.
    /// Returns [`VaultError::InvalidPrincipal`] if `principal` is null.
    pub fn grant_role(
        &self,
        caller: &Principal,
        principal: &Principal,
        role: Role,
    ) -> VaultResult<Option<EventRecord>> {
        let mut state = self.state.write();
        state.require_admin(caller)?;
        principal.ensure_not_null()?;

        if state.table.holds_grant(principal, role) {
            return Ok(None);
        }

        let version = state.table.version + 1;
        let record = state.commit(LedgerEvent::RoleGranted {
            principal: principal.clone(),
            role,
            version,
        });
        info!(%caller, %principal, %role, version, "role granted");
        Ok(Some(record))
    }

    /// Revokes `role` from `principal`. Takes effect for every check that
    /// starts after this call returns; committed operations are untouched.
    ///
    /// Returns `Ok(None)` if the principal does not currently hold the role.
    ///
    /// # Errors
    ///
    /// Same as [`grant_role`](Self::grant_role).
    pub fn revoke_role(
        &self,
        caller: &Principal,
        principal: &Principal,
        role: Role,
    ) -> VaultResult<Option<EventRecord>> {
        let mut state = self.state.write();
        state.require_admin(caller)?;
        principal.ensure_not_null()?;

        if !state.table.holds_grant(principal, role) {
            return Ok(None);
        }

        let version = state.table.version + 1;
        let record = state.commit(LedgerEvent::RoleRevoked {
            principal: principal.clone(),
            role,
            version,
        });
        info!(%caller, %principal, %role, version, "role revoked");
        Ok(Some(record))
    }

    /// Drops the caller's own explicit grant of `role`. Needs no admin
    /// authority. The admin identity's implicit `Admin` authority is not a
    /// grant and cannot be renounced; use [`transfer_admin`](Self::transfer_admin).
    pub fn renounce_role(&self, caller: &Principal, role: Role) -> VaultResult<Option<EventRecord>> {
        caller.ensure_not_null()?;
        let mut state = self.state.write();

        if !state.table.holds_grant(caller, role) {
            return Ok(None);
        }

        let version = state.table.version + 1;
        let record = state.commit(LedgerEvent::RoleRevoked {
            principal: caller.clone(),
            role,
            version,
        });
        info!(%caller, %role, version, "role renounced");
        Ok(Some(record))
    }

    /// Hands admin authority from `caller` to `new_admin` in a single step.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotAdmin`] if `caller` is not the admin.
    /// Returns [`VaultError::InvalidPrincipal`] if `new_admin` is null; the
    /// current admin keeps its authority.
    pub fn transfer_admin(
        &self,
        caller: &Principal,
        new_admin: &Principal,
    ) -> VaultResult<EventRecord> {
        let mut state = self.state.write();
        state.require_admin(caller)?;
        new_admin.ensure_not_null()?;

        let old_admin = state.table.admin.clone();
        let version = state.table.version + 1;
        let record = state.commit(LedgerEvent::AdminTransferred {
            old_admin: old_admin.clone(),
            new_admin: new_admin.clone(),
            version,
        });
        info!(%old_admin, %new_admin, version, "admin transferred");
        Ok(record)
    }

    /// Pure read against the latest committed state.
    pub fn is_authorized(&self, principal: &Principal, role: Role) -> bool {
        self.state.read().table.is_authorized(principal, role)
    }

    /// The current admin identity.
    pub fn admin(&self) -> Principal {
        self.state.read().table.admin.clone()
    }

    /// Current grant-table version. Zero until the first change.
    pub fn version(&self) -> u64 {
        self.state.read().table.version
    }

    /// The recorded grant for a pair, including revoked ones.
    pub fn grant_of(&self, principal: &Principal, role: Role) -> Option<PermissionGrant> {
        self.state
            .read()
            .table
            .grants
            .get(&(principal.clone(), role))
            .copied()
    }

    /// Roles `principal` is currently authorized for, implicit admin included.
    pub fn roles_of(&self, principal: &Principal) -> Vec<Role> {
        let state = self.state.read();
        Role::ALL
            .into_iter()
            .filter(|role| state.table.is_authorized(principal, *role))
            .collect()
    }

    /// Full permission history.
    pub fn events(&self) -> Vec<EventRecord> {
        self.state.read().events.records().to_vec()
    }

    /// History after `sequence`, capped at `limit` records.
    pub fn events_since(&self, sequence: u64, limit: usize) -> Vec<EventRecord> {
        self.state
            .read()
            .events
            .since(sequence)
            .iter()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Rebuilds the grant table from the genesis admin and the event log
    /// and compares it with the live table.
    pub fn audit(&self) -> GrantAudit {
        let state = self.state.read();
        let mut replayed = GrantTable::genesis(state.genesis_admin.clone());
        for record in state.events.records() {
            replayed.apply(&record.event);
        }
        GrantAudit {
            events_replayed: state.events.len(),
            replayed_version: replayed.version,
            live_version: state.table.version,
            consistent: replayed == state.table,
        }
    }
}

/// Read view of the manager, held by the vault across check and commit.
pub struct GrantGuard<'a> {
    state: RwLockReadGuard<'a, AuthState>,
}

impl GrantSnapshot for GrantGuard<'_> {
    fn is_authorized(&self, principal: &Principal, role: Role) -> bool {
        self.state.table.is_authorized(principal, role)
    }

    fn version(&self) -> u64 {
        self.state.table.version
    }
}

impl Authorizer for AuthorizationManager {
    type Snapshot<'a> = GrantGuard<'a>;

    fn snapshot(&self) -> GrantGuard<'_> {
        GrantGuard {
            state: self.state.read(),
        }
    }

    fn is_authorized(&self, principal: &Principal, role: Role) -> bool {
        AuthorizationManager::is_authorized(self, principal, role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: &str) -> Principal {
        Principal::new(id)
    }

    fn manager() -> AuthorizationManager {
        AuthorizationManager::new(p("root")).unwrap()
    }

    #[test]
    fn null_bootstrap_admin_rejected() {
        let err = AuthorizationManager::new(p("")).unwrap_err();
        assert!(matches!(err, VaultError::InvalidPrincipal(_)));
    }

    #[test]
    fn starts_empty_with_bootstrap_admin() {
        let auth = manager();
        assert_eq!(auth.admin(), p("root"));
        assert_eq!(auth.version(), 0);
        assert!(auth.events().is_empty());
        assert!(auth.is_authorized(&p("root"), Role::Admin));
        assert!(!auth.is_authorized(&p("root"), Role::Depositor));
    }

    #[test]
    fn grant_bumps_version_and_emits_event() {
        let auth = manager();
        let record = auth
            .grant_role(&p("root"), &p("alice"), Role::Depositor)
            .unwrap()
            .expect("first grant emits");
        assert_eq!(record.sequence, 1);
        assert_eq!(
            record.event,
            LedgerEvent::RoleGranted {
                principal: p("alice"),
                role: Role::Depositor,
                version: 1,
            }
        );
        assert!(auth.is_authorized(&p("alice"), Role::Depositor));
        assert!(!auth.is_authorized(&p("alice"), Role::Withdrawer));
    }

    #[test]
    fn granting_twice_is_a_silent_no_op() {
        let auth = manager();
        auth.grant_role(&p("root"), &p("alice"), Role::Depositor)
            .unwrap();
        let second = auth
            .grant_role(&p("root"), &p("alice"), Role::Depositor)
            .unwrap();
        assert!(second.is_none());
        assert_eq!(auth.version(), 1);
        assert_eq!(auth.events().len(), 1);
    }

    #[test]
    fn revoke_is_idempotent_and_keeps_history() {
        let auth = manager();
        assert!(auth
            .revoke_role(&p("root"), &p("alice"), Role::Withdrawer)
            .unwrap()
            .is_none());

        auth.grant_role(&p("root"), &p("alice"), Role::Withdrawer)
            .unwrap();
        let revoked = auth
            .revoke_role(&p("root"), &p("alice"), Role::Withdrawer)
            .unwrap()
            .unwrap();
        assert_eq!(revoked.sequence, 2);
        assert!(!auth.is_authorized(&p("alice"), Role::Withdrawer));

        let grant = auth.grant_of(&p("alice"), Role::Withdrawer).unwrap();
        assert_eq!(grant.status, GrantStatus::Revoked);
        assert_eq!(grant.version, 2);
    }

    #[test]
    fn non_admin_cannot_grant_or_revoke() {
        let auth = manager();
        let err = auth
            .grant_role(&p("mallory"), &p("mallory"), Role::Withdrawer)
            .unwrap_err();
        assert_eq!(
            err,
            VaultError::NotAdmin {
                caller: "mallory".into()
            }
        );
        assert!(auth
            .revoke_role(&p("mallory"), &p("root"), Role::Admin)
            .is_err());
        assert_eq!(auth.version(), 0);
    }

    #[test]
    fn explicit_admin_grant_does_not_confer_grant_authority() {
        let auth = manager();
        auth.grant_role(&p("root"), &p("ops"), Role::Admin).unwrap();
        assert!(auth.is_authorized(&p("ops"), Role::Admin));
        assert!(matches!(
            auth.grant_role(&p("ops"), &p("alice"), Role::Depositor),
            Err(VaultError::NotAdmin { .. })
        ));
    }

    #[test]
    fn grant_to_null_principal_rejected() {
        let auth = manager();
        let err = auth
            .grant_role(&p("root"), &p("  "), Role::Depositor)
            .unwrap_err();
        assert!(matches!(err, VaultError::InvalidPrincipal(_)));
    }

    #[test]
    fn transfer_admin_swaps_authority_atomically() {
        let auth = manager();
        let record = auth.transfer_admin(&p("root"), &p("successor")).unwrap();
        assert_eq!(
            record.event,
            LedgerEvent::AdminTransferred {
                old_admin: p("root"),
                new_admin: p("successor"),
                version: 1,
            }
        );
        assert_eq!(auth.admin(), p("successor"));
        assert!(!auth.is_authorized(&p("root"), Role::Admin));
        assert!(auth.is_authorized(&p("successor"), Role::Admin));
        assert!(auth
            .grant_role(&p("root"), &p("alice"), Role::Depositor)
            .is_err());
        assert!(auth
            .grant_role(&p("successor"), &p("alice"), Role::Depositor)
            .is_ok());
    }

    #[test]
    fn transfer_admin_to_null_keeps_current_admin() {
        let auth = manager();
        for null in ["", "0x0000000000000000000000000000000000000000"] {
            let err = auth.transfer_admin(&p("root"), &p(null)).unwrap_err();
            assert!(matches!(err, VaultError::InvalidPrincipal(_)));
        }
        assert_eq!(auth.admin(), p("root"));
        assert_eq!(auth.version(), 0);
    }

    #[test]
    fn renounce_drops_own_grant_only() {
        let auth = manager();
        auth.grant_role(&p("root"), &p("alice"), Role::Withdrawer)
            .unwrap();
        let record = auth
            .renounce_role(&p("alice"), Role::Withdrawer)
            .unwrap()
            .unwrap();
        assert_eq!(record.event.name(), "RoleRevoked");
        assert!(!auth.is_authorized(&p("alice"), Role::Withdrawer));

        // The admin's implicit authority is not a grant.
        assert!(auth.renounce_role(&p("root"), Role::Admin).unwrap().is_none());
        assert!(auth.is_authorized(&p("root"), Role::Admin));
    }

    #[test]
    fn roles_of_lists_current_roles() {
        let auth = manager();
        auth.grant_role(&p("root"), &p("alice"), Role::Depositor)
            .unwrap();
        auth.grant_role(&p("root"), &p("alice"), Role::Withdrawer)
            .unwrap();
        auth.revoke_role(&p("root"), &p("alice"), Role::Depositor)
            .unwrap();
        assert_eq!(auth.roles_of(&p("alice")), vec![Role::Withdrawer]);
        assert_eq!(auth.roles_of(&p("root")), vec![Role::Admin]);
    }

    #[test]
    fn snapshot_reflects_version_at_read_time() {
        let auth = manager();
        auth.grant_role(&p("root"), &p("alice"), Role::Depositor)
            .unwrap();
        let snapshot = auth.snapshot();
        assert_eq!(snapshot.version(), 1);
        assert!(snapshot.is_authorized(&p("alice"), Role::Depositor));
    }

    #[test]
    fn audit_replays_history_to_same_table() {
        let auth = manager();
        auth.grant_role(&p("root"), &p("alice"), Role::Depositor)
            .unwrap();
        auth.grant_role(&p("root"), &p("bob"), Role::Withdrawer)
            .unwrap();
        auth.revoke_role(&p("root"), &p("alice"), Role::Depositor)
            .unwrap();
        auth.transfer_admin(&p("root"), &p("successor")).unwrap();
        auth.renounce_role(&p("bob"), Role::Withdrawer).unwrap();

        let audit = auth.audit();
        assert_eq!(audit.events_replayed, 5);
        assert_eq!(audit.replayed_version, 5);
        assert_eq!(audit.live_version, 5);
        assert!(audit.consistent);
    }

    #[test]
    fn events_since_pages_history() {
        let auth = manager();
        for who in ["a", "b", "c", "d"] {
            auth.grant_role(&p("root"), &p(who), Role::Depositor)
                .unwrap();
        }
        let page = auth.events_since(1, 2);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].sequence, 2);
        assert_eq!(page[1].sequence, 3);
    }
}
