//! # Secure Vault
//!
//! Custody of per-principal balances, gated on every state change by an
//! [`Authorizer`]. The vault never decides permissions itself and never
//! caches a decision: each request takes a fresh grant snapshot and holds
//! it until its ledger commit is done.
//!
//! ## Commit Protocol
//!
//! 1. **Enter** — claim the operation lock. A call arriving on the same
//!    thread while another operation is in flight is re-entry: it fails
//!    with [`VaultError::ReentrantCall`] and poisons the outer operation.
//! 2. **Check** — snapshot grants, lock the ledger, validate everything.
//! 3. **Commit** — write the new balance while still holding both.
//! 4. **Release** (withdrawals only) — drop the snapshot and ledger lock,
//!    then pay out through the [`ReleaseHandler`]. The ledger already shows
//!    the debit, so a callback sees the post-withdrawal balance.
//! 5. **Finalize** — append the event. If the release failed or anything
//!    re-entered during it, restore the debit instead and fault.
//!
//! A request is either fully committed with one event, or leaves balances
//! and history exactly as they were.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use vault_protocol::{
    EventLog, EventRecord, LedgerEvent, PausePolicy, Principal, Role, VaultError, VaultResult,
};

use crate::authorizer::{Authorizer, GrantSnapshot};
use crate::operation::{Operation, OperationKind, OperationPhase};
use crate::release::{ReleaseError, ReleaseHandler};

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Idle,
    InFlight,
    /// Something re-entered while in flight.
    Tripped,
}

/// Held for the whole life of an operation, release included.
struct EntryGuard<'a> {
    lock: ReentrantMutexGuard<'a, Cell<EntryState>>,
}

impl EntryGuard<'_> {
    fn tripped(&self) -> bool {
        self.lock.get() == EntryState::Tripped
    }
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        self.lock.set(EntryState::Idle);
    }
}

#[derive(Debug, Default)]
struct Ledger {
    balances: BTreeMap<Principal, u64>,
    paused: bool,
    events: EventLog,
}

impl Ledger {
    fn balance(&self, principal: &Principal) -> u64 {
        self.balances.get(principal).copied().unwrap_or(0)
    }
}

/// Outcome of replaying the vault history against live balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyAudit {
    /// Number of events replayed.
    pub events_replayed: usize,
    /// Sum of all `Deposited` amounts.
    pub total_deposited: u128,
    /// Sum of all `Withdrawn` and `AdminWithdrawn` amounts.
    pub total_withdrawn: u128,
    /// Sum of live balances.
    pub total_balance: u128,
    /// `total_balance == total_deposited - total_withdrawn`.
    pub conserved: bool,
    /// Every account's replayed balance equals its live balance, and every
    /// event's `new_balance` matched the replay at that point.
    pub accounts_consistent: bool,
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

fn authorize<S: GrantSnapshot>(grants: &S, caller: &Principal, role: Role) -> VaultResult<()> {
    caller.ensure_not_null()?;
    if !grants.is_authorized(caller, role) {
        return Err(VaultError::Unauthorized {
            principal: caller.to_string(),
            role,
        });
    }
    Ok(())
}

fn ensure_amount(amount: u64) -> VaultResult<()> {
    if amount == 0 {
        return Err(VaultError::InvalidAmount(amount));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SecureVault
// ---------------------------------------------------------------------------

/// Authorization-gated custody of balances.
pub struct SecureVault<A: Authorizer> {
    authorizer: Arc<A>,
    releaser: Arc<dyn ReleaseHandler>,
    pause_policy: PausePolicy,
    entry: ReentrantMutex<Cell<EntryState>>,
    ledger: Mutex<Ledger>,
}

impl<A: Authorizer> SecureVault<A> {
    /// Creates an empty, unpaused vault bound to an existing authorizer.
    pub fn new(
        authorizer: Arc<A>,
        releaser: Arc<dyn ReleaseHandler>,
        pause_policy: PausePolicy,
    ) -> Self {
        info!(%pause_policy, "secure vault initialized");
        Self {
            authorizer,
            releaser,
            pause_policy,
            entry: ReentrantMutex::new(Cell::new(EntryState::Idle)),
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Credits `amount` to the caller's account.
    ///
    /// # Errors
    ///
    /// [`VaultError::Unauthorized`] without a `Depositor` grant,
    /// [`VaultError::Paused`] while paused, [`VaultError::InvalidAmount`]
    /// for zero, [`VaultError::BalanceOverflow`] if the credit would wrap.
    pub fn deposit(&self, caller: &Principal, amount: u64) -> VaultResult<EventRecord> {
        let mut op = Operation::begin(OperationKind::Deposit);
        let _entry = self.enter(&mut op)?;

        let grants = self.authorizer.snapshot();
        let mut ledger = self.ledger.lock();

        let current = ledger.balance(caller);
        let checked = authorize(&grants, caller, Role::Depositor)
            .and_then(|()| self.ensure_running(&ledger, OperationKind::Deposit))
            .and_then(|()| ensure_amount(amount))
            .and_then(|()| {
                current
                    .checked_add(amount)
                    .ok_or(VaultError::BalanceOverflow {
                        current,
                        credit: amount,
                    })
            });
        let new_balance = match checked {
            Ok(balance) => balance,
            Err(err) => return Err(self.reject(&mut op, caller, err)),
        };

        op.advance(OperationPhase::Authorized);
        op.advance(OperationPhase::Committing);
        ledger.balances.insert(caller.clone(), new_balance);
        let record = ledger.events.append(LedgerEvent::Deposited {
            principal: caller.clone(),
            amount,
            new_balance,
        });
        op.advance(OperationPhase::Committed);

        info!(op = %op.id(), principal = %caller, amount, new_balance, grants_version = grants.version(), "deposit committed");
        Ok(record)
    }

    /// Debits `amount` from the caller's account and releases it to the caller.
    ///
    /// # Errors
    ///
    /// [`VaultError::Unauthorized`] without a `Withdrawer` grant,
    /// [`VaultError::Paused`], [`VaultError::InvalidAmount`],
    /// [`VaultError::InsufficientBalance`]; faults with
    /// [`VaultError::ReentrantCall`] or [`VaultError::ReleaseFailed`] after
    /// rolling the debit back.
    pub fn withdraw(&self, caller: &Principal, amount: u64) -> VaultResult<EventRecord> {
        self.debit_and_release(OperationKind::Withdraw, caller, caller, amount)
    }

    /// Recovery path: debits `amount` from `principal` and releases it to
    /// the admin `caller`. Whether it runs while paused depends on the
    /// vault's [`PausePolicy`].
    ///
    /// # Errors
    ///
    /// As [`withdraw`](Self::withdraw), with the `Admin` role required and
    /// [`VaultError::InvalidPrincipal`] for a null `principal`.
    pub fn admin_withdraw(
        &self,
        caller: &Principal,
        principal: &Principal,
        amount: u64,
    ) -> VaultResult<EventRecord> {
        self.debit_and_release(OperationKind::AdminWithdraw, caller, principal, amount)
    }

    /// Halts deposits and withdrawals. `Ok(None)` if already paused.
    pub fn pause(&self, caller: &Principal) -> VaultResult<Option<EventRecord>> {
        self.set_paused(caller, true)
    }

    /// Resumes normal operation. `Ok(None)` if not paused.
    pub fn unpause(&self, caller: &Principal) -> VaultResult<Option<EventRecord>> {
        self.set_paused(caller, false)
    }

    // -- queries -------------------------------------------------------------

    pub fn balance_of(&self, principal: &Principal) -> u64 {
        self.settled(|ledger| ledger.balance(principal))
    }

    pub fn is_paused(&self) -> bool {
        self.settled(|ledger| ledger.paused)
    }

    pub fn pause_policy(&self) -> PausePolicy {
        self.pause_policy
    }

    /// Sum of all balances.
    pub fn total_balance(&self) -> u128 {
        self.settled(|ledger| ledger.balances.values().map(|b| u128::from(*b)).sum())
    }

    /// Every account that has ever held funds, with its current balance.
    pub fn accounts(&self) -> BTreeMap<Principal, u64> {
        self.settled(|ledger| ledger.balances.clone())
    }

    pub fn events(&self) -> Vec<EventRecord> {
        self.settled(|ledger| ledger.events.records().to_vec())
    }

    /// History after `sequence`, capped at `limit` records.
    pub fn events_since(&self, sequence: u64, limit: usize) -> Vec<EventRecord> {
        self.settled(|ledger| {
            ledger
                .events
                .since(sequence)
                .iter()
                .take(limit)
                .cloned()
                .collect()
        })
    }

    /// The authorizer this vault consults.
    pub fn authorizer(&self) -> &Arc<A> {
        &self.authorizer
    }

    /// Replays the event log and checks conservation of custody.
    pub fn audit(&self) -> CustodyAudit {
        let _entry = self.entry.lock();
        let ledger = self.ledger.lock();
        let mut replayed: BTreeMap<&Principal, u128> = BTreeMap::new();
        let mut total_deposited = 0u128;
        let mut total_withdrawn = 0u128;
        let mut steps_consistent = true;

        for record in ledger.events.records() {
            let (credited, debited) = record.event.custody_delta();
            total_deposited += u128::from(credited);
            total_withdrawn += u128::from(debited);

            let (account, new_balance) = match &record.event {
                LedgerEvent::Deposited {
                    principal,
                    new_balance,
                    ..
                }
                | LedgerEvent::Withdrawn {
                    principal,
                    new_balance,
                    ..
                }
                | LedgerEvent::AdminWithdrawn {
                    principal,
                    new_balance,
                    ..
                } => (principal, *new_balance),
                _ => continue,
            };
            let entry = replayed.entry(account).or_insert(0);
            *entry = (*entry + u128::from(credited)).saturating_sub(u128::from(debited));
            steps_consistent &= *entry == u128::from(new_balance);
        }

        let total_balance: u128 = ledger.balances.values().map(|b| u128::from(*b)).sum();
        let accounts_consistent = steps_consistent
            && ledger
                .balances
                .iter()
                .all(|(p, b)| replayed.get(p).copied().unwrap_or(0) == u128::from(*b))
            && replayed
                .iter()
                .all(|(p, b)| u128::from(ledger.balance(p)) == *b);

        CustodyAudit {
            events_replayed: ledger.events.len(),
            total_deposited,
            total_withdrawn,
            total_balance,
            conserved: total_deposited.checked_sub(total_withdrawn) == Some(total_balance),
            accounts_consistent,
        }
    }

    // -- internals -----------------------------------------------------------

    /// Reads the ledger between operations. Another thread waits out any
    /// operation in flight, release included; the releasing thread itself
    /// gets straight in and sees its own debit.
    fn settled<R>(&self, read: impl FnOnce(&Ledger) -> R) -> R {
        let _entry = self.entry.lock();
        let ledger = self.ledger.lock();
        read(&ledger)
    }

    fn enter(&self, op: &mut Operation) -> VaultResult<EntryGuard<'_>> {
        let lock = self.entry.lock();
        if lock.get() != EntryState::Idle {
            lock.set(EntryState::Tripped);
            error!(op = %op.id(), "re-entrant call detected");
            return Err(op.fail(VaultError::ReentrantCall));
        }
        lock.set(EntryState::InFlight);
        Ok(EntryGuard { lock })
    }

    fn ensure_running(&self, ledger: &Ledger, kind: OperationKind) -> VaultResult<()> {
        if !ledger.paused {
            return Ok(());
        }
        match kind {
            OperationKind::AdminWithdraw if self.pause_policy.permits_recovery_while_paused() => {
                Ok(())
            }
            _ => Err(VaultError::Paused),
        }
    }

    fn reject(&self, op: &mut Operation, caller: &Principal, err: VaultError) -> VaultError {
        warn!(op = %op.id(), %caller, kind = err.kind(), error = %err, "operation rejected");
        op.fail(err)
    }

    fn debit_and_release(
        &self,
        kind: OperationKind,
        caller: &Principal,
        account: &Principal,
        amount: u64,
    ) -> VaultResult<EventRecord> {
        let role = match kind {
            OperationKind::AdminWithdraw => Role::Admin,
            _ => Role::Withdrawer,
        };
        let mut op = Operation::begin(kind);
        let entry = self.enter(&mut op)?;

        // Check and commit the debit while holding the grant snapshot.
        let previous = {
            let grants = self.authorizer.snapshot();
            let mut ledger = self.ledger.lock();
            let previous = ledger.balance(account);
            let checked = authorize(&grants, caller, role)
                .and_then(|()| account.ensure_not_null())
                .and_then(|()| self.ensure_running(&ledger, kind))
                .and_then(|()| ensure_amount(amount))
                .and_then(|()| {
                    previous
                        .checked_sub(amount)
                        .ok_or(VaultError::InsufficientBalance {
                            available: previous,
                            requested: amount,
                        })
                });
            let new_balance = match checked {
                Ok(balance) => balance,
                Err(err) => return Err(self.reject(&mut op, caller, err)),
            };

            op.advance(OperationPhase::Authorized);
            op.advance(OperationPhase::Committing);
            ledger.balances.insert(account.clone(), new_balance);
            previous
        };
        let new_balance = previous - amount;

        // External effect, with no ledger or grant lock held.
        let released = self.releaser.release(caller, amount);

        let mut ledger = self.ledger.lock();
        let fault = if entry.tripped() {
            Some(VaultError::ReentrantCall)
        } else {
            match released {
                Ok(()) => None,
                Err(ReleaseError::Vault(err)) if err == VaultError::ReentrantCall => Some(err),
                Err(err) => Some(VaultError::ReleaseFailed(err.to_string())),
            }
        };
        if let Some(err) = fault {
            ledger.balances.insert(account.clone(), previous);
            error!(op = %op.id(), %caller, %account, amount, error = %err, "release faulted, debit rolled back");
            return Err(op.fail(err));
        }

        let event = match kind {
            OperationKind::AdminWithdraw => LedgerEvent::AdminWithdrawn {
                admin: caller.clone(),
                principal: account.clone(),
                amount,
                new_balance,
            },
            _ => LedgerEvent::Withdrawn {
                principal: account.clone(),
                amount,
                new_balance,
            },
        };
        let record = ledger.events.append(event);
        op.advance(OperationPhase::Committed);

        info!(op = %op.id(), kind = kind.as_str(), %caller, %account, amount, new_balance, "withdrawal committed");
        Ok(record)
    }

    fn set_paused(&self, caller: &Principal, paused: bool) -> VaultResult<Option<EventRecord>> {
        let kind = if paused {
            OperationKind::Pause
        } else {
            OperationKind::Unpause
        };
        let mut op = Operation::begin(kind);
        let _entry = self.enter(&mut op)?;

        let grants = self.authorizer.snapshot();
        let mut ledger = self.ledger.lock();
        if let Err(err) = authorize(&grants, caller, Role::Admin) {
            return Err(self.reject(&mut op, caller, err));
        }

        op.advance(OperationPhase::Authorized);
        op.advance(OperationPhase::Committing);
        let record = if ledger.paused == paused {
            None
        } else {
            ledger.paused = paused;
            let by = caller.clone();
            Some(ledger.events.append(if paused {
                LedgerEvent::Paused { by }
            } else {
                LedgerEvent::Unpaused { by }
            }))
        };
        op.advance(OperationPhase::Committed);
        debug_assert!(op.phase().is_terminal());

        info!(op = %op.id(), %caller, paused, changed = record.is_some(), "pause state committed");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization_manager::AuthorizationManager;
    use crate::release::ReleaseJournal;

    fn p(id: &str) -> Principal {
        Principal::new(id)
    }

    fn setup(policy: PausePolicy) -> (Arc<AuthorizationManager>, Arc<ReleaseJournal>, SecureVault<AuthorizationManager>) {
        let auth = Arc::new(AuthorizationManager::new(p("root")).unwrap());
        let journal = Arc::new(ReleaseJournal::new());
        let vault = SecureVault::new(Arc::clone(&auth), journal.clone(), policy);
        (auth, journal, vault)
    }

    fn grant(auth: &AuthorizationManager, who: &str, role: Role) {
        auth.grant_role(&p("root"), &p(who), role).unwrap();
    }

    #[test]
    fn deposit_credits_and_emits_event() {
        let (auth, _, vault) = setup(PausePolicy::default());
        grant(&auth, "alice", Role::Depositor);

        let record = vault.deposit(&p("alice"), 100).unwrap();
        assert_eq!(record.sequence, 1);
        assert_eq!(
            record.event,
            LedgerEvent::Deposited {
                principal: p("alice"),
                amount: 100,
                new_balance: 100,
            }
        );
        assert_eq!(vault.balance_of(&p("alice")), 100);
    }

    #[test]
    fn zero_amount_rejected() {
        let (auth, _, vault) = setup(PausePolicy::default());
        grant(&auth, "alice", Role::Depositor);
        assert_eq!(
            vault.deposit(&p("alice"), 0).unwrap_err(),
            VaultError::InvalidAmount(0)
        );
        assert!(vault.events().is_empty());
    }

    #[test]
    fn deposit_overflow_rejected() {
        let (auth, _, vault) = setup(PausePolicy::default());
        grant(&auth, "alice", Role::Depositor);
        vault.deposit(&p("alice"), u64::MAX).unwrap();
        let err = vault.deposit(&p("alice"), 1).unwrap_err();
        assert!(matches!(err, VaultError::BalanceOverflow { .. }));
        assert_eq!(vault.balance_of(&p("alice")), u64::MAX);
    }

    #[test]
    fn withdraw_debits_then_releases() {
        let (auth, journal, vault) = setup(PausePolicy::default());
        grant(&auth, "alice", Role::Depositor);
        grant(&auth, "alice", Role::Withdrawer);
        vault.deposit(&p("alice"), 100).unwrap();

        let record = vault.withdraw(&p("alice"), 30).unwrap();
        assert_eq!(
            record.event,
            LedgerEvent::Withdrawn {
                principal: p("alice"),
                amount: 30,
                new_balance: 70,
            }
        );
        assert_eq!(vault.balance_of(&p("alice")), 70);
        assert_eq!(journal.total_released(), 30);
        assert_eq!(journal.payouts()[0].recipient, p("alice"));
    }

    #[test]
    fn pause_and_unpause_are_admin_only_and_idempotent() {
        let (_, _, vault) = setup(PausePolicy::default());
        assert!(matches!(
            vault.pause(&p("alice")),
            Err(VaultError::Unauthorized { role: Role::Admin, .. })
        ));

        assert!(vault.pause(&p("root")).unwrap().is_some());
        assert!(vault.is_paused());
        assert!(vault.pause(&p("root")).unwrap().is_none());
        assert!(vault.unpause(&p("root")).unwrap().is_some());
        assert!(vault.unpause(&p("root")).unwrap().is_none());
        assert!(!vault.is_paused());
        assert_eq!(vault.events().len(), 2);
    }

    #[test]
    fn admin_withdraw_releases_to_admin() {
        let (auth, journal, vault) = setup(PausePolicy::default());
        grant(&auth, "alice", Role::Depositor);
        vault.deposit(&p("alice"), 50).unwrap();

        let record = vault.admin_withdraw(&p("root"), &p("alice"), 20).unwrap();
        assert_eq!(
            record.event,
            LedgerEvent::AdminWithdrawn {
                admin: p("root"),
                principal: p("alice"),
                amount: 20,
                new_balance: 30,
            }
        );
        assert_eq!(journal.payouts()[0].recipient, p("root"));
    }

    #[test]
    fn admin_withdraw_from_null_principal_rejected() {
        let (_, _, vault) = setup(PausePolicy::default());
        let err = vault.admin_withdraw(&p("root"), &p(""), 1).unwrap_err();
        assert!(matches!(err, VaultError::InvalidPrincipal(_)));
    }

    #[test]
    fn audit_of_fresh_vault_is_clean() {
        let (_, _, vault) = setup(PausePolicy::default());
        let audit = vault.audit();
        assert_eq!(audit.events_replayed, 0);
        assert!(audit.conserved);
        assert!(audit.accounts_consistent);
    }
}
