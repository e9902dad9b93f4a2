//! Randomized operation sequences.
//!
//! Drives the vault and the authorization manager with seeded random
//! interleavings of grants, revocations, deposits, withdrawals, recovery
//! withdrawals, and pause toggles, checking after every step that:
//!
//! - balances never go below zero (trivially, `u64`) and match a model;
//! - a request from a principal without the required role is rejected
//!   with `Unauthorized` and changes nothing;
//! - custody is conserved against the event log;
//! - the admin identity is never left unset.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vault_contracts::{AuthorizationManager, ReleaseJournal, SecureVault};
use vault_protocol::{PausePolicy, Principal, Role, VaultError};

const PRINCIPALS: [&str; 4] = ["alice", "bob", "carol", "dave"];
const STEPS: usize = 400;

fn p(id: &str) -> Principal {
    Principal::new(id)
}

/// What the test expects the world to look like.
#[derive(Default)]
struct Model {
    grants: HashSet<(Principal, Role)>,
    balances: BTreeMap<Principal, u64>,
    paused: bool,
    released: u64,
}

impl Model {
    fn holds(&self, who: &Principal, role: Role) -> bool {
        (role == Role::Admin && who.as_str() == "root") || self.grants.contains(&(who.clone(), role))
    }

    fn balance(&self, who: &Principal) -> u64 {
        self.balances.get(who).copied().unwrap_or(0)
    }
}

fn run_sequence(seed: u64, policy: PausePolicy) {
    let mut rng = StdRng::seed_from_u64(seed);
    let root = p("root");
    let auth = Arc::new(AuthorizationManager::new(root.clone()).unwrap());
    let journal = Arc::new(ReleaseJournal::new());
    let vault = SecureVault::new(Arc::clone(&auth), journal.clone(), policy);
    let mut model = Model::default();

    for step in 0..STEPS {
        let who = p(PRINCIPALS[rng.gen_range(0..PRINCIPALS.len())]);
        let role = Role::ALL[rng.gen_range(0..Role::ALL.len())];
        let amount = rng.gen_range(0..60u64);
        let before = vault.accounts();

        match rng.gen_range(0..7) {
            0 => {
                auth.grant_role(&root, &who, role).unwrap();
                model.grants.insert((who, role));
            }
            1 => {
                auth.revoke_role(&root, &who, role).unwrap();
                model.grants.remove(&(who, role));
            }
            2 => {
                let result = vault.deposit(&who, amount);
                if !model.holds(&who, Role::Depositor) {
                    assert!(matches!(result, Err(VaultError::Unauthorized { .. })), "step {step}");
                    assert_eq!(vault.accounts(), before, "step {step}");
                } else if model.paused {
                    assert_eq!(result, Err(VaultError::Paused), "step {step}");
                } else if amount == 0 {
                    assert_eq!(result, Err(VaultError::InvalidAmount(0)), "step {step}");
                } else {
                    result.unwrap();
                    *model.balances.entry(who).or_insert(0) += amount;
                }
            }
            3 => {
                let result = vault.withdraw(&who, amount);
                let balance = model.balance(&who);
                if !model.holds(&who, Role::Withdrawer) {
                    assert!(matches!(result, Err(VaultError::Unauthorized { .. })), "step {step}");
                    assert_eq!(vault.accounts(), before, "step {step}");
                } else if model.paused {
                    assert_eq!(result, Err(VaultError::Paused), "step {step}");
                } else if amount == 0 {
                    assert_eq!(result, Err(VaultError::InvalidAmount(0)), "step {step}");
                } else if amount > balance {
                    assert!(matches!(result, Err(VaultError::InsufficientBalance { .. })));
                } else {
                    result.unwrap();
                    model.balances.insert(who, balance - amount);
                    model.released += amount;
                }
            }
            4 => {
                // Occasionally let a non-admin try, too.
                let caller = if rng.gen_bool(0.7) { root.clone() } else { who.clone() };
                let result = vault.admin_withdraw(&caller, &who, amount);
                let balance = model.balance(&who);
                if !model.holds(&caller, Role::Admin) {
                    assert!(matches!(result, Err(VaultError::Unauthorized { .. })), "step {step}");
                } else if model.paused && !policy.permits_recovery_while_paused() {
                    assert_eq!(result, Err(VaultError::Paused), "step {step}");
                } else if amount == 0 {
                    assert_eq!(result, Err(VaultError::InvalidAmount(0)), "step {step}");
                } else if amount > balance {
                    assert!(matches!(result, Err(VaultError::InsufficientBalance { .. })));
                } else {
                    result.unwrap();
                    model.balances.insert(who, balance - amount);
                    model.released += amount;
                }
            }
            5 => {
                vault.pause(&root).unwrap();
                model.paused = true;
            }
            _ => {
                vault.unpause(&root).unwrap();
                model.paused = false;
            }
        }

        // Rejected or committed, the books must agree with the model.
        for name in PRINCIPALS {
            let who = p(name);
            assert_eq!(vault.balance_of(&who), model.balance(&who), "step {step} {name}");
        }
        assert_eq!(vault.is_paused(), model.paused);
        assert_eq!(journal.total_released(), model.released);
        assert!(!auth.admin().is_null());
    }

    let audit = vault.audit();
    assert!(audit.conserved, "seed {seed}: {audit:?}");
    assert!(audit.accounts_consistent, "seed {seed}: {audit:?}");
    assert_eq!(
        audit.total_deposited - audit.total_withdrawn,
        vault.total_balance()
    );
    assert!(auth.audit().consistent, "seed {seed}");
}

#[test]
fn random_sequences_preserve_invariants() {
    for seed in 0..16 {
        run_sequence(seed, PausePolicy::AllowAdminRecovery);
    }
}

#[test]
fn random_sequences_preserve_invariants_under_halt_all() {
    for seed in 100..116 {
        run_sequence(seed, PausePolicy::HaltAll);
    }
}
