//! Per-request lifecycle tracking.
//!
//! ```text
//! Idle ─▶ Checking ─┬─▶ Rejected
//!                   └─▶ Authorized ─▶ Committing ─┬─▶ Committed
//!                                                 └─▶ Faulted
//! ```
//!
//! Terminal phases are never left. A request that reaches one is done;
//! nothing inside the vault retries it.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;
use vault_protocol::VaultError;

/// The vault operations, for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Deposit,
    Withdraw,
    AdminWithdraw,
    Pause,
    Unpause,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Deposit => "deposit",
            OperationKind::Withdraw => "withdraw",
            OperationKind::AdminWithdraw => "admin_withdraw",
            OperationKind::Pause => "pause",
            OperationKind::Unpause => "unpause",
        }
    }
}

/// Where a single request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationPhase {
    Idle,
    Checking,
    Authorized,
    Rejected,
    Committing,
    Committed,
    Faulted,
}

impl OperationPhase {
    /// `true` for phases a request never leaves.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationPhase::Rejected | OperationPhase::Committed | OperationPhase::Faulted
        )
    }

    /// Whether `self → next` is an edge of the lifecycle graph.
    pub fn can_advance_to(self, next: OperationPhase) -> bool {
        use OperationPhase::*;
        matches!(
            (self, next),
            (Idle, Checking)
                | (Checking, Authorized)
                | (Checking, Rejected)
                | (Authorized, Committing)
                | (Committing, Committed)
                | (Committing, Faulted)
        )
    }
}

/// Lifecycle tracker for one request.
#[derive(Debug)]
pub(crate) struct Operation {
    id: Uuid,
    kind: OperationKind,
    phase: OperationPhase,
}

impl Operation {
    pub(crate) fn begin(kind: OperationKind) -> Self {
        let mut op = Self {
            id: Uuid::new_v4(),
            kind,
            phase: OperationPhase::Idle,
        };
        op.advance(OperationPhase::Checking);
        op
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn phase(&self) -> OperationPhase {
        self.phase
    }

    pub(crate) fn advance(&mut self, next: OperationPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.phase,
            next
        );
        debug!(op = %self.id, kind = self.kind.as_str(), from = ?self.phase, to = ?next, "operation phase");
        self.phase = next;
    }

    /// Ends the request with `err`: `Rejected` before the commit started,
    /// `Faulted` after.
    pub(crate) fn fail(&mut self, err: VaultError) -> VaultError {
        let terminal = match self.phase {
            OperationPhase::Committing => OperationPhase::Faulted,
            _ => OperationPhase::Rejected,
        };
        self.advance(terminal);
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_phases_have_no_exits() {
        use OperationPhase::*;
        let all = [
            Idle, Checking, Authorized, Rejected, Committing, Committed, Faulted,
        ];
        for from in all.into_iter().filter(|p| p.is_terminal()) {
            for to in all {
                assert!(!from.can_advance_to(to), "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn happy_path_is_linear() {
        let mut op = Operation::begin(OperationKind::Withdraw);
        assert_eq!(op.phase(), OperationPhase::Checking);
        op.advance(OperationPhase::Authorized);
        op.advance(OperationPhase::Committing);
        op.advance(OperationPhase::Committed);
        assert!(op.phase().is_terminal());
    }

    #[test]
    fn failure_before_commit_is_rejection() {
        let mut op = Operation::begin(OperationKind::Deposit);
        let err = op.fail(VaultError::Paused);
        assert_eq!(err, VaultError::Paused);
        assert_eq!(op.phase(), OperationPhase::Rejected);
    }

    #[test]
    fn failure_during_commit_is_fault() {
        let mut op = Operation::begin(OperationKind::Withdraw);
        op.advance(OperationPhase::Authorized);
        op.advance(OperationPhase::Committing);
        op.fail(VaultError::ReentrantCall);
        assert_eq!(op.phase(), OperationPhase::Faulted);
    }

    #[test]
    fn skipping_authorization_is_illegal() {
        assert!(!OperationPhase::Checking.can_advance_to(OperationPhase::Committing));
        assert!(!OperationPhase::Idle.can_advance_to(OperationPhase::Committed));
    }
}
