// ============================================================================
// Transaction Completion State
// ============================================================================
//
// Identifiers and state enums shared by the completion synchronizer and the
// completion manager. A completion handshake moves through:
//
//   Created -> RunningBefore -> WaitingForSecondPhase -> RunningAfter -> Done
//                                         |
//                                         +--abort / cancel--------------> Done
//
// ============================================================================

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a distributed transaction being completed on this member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Outcome the transaction manager decided for a transaction, handed to the
/// after-completion action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionStatus {
    Committed,
    RolledBack,
}

impl CompletionStatus {
    pub fn is_committed(&self) -> bool {
        matches!(self, CompletionStatus::Committed)
    }
}

/// Phase of a completion handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Created, worker not started yet
    Created,

    /// Worker is executing the before-completion action
    RunningBefore,

    /// Before-completion finished; worker is parked until hand-off, abort or cancel
    WaitingForSecondPhase,

    /// Worker is executing the handed-off after-completion action
    RunningAfter,

    /// Worker has returned
    Done,
}

impl SyncPhase {
    /// True once the before-completion action can no longer be pending.
    pub fn first_phase_completed(&self) -> bool {
        matches!(
            self,
            SyncPhase::WaitingForSecondPhase | SyncPhase::RunningAfter | SyncPhase::Done
        )
    }
}

/// How the worker side of a handshake finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstPhaseOutcome {
    /// The after-completion action was handed off and ran on the worker thread
    Completed,

    /// The handshake was aborted before any after-completion action was accepted
    Aborted,

    /// The member started shutting down; no after-completion action ran
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_ids_are_unique_and_increasing() {
        let a = TransactionId::new();
        let b = TransactionId::new();
        assert!(b > a);
        assert_eq!(format!("{}", TransactionId(7)), "txn_7");
    }

    #[test]
    fn first_phase_completion_by_phase() {
        assert!(!SyncPhase::Created.first_phase_completed());
        assert!(!SyncPhase::RunningBefore.first_phase_completed());
        assert!(SyncPhase::WaitingForSecondPhase.first_phase_completed());
        assert!(SyncPhase::RunningAfter.first_phase_completed());
        assert!(SyncPhase::Done.first_phase_completed());
    }
}
