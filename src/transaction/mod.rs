// ============================================================================
// Transaction Completion Module
// ============================================================================
//
// Coordinates the completion of distributed transactions on a member:
// a before-completion action and an after-completion action that must run
// on one dedicated worker thread, handed off between threads, with abort and
// member-shutdown escape hatches.
//
// ============================================================================

pub mod manager;
pub mod state;
pub mod synchronizer;

pub use manager::CompletionManager;
pub use state::{CompletionStatus, FirstPhaseOutcome, SyncPhase, TransactionId};
pub use synchronizer::{CompletionAction, CompletionSynchronizer};
