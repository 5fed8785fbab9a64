// ============================================================================
// Completion Manager
// ============================================================================
//
// Member-side bookkeeping for transactions whose completion is driven by a
// remote coordinator: the before-completion request parks a dedicated worker
// thread, and the later after-completion request (or an abandon) finds the
// same worker by transaction id.
//
// ============================================================================

use super::state::{CompletionStatus, FirstPhaseOutcome, TransactionId};
use super::synchronizer::CompletionSynchronizer;
use crate::core::{CancelCause, CancelCriterion, CancellationSignal, GridError, Result};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

const DEFAULT_WORKER_PREFIX: &str = "tx-completion";

struct PendingCompletion {
    synchronizer: CompletionSynchronizer,
    worker: JoinHandle<Result<FirstPhaseOutcome>>,
}

impl PendingCompletion {
    fn join(self) -> Result<FirstPhaseOutcome> {
        self.worker.join().map_err(|_| {
            GridError::ExecutionError("completion worker thread panicked".to_string())
        })?
    }
}

pub struct CompletionManager {
    signal: CancellationSignal,
    pending: Mutex<HashMap<TransactionId, PendingCompletion>>,
    worker_prefix: String,
}

impl CompletionManager {
    pub fn new(signal: CancellationSignal) -> Self {
        Self::with_worker_prefix(signal, DEFAULT_WORKER_PREFIX)
    }

    pub fn with_worker_prefix(signal: CancellationSignal, worker_prefix: impl Into<String>) -> Self {
        Self {
            signal,
            pending: Mutex::new(HashMap::new()),
            worker_prefix: worker_prefix.into(),
        }
    }

    /// The member shutdown signal every handshake of this manager observes.
    pub fn signal(&self) -> &CancellationSignal {
        &self.signal
    }

    /// Starts the completion of `txn_id`: runs `before` on a fresh worker thread
    /// and returns once it has finished.
    pub fn begin_completion<F>(&self, txn_id: TransactionId, before: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.signal.check_cancel_in_progress()?;

        let synchronizer = {
            let mut pending = self.pending.lock()?;
            if pending.contains_key(&txn_id) {
                return Err(GridError::InvalidState(format!(
                    "completion of {} is already in progress",
                    txn_id
                )));
            }
            let synchronizer = CompletionSynchronizer::new(Arc::new(self.signal.clone()), before);
            let worker = synchronizer.spawn(format!("{}-{}", self.worker_prefix, txn_id))?;
            pending.insert(
                txn_id,
                PendingCompletion {
                    synchronizer: synchronizer.clone(),
                    worker,
                },
            );
            synchronizer
        };

        if let Err(err) = synchronizer.wait_for_first_phase() {
            debug!("before-completion of {} interrupted: {}", txn_id, err);
            if let Some(entry) = self.take(txn_id)? {
                entry.synchronizer.abort()?;
                if let Err(worker_err) = entry.join() {
                    warn!("completion worker for {} failed: {}", txn_id, worker_err);
                }
            }
            return Err(err);
        }
        Ok(())
    }

    /// Hands `after` to the worker of `txn_id` and waits for the worker to return.
    pub fn finish_completion<F>(
        &self,
        txn_id: TransactionId,
        status: CompletionStatus,
        after: F,
    ) -> Result<FirstPhaseOutcome>
    where
        F: FnOnce(CompletionStatus) + Send + 'static,
    {
        let entry = self.take(txn_id)?.ok_or_else(|| {
            GridError::InvalidState(format!("no completion in progress for {}", txn_id))
        })?;

        if let Err(err) = entry.synchronizer.supply_second_phase(move || after(status)) {
            entry.synchronizer.abort()?;
            entry.join()?;
            return Err(err);
        }
        entry.join()
    }

    /// Releases the worker of `txn_id` without running any after-completion.
    ///
    /// Returns `None` when no completion was in progress for the transaction.
    pub fn abandon(&self, txn_id: TransactionId) -> Result<Option<FirstPhaseOutcome>> {
        let Some(entry) = self.take(txn_id)? else {
            return Ok(None);
        };
        warn!("abandoning completion of {}", txn_id);
        entry.synchronizer.abort()?;
        entry.join().map(Some)
    }

    pub fn pending_count(&self) -> Result<usize> {
        Ok(self.pending.lock()?.len())
    }

    pub fn is_pending(&self, txn_id: TransactionId) -> Result<bool> {
        Ok(self.pending.lock()?.contains_key(&txn_id))
    }

    /// Trips the member shutdown signal and joins every parked worker.
    ///
    /// Returns the number of workers that were still pending.
    pub fn shutdown(&self, cause: CancelCause) -> Result<usize> {
        self.signal.trip(cause);
        let drained = {
            let mut pending = self.pending.lock()?;
            pending.drain().collect::<Vec<_>>()
        };
        let count = drained.len();
        for (txn_id, entry) in drained {
            match entry.join() {
                Ok(outcome) => debug!("completion worker for {} exited: {:?}", txn_id, outcome),
                Err(err) => warn!("completion worker for {} failed during shutdown: {}", txn_id, err),
            }
        }
        Ok(count)
    }

    fn take(&self, txn_id: TransactionId) -> Result<Option<PendingCompletion>> {
        Ok(self.pending.lock()?.remove(&txn_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_without_begin_is_rejected() {
        let manager = CompletionManager::new(CancellationSignal::new());
        let err = manager
            .finish_completion(TransactionId::new(), CompletionStatus::Committed, |_| {})
            .unwrap_err();
        assert!(matches!(err, GridError::InvalidState(_)));
    }

    #[test]
    fn abandon_unknown_transaction_is_none() {
        let manager = CompletionManager::new(CancellationSignal::new());
        assert_eq!(manager.abandon(TransactionId::new()).unwrap(), None);
    }

    #[test]
    fn begin_after_shutdown_fails_with_shutdown_cause() {
        let manager = CompletionManager::new(CancellationSignal::new());
        let cause = CancelCause::cache_closed("m1");
        assert_eq!(manager.shutdown(cause.clone()).unwrap(), 0);

        let err = manager
            .begin_completion(TransactionId::new(), || {})
            .unwrap_err();
        assert!(err.cancel_cause().unwrap().same_cause(&cause));
        assert_eq!(manager.pending_count().unwrap(), 0);
    }
}
