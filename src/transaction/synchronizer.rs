// ============================================================================
// Completion Synchronizer
// ============================================================================
//
// Two-phase rendezvous between a dedicated worker thread and the transaction
// coordinator. The worker runs the before-completion action, then parks until
// the coordinator hands it the after-completion action, which must run on the
// same thread because transactional thread-local state is attached to it.
//
// One mutex guards the handshake state. Two condition variables are signalled
// from under that mutex: `first_phase_done` when the before action finished,
// `second_phase_ready` when an after action was supplied or the handshake was
// aborted. A cancel trip wakes both through the `CancelListener` hook, which
// also takes the mutex, so a waiter can never miss the trip between its check
// and its wait.
//
// A panicking action never strands the other side: the panic is caught, the
// handshake moves to `Done` with the failure recorded, and coordinators get
// an error instead of waiting forever.
//
// ============================================================================

use super::state::{FirstPhaseOutcome, SyncPhase};
use crate::core::{CancelCriterion, CancelListener, GridError, Result};
use log::{debug, warn};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// Boxed action executed by the worker thread.
pub type CompletionAction = Box<dyn FnOnce() + Send + 'static>;

/// Hands a transaction's after-completion action to the thread that ran its
/// before-completion action.
///
/// Clones share one handshake: the worker thread holds one clone and the
/// coordinator another.
#[derive(Clone)]
pub struct CompletionSynchronizer {
    shared: Arc<SyncShared>,
}

struct SyncShared {
    state: Mutex<SyncState>,
    first_phase_done: Condvar,
    second_phase_ready: Condvar,
    criterion: Arc<dyn CancelCriterion>,
}

struct SyncState {
    phase: SyncPhase,
    before: Option<CompletionAction>,
    after: Option<CompletionAction>,
    second_phase_supplied: bool,
    aborted: bool,
    /// Set when the before action panicked.
    before_failure: Option<String>,
}

impl SyncShared {
    fn lock(&self) -> Result<MutexGuard<'_, SyncState>> {
        Ok(self.state.lock()?)
    }

    /// Blocks until the before action has completed, failing fast on cancellation.
    fn await_first_phase<'a>(
        &'a self,
        mut state: MutexGuard<'a, SyncState>,
    ) -> Result<MutexGuard<'a, SyncState>> {
        loop {
            self.criterion.check_cancel_in_progress()?;
            if let Some(failure) = &state.before_failure {
                return Err(GridError::ExecutionError(failure.clone()));
            }
            if state.phase.first_phase_completed() {
                return Ok(state);
            }
            state = self.first_phase_done.wait(state)?;
        }
    }
}

impl CancelListener for SyncShared {
    fn on_cancel(&self) {
        // Taking the lock orders this wakeup after any in-progress check-then-wait.
        let _state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.first_phase_done.notify_all();
        self.second_phase_ready.notify_all();
    }
}

impl CompletionSynchronizer {
    /// Creates a handshake for one transaction completion.
    pub fn new<F>(criterion: Arc<dyn CancelCriterion>, before: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = Arc::new(SyncShared {
            state: Mutex::new(SyncState {
                phase: SyncPhase::Created,
                before: Some(Box::new(before)),
                after: None,
                second_phase_supplied: false,
                aborted: false,
                before_failure: None,
            }),
            first_phase_done: Condvar::new(),
            second_phase_ready: Condvar::new(),
            criterion,
        });
        let listener: Arc<dyn CancelListener> = shared.clone();
        shared.criterion.register_listener(Arc::downgrade(&listener));
        Self { shared }
    }

    /// Current phase of the handshake.
    pub fn phase(&self) -> Result<SyncPhase> {
        Ok(self.shared.lock()?.phase)
    }

    /// Worker side. Runs the before action, then waits for the hand-off and runs
    /// the after action on this same thread.
    ///
    /// Returns once the after action ran, the handshake was aborted, or the
    /// member started shutting down. May be called only once. A panic in
    /// either action is caught and returned as `ExecutionError`.
    pub fn run_first_phase(&self) -> Result<FirstPhaseOutcome> {
        let before = {
            let mut state = self.shared.lock()?;
            if state.phase != SyncPhase::Created {
                return Err(GridError::InvalidState(format!(
                    "first phase already started (phase {:?})",
                    state.phase
                )));
            }
            if let Some(cause) = self.shared.criterion.cancel_in_progress() {
                debug!("completion cancelled before first phase: {}", cause);
                state.phase = SyncPhase::Done;
                state.before = None;
                self.shared.first_phase_done.notify_all();
                return Ok(FirstPhaseOutcome::Cancelled);
            }
            state.phase = SyncPhase::RunningBefore;
            state.before.take()
        };

        let before_result = match before {
            Some(before) => panic::catch_unwind(AssertUnwindSafe(before)),
            None => Ok(()),
        };

        let mut state = self.shared.lock()?;
        if let Err(payload) = before_result {
            let failure = format!(
                "before-completion action panicked: {}",
                panic_message(payload.as_ref())
            );
            warn!("{}", failure);
            state.phase = SyncPhase::Done;
            state.before_failure = Some(failure.clone());
            self.shared.first_phase_done.notify_all();
            return Err(GridError::ExecutionError(failure));
        }
        state.phase = SyncPhase::WaitingForSecondPhase;
        self.shared.first_phase_done.notify_all();

        loop {
            // An accepted hand-off wins over a later abort.
            if let Some(after) = state.after.take() {
                state.phase = SyncPhase::RunningAfter;
                drop(state);

                let after_result = panic::catch_unwind(AssertUnwindSafe(after));

                self.shared.lock()?.phase = SyncPhase::Done;
                return match after_result {
                    Ok(()) => Ok(FirstPhaseOutcome::Completed),
                    Err(payload) => {
                        let failure = format!(
                            "after-completion action panicked: {}",
                            panic_message(payload.as_ref())
                        );
                        warn!("{}", failure);
                        Err(GridError::ExecutionError(failure))
                    }
                };
            }
            if state.aborted {
                state.phase = SyncPhase::Done;
                debug!("completion aborted; skipping after-completion");
                return Ok(FirstPhaseOutcome::Aborted);
            }
            if let Some(cause) = self.shared.criterion.cancel_in_progress() {
                state.phase = SyncPhase::Done;
                debug!("completion cancelled while waiting for second phase: {}", cause);
                return Ok(FirstPhaseOutcome::Cancelled);
            }
            state = self.shared.second_phase_ready.wait(state)?;
        }
    }

    /// Blocks until the before action has completed.
    ///
    /// Fails immediately with the criterion's own cause if cancellation is or
    /// becomes active, whether or not the worker ever started.
    pub fn wait_for_first_phase(&self) -> Result<()> {
        let state = self.shared.lock()?;
        self.shared.await_first_phase(state).map(drop)
    }

    /// Coordinator side. Waits for the before action, then hands `after` to the
    /// parked worker. Returns as soon as the worker can pick it up; does not
    /// wait for `after` to run.
    pub fn supply_second_phase<F>(&self, after: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let state = self.shared.lock()?;
        let mut state = self.shared.await_first_phase(state)?;

        let rejection = if state.second_phase_supplied {
            Some("second phase was already supplied")
        } else if state.aborted {
            Some("completion was aborted")
        } else if state.phase == SyncPhase::Done {
            Some("completion worker has already finished")
        } else {
            None
        };
        if let Some(reason) = rejection {
            warn!("rejecting after-completion hand-off: {}", reason);
            return Err(GridError::InvalidState(reason.to_string()));
        }

        state.second_phase_supplied = true;
        state.after = Some(Box::new(after));
        self.shared.second_phase_ready.notify_all();
        Ok(())
    }

    /// Marks the handshake aborted. A worker that has not picked up an after
    /// action yet returns without running one. Has no effect on an after action
    /// that was already accepted.
    pub fn abort(&self) -> Result<()> {
        let mut state = self.shared.lock()?;
        if !state.aborted {
            state.aborted = true;
            self.shared.second_phase_ready.notify_all();
        }
        Ok(())
    }

    /// Starts a dedicated named thread running [`Self::run_first_phase`].
    pub fn spawn(
        &self,
        thread_name: impl Into<String>,
    ) -> Result<JoinHandle<Result<FirstPhaseOutcome>>> {
        let worker = self.clone();
        thread::Builder::new()
            .name(thread_name.into())
            .spawn(move || worker.run_first_phase())
            .map_err(|err| {
                GridError::ExecutionError(format!("failed to spawn completion worker: {}", err))
            })
    }
}

fn panic_message<'a>(payload: &'a (dyn Any + Send + 'static)) -> &'a str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

impl fmt::Debug for CompletionSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("CompletionSynchronizer");
        match self.shared.state.try_lock() {
            Ok(state) => out
                .field("phase", &state.phase)
                .field("aborted", &state.aborted)
                .finish(),
            Err(_) => out.finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CancellationSignal;

    #[test]
    fn phase_advances_through_handshake() {
        let signal = CancellationSignal::new();
        let sync = CompletionSynchronizer::new(Arc::new(signal), || {});
        assert_eq!(sync.phase().unwrap(), SyncPhase::Created);

        let worker = sync.spawn("phase-test").unwrap();
        sync.wait_for_first_phase().unwrap();
        assert!(sync.phase().unwrap().first_phase_completed());

        sync.supply_second_phase(|| {}).unwrap();
        assert_eq!(worker.join().unwrap().unwrap(), FirstPhaseOutcome::Completed);
        assert_eq!(sync.phase().unwrap(), SyncPhase::Done);
    }

    #[test]
    fn run_first_phase_twice_is_rejected() {
        let sync = CompletionSynchronizer::new(Arc::new(CancellationSignal::new()), || {});
        sync.abort().unwrap();
        assert_eq!(sync.run_first_phase().unwrap(), FirstPhaseOutcome::Aborted);
        assert!(matches!(
            sync.run_first_phase(),
            Err(GridError::InvalidState(_))
        ));
    }

    #[test]
    fn abort_is_idempotent() {
        let sync = CompletionSynchronizer::new(Arc::new(CancellationSignal::new()), || {});
        sync.abort().unwrap();
        sync.abort().unwrap();
        assert_eq!(sync.run_first_phase().unwrap(), FirstPhaseOutcome::Aborted);
    }

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let literal: Box<dyn Any + Send> = Box::new("boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("bang"));
        let other: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(literal.as_ref()), "boom");
        assert_eq!(panic_message(owned.as_ref()), "bang");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
