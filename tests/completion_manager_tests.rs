use gridcore::{
    CancelCause, CancellationSignal, CompletionManager, CompletionStatus, FirstPhaseOutcome,
    GridError, TransactionId,
};
use std::sync::{Arc, Mutex};
use std::thread;

type ThreadLog = Arc<Mutex<Vec<(String, Option<String>)>>>;

fn record(log: &ThreadLog, event: &str) {
    log.lock().unwrap().push((
        event.to_string(),
        thread::current().name().map(str::to_string),
    ));
}

#[test]
fn completion_runs_both_actions_on_named_worker() {
    let manager = CompletionManager::with_worker_prefix(CancellationSignal::new(), "sync");
    let txn = TransactionId::new();
    let log: ThreadLog = Arc::default();

    let before_log = Arc::clone(&log);
    manager
        .begin_completion(txn, move || record(&before_log, "before"))
        .unwrap();
    assert!(manager.is_pending(txn).unwrap());
    assert_eq!(log.lock().unwrap().len(), 1);

    let after_log = Arc::clone(&log);
    let seen_status = Arc::new(Mutex::new(None));
    let status_slot = Arc::clone(&seen_status);
    let outcome = manager
        .finish_completion(txn, CompletionStatus::Committed, move |status| {
            *status_slot.lock().unwrap() = Some(status);
            record(&after_log, "after");
        })
        .unwrap();

    assert_eq!(outcome, FirstPhaseOutcome::Completed);
    assert_eq!(*seen_status.lock().unwrap(), Some(CompletionStatus::Committed));
    assert_eq!(manager.pending_count().unwrap(), 0);

    let expected_thread = Some(format!("sync-{}", txn));
    let log = log.lock().unwrap();
    assert_eq!(
        *log,
        vec![
            ("before".to_string(), expected_thread.clone()),
            ("after".to_string(), expected_thread),
        ]
    );
}

#[test]
fn duplicate_begin_is_rejected() {
    let manager = CompletionManager::new(CancellationSignal::new());
    let txn = TransactionId::new();
    manager.begin_completion(txn, || {}).unwrap();

    let err = manager.begin_completion(txn, || {}).unwrap_err();
    assert!(matches!(err, GridError::InvalidState(_)));

    assert_eq!(
        manager
            .finish_completion(txn, CompletionStatus::RolledBack, |status| {
                assert!(!status.is_committed());
            })
            .unwrap(),
        FirstPhaseOutcome::Completed
    );
}

#[test]
fn abandon_releases_worker_without_after_action() {
    let manager = CompletionManager::new(CancellationSignal::new());
    let txn = TransactionId::new();
    manager.begin_completion(txn, || {}).unwrap();

    assert_eq!(
        manager.abandon(txn).unwrap(),
        Some(FirstPhaseOutcome::Aborted)
    );
    assert!(!manager.is_pending(txn).unwrap());

    let err = manager
        .finish_completion(txn, CompletionStatus::Committed, |_| {
            panic!("after-completion must not run for an abandoned transaction")
        })
        .unwrap_err();
    assert!(matches!(err, GridError::InvalidState(_)));
}

#[test]
fn shutdown_releases_every_parked_worker() {
    let manager = CompletionManager::new(CancellationSignal::new());
    let txns = (0..3).map(|_| TransactionId::new()).collect::<Vec<_>>();
    for txn in &txns {
        manager.begin_completion(*txn, || {}).unwrap();
    }
    assert_eq!(manager.pending_count().unwrap(), 3);

    let cause = CancelCause::cache_closed("m1");
    assert_eq!(manager.shutdown(cause.clone()).unwrap(), 3);
    assert_eq!(manager.pending_count().unwrap(), 0);

    let err = manager
        .begin_completion(TransactionId::new(), || {})
        .unwrap_err();
    assert!(err.cancel_cause().unwrap().same_cause(&cause));
}

#[test]
fn concurrent_transactions_complete_independently() {
    let manager = Arc::new(CompletionManager::new(CancellationSignal::new()));
    let handles = (0..8)
        .map(|i| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                let txn = TransactionId::new();
                manager.begin_completion(txn, || {})?;
                let status = if i % 2 == 0 {
                    CompletionStatus::Committed
                } else {
                    CompletionStatus::RolledBack
                };
                manager.finish_completion(txn, status, |_| {})
            })
        })
        .collect::<Vec<_>>();

    for handle in handles {
        assert_eq!(
            handle.join().unwrap().unwrap(),
            FirstPhaseOutcome::Completed
        );
    }
    assert_eq!(manager.pending_count().unwrap(), 0);
}

#[test]
fn panicking_before_action_fails_begin_and_clears_entry() {
    let manager = CompletionManager::new(CancellationSignal::new());
    let txn = TransactionId::new();

    let err = manager
        .begin_completion(txn, || panic!("boom"))
        .unwrap_err();
    assert!(matches!(&err, GridError::ExecutionError(msg) if msg.contains("boom")));
    assert!(!manager.is_pending(txn).unwrap());
    assert_eq!(manager.pending_count().unwrap(), 0);

    // The id is free again once the failed attempt is cleaned up.
    manager.begin_completion(txn, || {}).unwrap();
    assert_eq!(
        manager
            .finish_completion(txn, CompletionStatus::Committed, |_| {})
            .unwrap(),
        FirstPhaseOutcome::Completed
    );
}
