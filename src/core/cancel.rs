// ============================================================================
// Member Cancellation
// ============================================================================
//
// A member that is shutting down trips its cancellation signal once. Every
// blocking coordination primitive consults the signal before and while it
// waits, and registers as a listener so a trip wakes it without polling.
//
// ============================================================================

use super::error::{GridError, Result};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

/// The reason a member stopped accepting coordination work.
///
/// Clones share one identity: an error raised from a tripped criterion carries
/// the very cause the signal was tripped with, so callers can match on it with
/// [`CancelCause::same_cause`].
#[derive(Clone)]
pub struct CancelCause {
    inner: Arc<CancelCauseInner>,
}

struct CancelCauseInner {
    reason: String,
}

impl CancelCause {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(CancelCauseInner {
                reason: reason.into(),
            }),
        }
    }

    /// The usual cause when the local cache is closed underneath a transaction.
    pub fn cache_closed(member: &str) -> Self {
        Self::new(format!("cache on member '{}' has been closed", member))
    }

    pub fn reason(&self) -> &str {
        &self.inner.reason
    }

    /// True when both values originate from the same trip.
    pub fn same_cause(&self, other: &CancelCause) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CancelCause").field(&self.inner.reason).finish()
    }
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.reason)
    }
}

/// Woken when the criterion it is registered with trips.
pub trait CancelListener: Send + Sync {
    fn on_cancel(&self);
}

/// Source of cancellation consulted at every suspension point.
pub trait CancelCriterion: Send + Sync {
    /// Returns the cause when cancellation is in progress.
    fn cancel_in_progress(&self) -> Option<CancelCause>;

    /// Registers a listener to be woken on trip. Dead listeners are dropped lazily.
    fn register_listener(&self, listener: Weak<dyn CancelListener>);

    /// Fails with the registered cause when cancellation is in progress.
    fn check_cancel_in_progress(&self) -> Result<()> {
        match self.cancel_in_progress() {
            Some(cause) => Err(GridError::Cancelled(cause)),
            None => Ok(()),
        }
    }
}

/// Member-shutdown signal. Cheap to clone; clones observe the same trip.
#[derive(Clone, Default)]
pub struct CancellationSignal {
    inner: Arc<SignalInner>,
}

#[derive(Default)]
struct SignalInner {
    cause: OnceLock<CancelCause>,
    listeners: Mutex<Vec<Weak<dyn CancelListener>>>,
}

impl SignalInner {
    fn listeners(&self) -> MutexGuard<'_, Vec<Weak<dyn CancelListener>>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the signal and wakes every live listener.
    ///
    /// Only the first trip registers its cause; returns false if the signal had
    /// already tripped.
    pub fn trip(&self, cause: CancelCause) -> bool {
        if self.inner.cause.set(cause).is_err() {
            return false;
        }
        tracing::event!(
            tracing::Level::WARN,
            reason = %self.inner.cause.get().map(CancelCause::reason).unwrap_or_default(),
            "cancellation signal tripped"
        );

        let live = {
            let mut listeners = self.inner.listeners();
            listeners.retain(|listener| listener.strong_count() > 0);
            listeners
                .iter()
                .filter_map(Weak::upgrade)
                .collect::<Vec<_>>()
        };
        for listener in live {
            listener.on_cancel();
        }
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cause.get().is_some()
    }

    pub fn cause(&self) -> Option<CancelCause> {
        self.inner.cause.get().cloned()
    }
}

impl CancelCriterion for CancellationSignal {
    fn cancel_in_progress(&self) -> Option<CancelCause> {
        self.cause()
    }

    fn register_listener(&self, listener: Weak<dyn CancelListener>) {
        let mut listeners = self.inner.listeners();
        listeners.retain(|existing| existing.strong_count() > 0);
        listeners.push(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener {
        wakeups: AtomicUsize,
    }

    impl CancelListener for CountingListener {
        fn on_cancel(&self) {
            self.wakeups.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn check_passes_until_tripped() {
        let signal = CancellationSignal::new();
        assert!(signal.check_cancel_in_progress().is_ok());
        assert!(!signal.is_cancelled());

        let cause = CancelCause::cache_closed("m1");
        assert!(signal.trip(cause.clone()));

        let err = signal.check_cancel_in_progress().unwrap_err();
        assert!(err.cancel_cause().unwrap().same_cause(&cause));
    }

    #[test]
    fn first_trip_wins() {
        let signal = CancellationSignal::new();
        let first = CancelCause::new("first");
        let second = CancelCause::new("second");

        assert!(signal.trip(first.clone()));
        assert!(!signal.trip(second.clone()));

        let cause = signal.cause().unwrap();
        assert!(cause.same_cause(&first));
        assert!(!cause.same_cause(&second));
    }

    #[test]
    fn clones_with_equal_reason_are_distinct_causes() {
        let a = CancelCause::new("closed");
        let b = CancelCause::new("closed");
        assert!(a.same_cause(&a.clone()));
        assert!(!a.same_cause(&b));
    }

    #[test]
    fn trip_wakes_live_listeners_only_once() {
        let signal = CancellationSignal::new();
        let listener = Arc::new(CountingListener {
            wakeups: AtomicUsize::new(0),
        });
        let weak: Weak<dyn CancelListener> = Arc::downgrade(&listener) as Weak<dyn CancelListener>;
        signal.register_listener(weak);

        let dropped = Arc::new(CountingListener {
            wakeups: AtomicUsize::new(0),
        });
        signal.register_listener(Arc::downgrade(&dropped) as Weak<dyn CancelListener>);
        drop(dropped);

        signal.trip(CancelCause::new("shutdown"));
        signal.trip(CancelCause::new("again"));
        assert_eq!(listener.wakeups.load(Ordering::SeqCst), 1);
    }
}
