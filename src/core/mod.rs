pub mod cancel;
pub mod error;

pub use cancel::{CancelCause, CancelCriterion, CancelListener, CancellationSignal};
pub use error::{GridError, Result};
