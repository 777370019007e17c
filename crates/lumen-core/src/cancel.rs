//! Cooperative cancellation for generation jobs.
//!
//! Generation runs on the blocking pool and cannot be aborted from outside.
//! When the orchestrator's deadline expires it cancels the job's token; the
//! job observes it between model stages and stops without producing output.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cancellation token shared between the orchestrator and a generation job.
///
/// # Example
///
/// ```
/// use lumen_core::cancel::CancellationToken;
///
/// let token = CancellationToken::new();
/// let job_token = token.clone();
///
/// token.cancel();
/// assert!(job_token.is_cancelled());
/// assert!(job_token.check().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new cancellation token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Return an error if cancelled, for use between pipeline stages.
    pub fn check(&self) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            Err(CancelledError)
        } else {
            Ok(())
        }
    }
}

/// Error returned when a job observes cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelledError;

impl std::fmt::Display for CancelledError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Generation was cancelled")
    }
}

impl std::error::Error for CancelledError {}
