//! Cooperative cancellation for a running retrieval.
//!
//! ```
//! use otp_mailbox::cancel::cancel_pair;
//!
//! let (handle, signal) = cancel_pair();
//! assert!(!signal.is_cancelled());
//! handle.cancel();
//! assert!(signal.is_cancelled());
//! ```

use tokio::sync::watch;

/// Creates a connected handle and signal.
#[must_use]
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
}

/// Requests cancellation. Dropping the handle without calling
/// [`cancel`](Self::cancel) does not cancel anything.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancels every signal created from this handle's pair.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observed by the poll loop at each wait.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// Returns `true` once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves when cancellation is requested; pends forever otherwise.
    pub async fn cancelled(&self) {
        if let Some(rx) = &self.rx {
            let mut rx = rx.clone();
            let fired = rx.wait_for(|cancelled| *cancelled).await.is_ok();
            if fired {
                return;
            }
        }
        // Handle dropped without cancelling, or `never()`.
        std::future::pending::<()>().await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::never()
    }
}
