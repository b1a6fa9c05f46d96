//! Caller-side cancellation of logical requests.

use std::sync::Arc;

use tokio::sync::watch;

/// A handle that cancels every request it is passed to.
///
/// Clones share the same state, so one clone can be handed to the request
/// while another is kept to trigger cancellation.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    /// Creates a handle in the not-cancelled state.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Cancels all requests observing this handle.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Returns true once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Returns a future-producing signal for this handle.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.rx.clone(),
        }
    }
}

/// Completes when the owning [`CancelHandle`] is cancelled.
#[derive(Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Waits for cancellation.
    ///
    /// Never completes if every handle is dropped without cancelling.
    pub async fn wait(mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
