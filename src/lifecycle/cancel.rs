//! One-shot broadcast cancellation.
//!
//! Built on a `watch` channel rather than `broadcast`: the fired state is a
//! value, not a message, so an observer created after the fire still sees it.

use std::sync::Arc;

use tokio::sync::watch;

/// Writer side of the cancellation signal.
///
/// Cloning shares the same underlying state; every clone fires the same signal.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl CancellationSignal {
    /// Create a signal in the pending state.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal. Returns `true` only for the call that moved it to fired.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    /// Whether the signal has fired.
    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Create a read-only observer.
    pub fn observe(&self) -> Cancelled {
        Cancelled {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of a [`CancellationSignal`].
#[derive(Debug, Clone)]
pub struct Cancelled {
    rx: watch::Receiver<bool>,
}

impl Cancelled {
    /// Non-blocking check.
    pub fn is_fired(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal has fired, immediately if it already has.
    ///
    /// If every writer is dropped without firing, this never resolves.
    pub async fn fired(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
