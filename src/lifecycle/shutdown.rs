//! Shutdown sentinel.

use tokio::sync::broadcast;

/// Sends a single content-free sentinel to wake blocked waiters.
///
/// Receivers are created with [`subscribe`](Self::subscribe) before the
/// sentinel is sent; a sentinel sent before the receiver is polled is kept
/// until it is read. Dropping the `Shutdown` closes every receiver.
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new sentinel pair sender.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Create a receiving end.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Send the sentinel.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
