//! Pause gate for the spill path.

use tokio::sync::watch;

/// Re-openable broadcast latch, open by default.
///
/// The dispatcher checks the gate when the output buffer is full: open means
/// items may be routed to disk, closed forces backpressure onto the producer.
/// Closing the gate never stops the drainer; already-spilled items continue
/// to flow out.
#[derive(Debug)]
pub(crate) struct PauseGate {
    state: watch::Sender<bool>,
}

impl PauseGate {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(true);
        Self { state }
    }

    /// Close the gate. Idempotent.
    pub(crate) fn close(&self) {
        self.state.send_replace(false);
    }

    /// Open the gate, releasing any waiter. Idempotent.
    pub(crate) fn open(&self) {
        self.state.send_replace(true);
    }

    #[cfg(test)]
    pub(crate) fn is_open(&self) -> bool {
        *self.state.borrow()
    }

    /// Completes once the gate is open; immediately if it already is.
    pub(crate) async fn wait_open(&self) {
        let mut rx = self.state.subscribe();
        // the sender lives as long as self, so this cannot fail
        let _ = rx.wait_for(|open| *open).await;
    }
}
