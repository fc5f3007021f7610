//! Client-wide cancellation.

use tokio::sync::watch;

/// Coordinator for cancelling everything a client has in flight.
///
/// Backed by a watch channel so a signal taken after [`Shutdown::trigger`]
/// still observes the cancellation.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a new, untriggered coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Subscribe to the cancellation signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger cancellation. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether cancellation has been triggered.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's view of the cancellation state.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once cancellation is triggered or the coordinator is dropped.
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}
