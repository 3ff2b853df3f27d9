use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Create a single-use readiness barrier
///
/// The capture side raises the [`ReadySignal`] when its read loop starts;
/// the relay side awaits the [`ReadyWait`] before binding its listener.
/// Both halves are consumed by value, so each is used at most once.
pub fn readiness_barrier() -> (ReadySignal, ReadyWait) {
    let (tx, rx) = oneshot::channel();
    (ReadySignal { tx }, ReadyWait { rx })
}

/// Raising half of a readiness barrier
#[derive(Debug)]
pub struct ReadySignal {
    tx: oneshot::Sender<()>,
}

impl ReadySignal {
    pub fn signal(self) {
        // The waiter may already be gone when its session was torn down
        let _ = self.tx.send(());
    }
}

/// Waiting half of a readiness barrier
#[derive(Debug)]
pub struct ReadyWait {
    rx: oneshot::Receiver<()>,
}

impl ReadyWait {
    /// Wait until the signal is raised
    pub async fn wait(self) -> Result<()> {
        self.rx.await.map_err(|_| Error::BarrierBroken)
    }

    /// Wait at most `timeout`; `None` when the deadline passes first
    pub async fn wait_timeout(self, timeout: Duration) -> Option<Result<()>> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }
}
