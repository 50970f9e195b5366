//! Cooperative stop signal shared by a run and its spawned tasks.
//!
//! A run holds the [`StopHandle`]; environments and experiments receive
//! [`StopSignal`] clones and check them at fan-in collection points. Decision
//! tasks that are already in flight are not interrupted; their results are
//! discarded along with the aborted round.

use tokio::sync::watch;

/// Create a linked stop handle/signal pair.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

/// Owner side: requests that the run stop.
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    /// Request a stop. Idempotent.
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }

    /// Derive another signal observing this handle.
    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observer side: answers "should we keep going?".
///
/// Dropping the last [`StopHandle`] counts as a stop, so orphaned tasks wind
/// down instead of waiting forever.
#[derive(Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// Resolve once a stop has been requested (or the handle is gone).
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Non-blocking check.
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }
}
