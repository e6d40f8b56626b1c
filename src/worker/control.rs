//! Pause switch and the cooperative checkpoint.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Per-character pause switch. Cloning shares the switch.
#[derive(Debug, Clone)]
pub struct PauseControl {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for PauseControl {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn pause(&self) {
        self.tx.send_replace(true);
    }

    pub fn resume(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Checkpoint between remote actions.
///
/// Returns `false` when `token` is cancelled. While paused, waits for resume
/// (or cancellation) without polling, then re-checks cancellation.
pub async fn checkpoint(token: &CancellationToken, pause: &PauseControl) -> bool {
    if token.is_cancelled() {
        return false;
    }
    let mut rx = pause.subscribe();
    tokio::select! {
        _ = token.cancelled() => return false,
        res = rx.wait_for(|paused| !*paused) => {
            // Sender lives in `pause`, so the channel cannot close here.
            if res.is_err() {
                return false;
            }
        }
    }
    !token.is_cancelled()
}
