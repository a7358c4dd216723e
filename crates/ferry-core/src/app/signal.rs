//! Termination signal - poll loop が止まったことを 1 回だけ通知する
//!
//! `TerminationNotifier::notify` は self を消費するので 2 回目は書けません。
//! 通知せずに notifier が drop された場合（task の panic など）、
//! waiter は `SignalError::Lost` を受け取ります。

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

use crate::domain::StopReason;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("poll loop ended without signalling termination")]
    Lost,
}

/// Create a connected notifier/waiter pair.
pub fn termination_signal() -> (TerminationNotifier, TerminationWaiter) {
    let (tx, rx) = oneshot::channel();
    (TerminationNotifier { tx }, TerminationWaiter { rx })
}

#[derive(Debug)]
pub struct TerminationNotifier {
    tx: oneshot::Sender<StopReason>,
}

impl TerminationNotifier {
    pub fn notify(self, reason: StopReason) {
        if self.tx.send(reason).is_err() {
            debug!(%reason, "termination waiter already gone");
        }
    }
}

#[derive(Debug)]
pub struct TerminationWaiter {
    rx: oneshot::Receiver<StopReason>,
}

impl TerminationWaiter {
    /// Block until the loop reports why it stopped.
    pub async fn wait(self) -> Result<StopReason, SignalError> {
        self.rx.await.map_err(|_| SignalError::Lost)
    }
}
