// src/storage/scheduler.rs

use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

use super::{Capacity, CapacityBackend, LocalDrive, ensure_capacity};
use crate::error::{CapacityError, QueueError};

/// Pending on-demand cleanup requests kept before new ones are dropped.
pub const CLEAN_SIGNAL_CAPACITY: usize = 16;

/// Producer side of the on-demand cleanup signal.
#[derive(Clone)]
pub struct CleanupHandle {
    tx: mpsc::Sender<usize>,
}

impl CleanupHandle {
    /// Requests a cleanup walking `depth` levels. Returns `Ok(false)` when
    /// the signal queue is full and the request was dropped; cleanup is
    /// best-effort and the periodic pass still runs.
    pub fn request(&self, depth: usize) -> Result<bool, QueueError> {
        match self.tx.try_send(depth) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                warn!("[cleanup] signal queue full; dropping request (depth {})", depth);
                Ok(false)
            }
            Err(TrySendError::Closed(_)) => Err(QueueError::Closed { queue: "cleanup" }),
        }
    }
}

/// Keeps `reserved` bytes free on the local drive, on a fixed interval and
/// whenever a cleanup is requested.
pub struct CleanupScheduler {
    drive: LocalDrive,
    interval: Duration,
    reserved: Capacity,
}

impl CleanupScheduler {
    pub fn new(drive: LocalDrive, interval: Duration, reserved: Capacity) -> Self {
        Self {
            drive,
            interval,
            reserved,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> (CleanupHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(CLEAN_SIGNAL_CAPACITY);
        let handle = tokio::spawn(self.run(rx, cancel));
        (CleanupHandle { tx }, handle)
    }

    async fn run(self, mut signals: mpsc::Receiver<usize>, cancel: CancellationToken) {
        info!(
            "[cleanup] watching {} every {:?}, reserving {} bytes",
            self.drive.root().display(),
            self.interval,
            self.reserved
        );

        let timer = sleep(self.interval);
        tokio::pin!(timer);
        let mut signals_open = true;

        loop {
            let depth = tokio::select! {
                _ = cancel.cancelled() => break,
                () = &mut timer => None,
                signal = signals.recv(), if signals_open => match signal {
                    Some(depth) => Some(depth),
                    None => {
                        debug!("[cleanup] all signal senders dropped; timer only");
                        signals_open = false;
                        continue;
                    }
                },
            };

            // a signal preempts the pending tick; either way the next tick
            // is a full interval away
            timer.as_mut().reset(Instant::now() + self.interval);

            if let Err(e) = self.clean(depth, &cancel).await {
                error!("[cleanup] error ensuring local storage capacity: {}", e);
            }
        }

        info!("[cleanup] stopped");
    }

    /// One cleanup pass, bounded by the scheduling interval.
    pub async fn clean(
        &self,
        depth: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<(), CapacityError> {
        let drive = match depth {
            Some(depth) => self.drive.at_depth(depth),
            None => self.drive.clone(),
        };
        debug!("[cleanup] pass at depth {}", drive.depth());

        let pass = cancel.child_token();
        tokio::select! {
            res = ensure_capacity(&pass, self.reserved, &drive) => res,
            _ = sleep(self.interval) => {
                pass.cancel();
                Err(CapacityError::TimedOut {
                    backend: drive.name(),
                    after: self.interval,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_signal_queue_drops_request() {
        let (tx, _rx) = mpsc::channel(CLEAN_SIGNAL_CAPACITY);
        let handle = CleanupHandle { tx };

        for depth in 0..CLEAN_SIGNAL_CAPACITY {
            assert!(handle.request(depth).expect("queued"));
        }
        assert!(!handle.request(2).expect("dropped, not failed"));
    }

    #[tokio::test]
    async fn test_closed_signal_queue_is_an_error() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = CleanupHandle { tx };

        assert!(matches!(
            handle.request(1),
            Err(QueueError::Closed { queue: "cleanup" })
        ));
    }
}
