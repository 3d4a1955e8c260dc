// src/storage/mod.rs

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

pub mod engine;
pub mod local;
pub mod remote;
pub mod scheduler;

pub use engine::{ALLOWED_ITERATIONS, deduct, ensure_capacity};
pub use local::{DEFAULT_TRAVERSE_DEPTH, FileEntry, LocalDrive};
pub use remote::RemoteDrive;
pub use scheduler::{CLEAN_SIGNAL_CAPACITY, CleanupHandle, CleanupScheduler};

/// Byte count. Subtraction is always saturating or pre-checked.
pub type Capacity = u64;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

pub fn format_gib(bytes: Capacity) -> String {
    format!("{:.3} GB", bytes as f64 / GIB as f64)
}

type RemoveFuture = Pin<Box<dyn Future<Output = anyhow::Result<Capacity>> + Send>>;

/// One deletable unit of storage. Invoking [`Removal::remove`] is the only
/// way to learn the bytes actually freed.
pub struct Removal {
    label: String,
    occupied: Capacity,
    action: Box<dyn FnOnce() -> RemoveFuture + Send>,
}

impl Removal {
    pub fn new<F, Fut>(label: impl Into<String>, occupied: Capacity, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Capacity>> + Send + 'static,
    {
        Self {
            label: label.into(),
            occupied,
            action: Box::new(move || Box::pin(action())),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Size recorded when the item was listed; may be stale.
    pub fn occupied(&self) -> Capacity {
        self.occupied
    }

    pub async fn remove(self) -> anyhow::Result<Capacity> {
        (self.action)().await
    }
}

impl std::fmt::Debug for Removal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Removal")
            .field("label", &self.label)
            .field("occupied", &self.occupied)
            .finish()
    }
}

/// Lazy oldest-first sequence of removals. Dropping the receiver or
/// cancelling the producer's token stops the listing.
pub type RemovableStream = mpsc::Receiver<Removal>;

/// Capability interface shared by every storage backend.
#[async_trait]
pub trait CapacityBackend: Send + Sync {
    fn name(&self) -> String;

    async fn available_capacity(&self) -> anyhow::Result<Capacity>;

    /// Produces removals ordered oldest-first. The producer must stop as
    /// soon as `cancel` fires.
    async fn removables(&self, cancel: CancellationToken) -> anyhow::Result<RemovableStream>;

    /// Exclusive lease held for the whole duration of an `ensure_capacity`
    /// call. Backends without one may be evicted concurrently.
    fn eviction_lease(&self) -> Option<&Mutex<()>> {
        None
    }
}

/// Streams `items` one at a time; every send also observes `cancel` so an
/// abandoned consumer never blocks the producer.
pub fn stream_removals(
    source: &'static str,
    items: Vec<Removal>,
    cancel: CancellationToken,
) -> RemovableStream {
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        for item in items {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::debug!("[{}] removable listing cancelled", source);
                    return;
                }
                sent = tx.send(item) => {
                    if sent.is_err() {
                        log::debug!("[{}] removable consumer gone", source);
                        return;
                    }
                }
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_gib() {
        assert_eq!(format_gib(GIB + GIB / 2), "1.500 GB");
        assert_eq!(format_gib(0), "0.000 GB");
    }

    #[tokio::test]
    async fn test_stream_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let items = (0..10)
            .map(|i| Removal::new(format!("item-{i}"), i, move || async move { Ok(i) }))
            .collect();

        let mut stream = stream_removals("test", items, cancel.clone());
        let first = stream.recv().await.expect("first item");
        assert_eq!(first.label(), "item-0");

        cancel.cancel();
        // at most the item already buffered in the channel may still arrive
        let mut rest = 0;
        while stream.recv().await.is_some() {
            rest += 1;
        }
        assert!(rest <= 1, "received {} items after cancel", rest);
    }
}
