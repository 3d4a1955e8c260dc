// src/storage/remote.rs

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use log::debug;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{Capacity, CapacityBackend, RemovableStream, Removal, stream_removals};
use crate::drive::{RemoteObject, RemoteStore};

/// Page size used when listing eviction candidates.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Folder on the remote quota store that recordings are uploaded into.
#[derive(Clone)]
pub struct RemoteDrive {
    store: Arc<dyn RemoteStore>,
    parent: String,
    page_size: usize,
    lease: Arc<Mutex<()>>,
}

impl RemoteDrive {
    pub fn new(store: Arc<dyn RemoteStore>, parent: impl Into<String>) -> Self {
        Self {
            store,
            parent: parent.into(),
            page_size: DEFAULT_PAGE_SIZE,
            lease: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    fn removal_for(&self, object: RemoteObject, cancel: CancellationToken) -> Removal {
        let store = self.store.clone();
        let label = format!("{} ({})", object.name, object.id);

        Removal::new(label, object.size, move || async move {
            debug!(
                "[drive] deleting {} ({}), {} bytes",
                object.name, object.id, object.size
            );
            tokio::select! {
                res = store.delete_object(&object.id) => res?,
                _ = cancel.cancelled() => return Err(anyhow!("delete of {} cancelled", object.id)),
            }
            Ok(object.size)
        })
    }
}

#[async_trait]
impl CapacityBackend for RemoteDrive {
    fn name(&self) -> String {
        format!("drive:{}", self.parent)
    }

    async fn available_capacity(&self) -> anyhow::Result<Capacity> {
        let quota = self.store.quota().await?;
        Ok(quota.available())
    }

    async fn removables(&self, cancel: CancellationToken) -> anyhow::Result<RemovableStream> {
        let objects = tokio::select! {
            res = self.store.list_oldest(&self.parent, self.page_size) => res?,
            _ = cancel.cancelled() => return Err(anyhow!("listing of {} cancelled", self.parent)),
        };

        let removals = objects
            .into_iter()
            .filter(|object| {
                if object.is_folder() {
                    debug!("[drive] skipping folder {} ({})", object.name, object.id);
                    return false;
                }
                true
            })
            .map(|object| self.removal_for(object, cancel.clone()))
            .collect();

        Ok(stream_removals("drive", removals, cancel))
    }

    fn eviction_lease(&self) -> Option<&Mutex<()>> {
        Some(&self.lease)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ensure_capacity;
    use crate::testing::mocks::MockRemoteStore;

    #[tokio::test]
    async fn test_available_is_limit_minus_usage() {
        let store = Arc::new(MockRemoteStore::new(100).with_object("a", "a.flv", 30));
        let drive = RemoteDrive::new(store, "folder");

        assert_eq!(drive.available_capacity().await.expect("quota"), 70);
    }

    #[tokio::test]
    async fn test_evicts_oldest_remote_objects() {
        let store = Arc::new(
            MockRemoteStore::new(100)
                .with_object("old", "old.flv", 40)
                .with_object("mid", "mid.flv", 40)
                .with_object("new", "new.flv", 10),
        );
        let drive = RemoteDrive::new(store.clone(), "folder").with_page_size(2);

        ensure_capacity(&CancellationToken::new(), 50, &drive)
            .await
            .expect("capacity");

        assert_eq!(store.deleted(), vec!["old"]);
        assert_eq!(store.quota_now().available(), 50);
    }

    #[tokio::test]
    async fn test_folders_are_never_evicted() {
        let store = Arc::new(
            MockRemoteStore::new(100)
                .with_folder("dir", "archive")
                .with_object("old", "old.flv", 40)
                .with_object("new", "new.flv", 40),
        );
        let drive = RemoteDrive::new(store.clone(), "folder");

        ensure_capacity(&CancellationToken::new(), 50, &drive)
            .await
            .expect("capacity");

        assert_eq!(store.deleted(), vec!["old"]);
    }

    #[tokio::test]
    async fn test_listing_is_page_limited() {
        let store = Arc::new(
            MockRemoteStore::new(100)
                .with_object("a", "a.flv", 30)
                .with_object("b", "b.flv", 30)
                .with_object("c", "c.flv", 30),
        );
        let drive = RemoteDrive::new(store.clone(), "folder").with_page_size(1);

        // one object per pass, remeasured between passes
        ensure_capacity(&CancellationToken::new(), 70, &drive)
            .await
            .expect("capacity");

        assert_eq!(store.deleted(), vec!["a", "b"]);
    }
}
