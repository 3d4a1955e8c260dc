// src/drive/mod.rs

use std::fs::File;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod client;

pub use client::DriveClient;

/// Mime type the store reports for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Progress callback: `(bytes_sent, total_bytes)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Quota {
    pub usage: u64,
    pub limit: u64,
}

impl Quota {
    pub fn available(&self) -> u64 {
        self.limit.saturating_sub(self.usage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub mime_type: String,
}

impl RemoteObject {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

/// Transfer API of the remote quota store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn quota(&self) -> anyhow::Result<Quota>;

    /// One page of files under `parent`, least recently modified first.
    /// Folders are not listed.
    async fn list_oldest(&self, parent: &str, page_size: usize)
    -> anyhow::Result<Vec<RemoteObject>>;

    async fn delete_object(&self, id: &str) -> anyhow::Result<()>;

    async fn create_file(
        &self,
        parent: &str,
        name: &str,
        content: File,
        size: u64,
        progress: ProgressFn,
    ) -> anyhow::Result<RemoteObject>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_available_saturates() {
        assert_eq!(Quota { usage: 3, limit: 10 }.available(), 7);
        assert_eq!(Quota { usage: 12, limit: 10 }.available(), 0);
    }

    #[test]
    fn test_remote_object_decodes_listing_entry() {
        let obj: RemoteObject = serde_json::from_str(
            r#"{"id":"f1","name":"rec.flv","size":42,"modifiedTime":"2024-05-01T10:00:00Z"}"#,
        )
        .expect("decode");
        assert_eq!(obj.id, "f1");
        assert_eq!(obj.size, 42);
        assert!(obj.modified_time.is_some());
        assert!(!obj.is_folder());
    }

    #[test]
    fn test_folder_is_recognised_by_mime_type() {
        let obj: RemoteObject = serde_json::from_str(
            r#"{"id":"d1","name":"old","mimeType":"application/vnd.google-apps.folder"}"#,
        )
        .expect("decode");
        assert!(obj.is_folder());
        assert_eq!(obj.size, 0);
    }
}
