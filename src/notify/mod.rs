// src/notify/mod.rs

pub mod message;
pub mod sender;
pub mod transport;
pub mod update;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::event::{FileCloseData, SessionData};
use crate::upload::UploadTask;

pub use message::WebhookMessage;
pub use sender::NotificationSender;
pub use transport::{MessageTransport, WebhookClient};
pub use update::{EmbedImage, UPDATE_QUEUE_CAPACITY, UpdateQueue, UpdateTask, UpdateWorker};

/// Progress reporting towards the operator channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn on_record_start(&self, at: DateTime<Utc>, data: &SessionData) -> anyhow::Result<()>;

    async fn on_record_ready(&self, at: DateTime<Utc>, data: &FileCloseData)
    -> anyhow::Result<()>;

    async fn on_upload_complete(
        &self,
        at: DateTime<Utc>,
        task: &UploadTask,
        took: Duration,
    ) -> anyhow::Result<()>;

    /// Best effort; delivery failures are only logged.
    async fn alert(&self, msg: &str, err: &anyhow::Error);
}

/// Renders a duration as `1h2m3.250s`, leaving out leading zero units.
pub fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    let (hours, minutes, seconds) = (total / 3600, total / 60 % 60, total % 60);
    let millis = d.subsec_millis();

    let secs = if millis == 0 {
        format!("{}s", seconds)
    } else {
        format!("{}.{:03}s", seconds, millis)
    };
    match (hours, minutes) {
        (0, 0) => secs,
        (0, m) => format!("{}m{}", m, secs),
        (h, m) => format!("{}h{}m{}", h, m, secs),
    }
}
