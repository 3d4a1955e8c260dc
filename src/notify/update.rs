// src/notify/update.rs - deferred enrichment of sent messages

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::message::{EmbedThumbnail, MessageImage, WebhookMessage};
use super::transport::MessageTransport;
use crate::error::QueueError;
use crate::live::{LiveInfo, MetadataSource};
use crate::logging::{ComponentLogger, LogContext};

/// Pending enrichment jobs; a send finding the queue full skips enrichment.
pub const UPDATE_QUEUE_CAPACITY: usize = 32;

/// Which live image goes into the embed body when a message is enriched.
/// The avatar is always applied as thumbnail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedImage {
    Cover,
    Keyframe,
    None,
}

impl EmbedImage {
    pub fn select(self, info: &LiveInfo) -> Option<String> {
        let url = match self {
            EmbedImage::Cover => &info.cover_url,
            EmbedImage::Keyframe => &info.keyframe_url,
            EmbedImage::None => return None,
        };
        (!url.is_empty()).then(|| url.clone())
    }
}

#[derive(Debug, Clone)]
pub struct UpdateTask {
    pub room_id: u64,
    pub session_id: String,
    pub message_id: String,
    pub message: WebhookMessage,
    pub image: EmbedImage,
}

impl UpdateTask {
    /// Applies live metadata to every embed of the stored message.
    pub fn enrich(&self, info: &LiveInfo) -> WebhookMessage {
        let image = self.image.select(info);
        let mut message = self.message.clone();
        for embed in &mut message.embeds {
            if !info.avatar_url.is_empty() {
                embed.thumbnail = Some(EmbedThumbnail {
                    url: info.avatar_url.clone(),
                });
                if let Some(author) = embed.author.as_mut() {
                    author.icon_url = info.avatar_url.clone();
                }
            }
            if let Some(url) = &image {
                embed.image = Some(MessageImage { url: url.clone() });
            }
        }
        message
    }
}

/// Producer side of the update queue.
#[derive(Clone)]
pub struct UpdateQueue {
    tx: mpsc::Sender<UpdateTask>,
}

impl UpdateQueue {
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<UpdateTask>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Never waits; a full queue rejects the task.
    pub fn try_enqueue(&self, task: UpdateTask) -> Result<(), QueueError> {
        self.tx.try_send(task).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full { queue: "update" },
            TrySendError::Closed(_) => QueueError::Closed { queue: "update" },
        })
    }
}

/// Single consumer draining the update queue.
pub struct UpdateWorker {
    transport: Arc<dyn MessageTransport>,
    metadata: Arc<dyn MetadataSource>,
    name: String,
}

impl ComponentLogger for UpdateWorker {
    fn log_context(&self) -> LogContext {
        LogContext::new("notify-update", &self.name)
    }
}

impl UpdateWorker {
    pub fn new(
        name: impl Into<String>,
        transport: Arc<dyn MessageTransport>,
        metadata: Arc<dyn MetadataSource>,
    ) -> Self {
        Self {
            transport,
            metadata,
            name: name.into(),
        }
    }

    pub fn spawn(
        self,
        tasks: mpsc::Receiver<UpdateTask>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(tasks, cancel))
    }

    async fn run(self, mut tasks: mpsc::Receiver<UpdateTask>, cancel: CancellationToken) {
        loop {
            let task = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                task = tasks.recv() => match task {
                    Some(task) => task,
                    None => break,
                },
            };

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                res = self.apply(&task) => res,
            };
            if let Err(e) = result {
                self.warn(&format!(
                    "enrichment of message {} (room {}, session {}) failed: {:#}",
                    task.message_id, task.room_id, task.session_id, e
                ));
            }
        }
        self.debug("update worker stopped");
    }

    /// Fetches live metadata and edits the original message.
    pub async fn apply(&self, task: &UpdateTask) -> anyhow::Result<()> {
        let info = self.metadata.live_info(task.room_id).await?;
        let message = task.enrich(&info);
        self.transport.edit(&task.message_id, &message).await
    }
}
