// src/notify/sender.rs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, error, warn};

use super::message::{
    COLOR_ALERT, COLOR_RECORD_READY, COLOR_RECORD_START, COLOR_UPLOAD_COMPLETE, EMBED_TYPE_RICH,
    EmbedAuthor, EmbedField, MessageEmbed, WebhookMessage,
};
use super::transport::MessageTransport;
use super::update::{EmbedImage, UpdateQueue, UpdateTask};
use super::{Notifier, format_duration};
use crate::event::{FileCloseData, RoomData, SessionData};
use crate::storage::{CapacityBackend, format_gib};
use crate::upload::UploadTask;

/// Message owner used to schedule enrichment.
struct Origin<'a> {
    room_id: u64,
    session_id: &'a str,
    image: EmbedImage,
}

/// Sends progress messages and schedules their deferred enrichment.
pub struct NotificationSender {
    transport: Arc<dyn MessageTransport>,
    updates: UpdateQueue,
    recorder_storage: Arc<dyn CapacityBackend>,
}

impl NotificationSender {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        updates: UpdateQueue,
        recorder_storage: Arc<dyn CapacityBackend>,
    ) -> Self {
        Self {
            transport,
            updates,
            recorder_storage,
        }
    }

    async fn available_space(&self) -> String {
        match self.recorder_storage.available_capacity().await {
            Ok(bytes) => format_gib(bytes),
            Err(e) => {
                error!("[notify] error getting available capacity: {:#}", e);
                "error".to_string()
            }
        }
    }

    /// Sends `message`, then queues one update task when it has embeds
    /// and belongs to a room.
    async fn deliver(
        &self,
        message: WebhookMessage,
        origin: Option<Origin<'_>>,
    ) -> anyhow::Result<String> {
        let message_id = self.transport.send(&message).await?;

        let Some(origin) = origin else {
            return Ok(message_id);
        };
        if message.embeds.is_empty() {
            return Ok(message_id);
        }

        let task = UpdateTask {
            room_id: origin.room_id,
            session_id: origin.session_id.to_string(),
            message_id: message_id.clone(),
            message,
            image: origin.image,
        };
        // the primary message is already out
        if let Err(e) = self.updates.try_enqueue(task) {
            warn!(
                "[notify] dropping enrichment of message {}: {}",
                message_id, e
            );
        } else {
            debug!("[notify] queued enrichment of message {}", message_id);
        }
        Ok(message_id)
    }
}

fn author(room: &RoomData) -> EmbedAuthor {
    EmbedAuthor {
        name: room.streamer_name.clone(),
        url: format!("https://live.bilibili.com/{}", room.room_id),
        icon_url: String::new(),
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl Notifier for NotificationSender {
    async fn on_record_start(&self, at: DateTime<Utc>, data: &SessionData) -> anyhow::Result<()> {
        let message = WebhookMessage::single(MessageEmbed {
            title: "Recording started".to_string(),
            kind: EMBED_TYPE_RICH.to_string(),
            description: data.room.title.clone(),
            timestamp: timestamp(at),
            color: COLOR_RECORD_START,
            author: Some(author(&data.room)),
            fields: vec![EmbedField::new(
                "Available Space on Recorder",
                self.available_space().await,
            )],
            ..Default::default()
        });

        let origin = Origin {
            room_id: data.room.room_id,
            session_id: &data.session_id,
            image: EmbedImage::Cover,
        };
        self.deliver(message, Some(origin)).await.map(|_| ())
    }

    async fn on_record_ready(
        &self,
        at: DateTime<Utc>,
        data: &FileCloseData,
    ) -> anyhow::Result<()> {
        let message = WebhookMessage::single(MessageEmbed {
            title: "Recording file ready for upload".to_string(),
            kind: EMBED_TYPE_RICH.to_string(),
            description: format!(
                "Recording file of livestream [{}] is ready\nUploading now...",
                data.room.title
            ),
            timestamp: timestamp(at),
            color: COLOR_RECORD_READY,
            author: Some(author(&data.room)),
            fields: vec![
                EmbedField::new("File Name", data.file_name()),
                EmbedField::new("File Size", format_gib(data.file_size)).inline(),
                EmbedField::new(
                    "Recording Duration",
                    format_duration(data.recording_duration()),
                )
                .inline(),
            ],
            ..Default::default()
        });

        let origin = Origin {
            room_id: data.room.room_id,
            session_id: &data.session_id,
            image: EmbedImage::Keyframe,
        };
        self.deliver(message, Some(origin)).await.map(|_| ())
    }

    async fn on_upload_complete(
        &self,
        at: DateTime<Utc>,
        task: &UploadTask,
        took: Duration,
    ) -> anyhow::Result<()> {
        let message = WebhookMessage::single(MessageEmbed {
            title: "Upload completed".to_string(),
            kind: EMBED_TYPE_RICH.to_string(),
            timestamp: timestamp(at),
            color: COLOR_UPLOAD_COMPLETE,
            author: Some(EmbedAuthor {
                name: task.streamer_name.clone(),
                url: format!("https://live.bilibili.com/{}", task.room_id),
                icon_url: String::new(),
            }),
            fields: vec![
                EmbedField::new("File Name", task.file_name()),
                EmbedField::new("Upload Duration", format_duration(took)),
            ],
            ..Default::default()
        });

        let origin = Origin {
            room_id: task.room_id,
            session_id: &task.session_id,
            image: EmbedImage::None,
        };
        self.deliver(message, Some(origin)).await.map(|_| ())
    }

    async fn alert(&self, msg: &str, err: &anyhow::Error) {
        let message = WebhookMessage::single(MessageEmbed {
            title: "[Alert]".to_string(),
            kind: EMBED_TYPE_RICH.to_string(),
            description: format!("error happened in rec-postproc:\n{}", msg),
            timestamp: timestamp(Utc::now()),
            color: COLOR_ALERT,
            fields: vec![EmbedField::new("Error", format!("{:#}", err))],
            ..Default::default()
        });

        if let Err(e) = self.deliver(message, None).await {
            error!("[notify] error sending alert: {:#}", e);
        }
    }
}
