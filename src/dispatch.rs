// src/dispatch.rs - routes recorder events to cleanup, notification and upload

use std::future::Future;
use std::time::Duration;

use axum::http::StatusCode;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::time::{Instant, timeout_at};

use crate::error::QueueError;
use crate::event::{Event, EventType, FileCloseData, FileOpenData, SessionData};
use crate::registry::ServiceRegistry;
use crate::storage::CleanupHandle;
use crate::upload::UploadTask;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("malformed event: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid event timestamp {timestamp:?}: {source}")]
    Timestamp {
        timestamp: String,
        source: chrono::ParseError,
    },

    #[error("notification failed: {0:#}")]
    Notify(anyhow::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("event handling exceeded {0:?}")]
    TimedOut(Duration),
}

impl DispatchError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::Decode(_) | DispatchError::Timestamp { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub struct Dispatcher {
    timeout: Duration,
    cleanup: CleanupHandle,
    services: ServiceRegistry,
}

impl Dispatcher {
    pub fn new(timeout: Duration, cleanup: CleanupHandle, services: ServiceRegistry) -> Self {
        Self {
            timeout,
            cleanup,
            services,
        }
    }

    /// Decodes a raw webhook body and handles the event.
    pub async fn handle(&self, body: &[u8]) -> Result<(), DispatchError> {
        let event = Event::decode(body)?;
        self.dispatch(&event).await
    }

    /// Handles one event; every wait is bounded by the configured timeout.
    pub async fn dispatch(&self, event: &Event) -> Result<(), DispatchError> {
        let deadline = Instant::now() + self.timeout;
        let at = event.time().map_err(|source| DispatchError::Timestamp {
            timestamp: event.timestamp.clone(),
            source,
        })?;

        match event.event_type {
            EventType::SessionStarted => {
                let data: SessionData = event.data()?;
                info!(
                    "[dispatch] session {} started for room {}",
                    data.session_id, data.room.room_id
                );
                let notifier = self.services.notifier(data.room.room_id);
                self.notify(deadline, notifier.on_record_start(at, &data))
                    .await
            }
            EventType::FileOpening => {
                let data: FileOpenData = event.data()?;
                let depth = data.traverse_depth();
                debug!(
                    "[dispatch] {} opening; requesting cleanup at depth {}",
                    data.relative_path, depth
                );
                self.cleanup.request(depth)?;
                Ok(())
            }
            EventType::FileClosed => {
                let data: FileCloseData = event.data()?;
                let room_id = data.room.room_id;

                let notifier = self.services.notifier(room_id);
                if let Err(e) = self.notify(deadline, notifier.on_record_ready(at, &data)).await {
                    warn!(
                        "[dispatch] error notifying on record finish; continue to upload: {}",
                        e
                    );
                }

                let remaining = deadline.saturating_duration_since(Instant::now());
                self.services
                    .uploads(room_id)
                    .submit(UploadTask::from_event(&data), remaining)
                    .await?;
                info!("[dispatch] queued upload of {}", data.relative_path);
                Ok(())
            }
            other => {
                debug!("[dispatch] ignoring {:?} event {}", other, event.id);
                Ok(())
            }
        }
    }

    async fn notify<F>(&self, deadline: Instant, call: F) -> Result<(), DispatchError>
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        match timeout_at(deadline, call).await {
            Ok(res) => res.map_err(DispatchError::Notify),
            Err(_) => Err(DispatchError::TimedOut(self.timeout)),
        }
    }
}
