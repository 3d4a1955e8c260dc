// src/upload/mod.rs - upload queue and per-task workers

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use chrono::Utc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::drive::{ProgressFn, RemoteObject};
use crate::error::QueueError;
use crate::event::FileCloseData;
use crate::logging::{ComponentLogger, LogContext};
use crate::notify::Notifier;
use crate::storage::{Capacity, RemoteDrive, ensure_capacity};

/// Tasks buffered between the dispatcher and the upload workers.
pub const UPLOAD_QUEUE_CAPACITY: usize = 16;

pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// A finished recording waiting to be uploaded.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadTask {
    pub streamer_name: String,
    pub room_id: u64,
    pub session_id: String,
    pub title: String,
    /// Path of the recording below the local storage root.
    pub relative_path: String,
    pub file_size: u64,
    pub duration: Duration,
}

impl UploadTask {
    pub fn from_event(data: &FileCloseData) -> Self {
        Self {
            streamer_name: data.room.streamer_name.clone(),
            room_id: data.room.room_id,
            session_id: data.session_id.clone(),
            title: data.room.title.clone(),
            relative_path: data.relative_path.clone(),
            file_size: data.file_size,
            duration: data.recording_duration(),
        }
    }

    pub fn file_name(&self) -> &str {
        Path::new(&self.relative_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.relative_path)
    }

    /// Resolves the recording below `root`, refusing paths that escape it.
    pub fn local_path(&self, root: &Path) -> anyhow::Result<PathBuf> {
        let relative = Path::new(&self.relative_path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!("recording path {} leaves the storage root", self.relative_path);
        }
        Ok(root.join(relative))
    }
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub local_root: PathBuf,
    /// Deadline of a single task, capacity check and transfer included.
    pub timeout: Duration,
    /// Remote bytes kept free on top of the file being uploaded.
    pub reserved: Capacity,
    pub max_concurrent: usize,
}

/// Producer side of the upload queue.
#[derive(Clone)]
pub struct UploadQueue {
    tx: mpsc::Sender<UploadTask>,
}

impl UploadQueue {
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<UploadTask>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Enqueues `task`, waiting at most `deadline` for a free slot.
    pub async fn submit(&self, task: UploadTask, deadline: Duration) -> Result<(), QueueError> {
        match timeout(deadline, self.tx.send(task)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(QueueError::Closed { queue: "upload" }),
            Err(_) => Err(QueueError::Timeout {
                queue: "upload",
                waited: deadline,
            }),
        }
    }
}

/// Uploads recordings of one streamer entry to its remote folder.
pub struct Uploader {
    name: String,
    drive: RemoteDrive,
    notifier: Arc<dyn Notifier>,
    settings: UploadSettings,
    permits: Arc<Semaphore>,
}

impl ComponentLogger for Uploader {
    fn log_context(&self) -> LogContext {
        LogContext::new("upload", &self.name)
    }
}

impl Uploader {
    pub fn new(
        name: impl Into<String>,
        drive: RemoteDrive,
        notifier: Arc<dyn Notifier>,
        settings: UploadSettings,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent.max(1)));
        Self {
            name: name.into(),
            drive,
            notifier,
            settings,
            permits,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> (UploadQueue, JoinHandle<()>) {
        let (queue, rx) = UploadQueue::bounded(UPLOAD_QUEUE_CAPACITY);
        let handle = tokio::spawn(Arc::new(self).run(rx, cancel));
        (queue, handle)
    }

    async fn run(self: Arc<Self>, mut tasks: mpsc::Receiver<UploadTask>, cancel: CancellationToken) {
        self.info(&format!(
            "uploading into {} (at most {} at once)",
            self.drive.parent(),
            self.settings.max_concurrent
        ));

        loop {
            let task = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                task = tasks.recv() => match task {
                    Some(task) => task,
                    None => break,
                },
            };

            // one worker per task so a slow transfer never blocks dequeuing
            let uploader = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { uploader.process(task, cancel).await });
        }

        self.info("upload loop stopped");
    }

    /// Runs one task to completion and reports the outcome. Failures are
    /// alerted, never retried.
    pub async fn process(&self, task: UploadTask, cancel: CancellationToken) {
        let ctx = self.log_context().with_task(&task.relative_path);

        let _permit = tokio::select! {
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
            _ = cancel.cancelled() => {
                log::warn!("{}", ctx.format("cancelled while waiting for an upload slot"));
                return;
            }
        };

        let started = Instant::now();
        match self.upload(&task, &cancel).await {
            Ok(object) => {
                let took = started.elapsed();
                log::info!(
                    "{}",
                    ctx.format(&format!("uploaded as {} in {:?}", object.id, took))
                );
                if let Err(e) = self.notifier.on_upload_complete(Utc::now(), &task, took).await {
                    log::warn!(
                        "{}",
                        ctx.format(&format!("error notifying upload completion: {:#}", e))
                    );
                }
            }
            Err(e) => {
                log::error!("{}", ctx.format(&format!("upload failed: {:#}", e)));
                self.notifier
                    .alert(&format!("error uploading {}", task.relative_path), &e)
                    .await;
            }
        }
    }

    /// Makes room on the remote drive and transfers the recording, bounded
    /// by the configured task timeout.
    pub async fn upload(
        &self,
        task: &UploadTask,
        cancel: &CancellationToken,
    ) -> anyhow::Result<RemoteObject> {
        let pass = cancel.child_token();
        let _guard = pass.clone().drop_guard();

        match timeout(self.settings.timeout, self.transfer(task, &pass)).await {
            Ok(res) => res,
            Err(_) => bail!(
                "upload of {} timed out after {:?}",
                task.relative_path,
                self.settings.timeout
            ),
        }
    }

    async fn transfer(
        &self,
        task: &UploadTask,
        cancel: &CancellationToken,
    ) -> anyhow::Result<RemoteObject> {
        let target = self.settings.reserved.saturating_add(task.file_size);
        ensure_capacity(cancel, target, &self.drive)
            .await
            .context("unable to ensure capacity on remote drive")?;

        let path = task.local_path(&self.settings.local_root)?;
        let file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("unable to open {}", path.display()))?;
        let size = file
            .metadata()
            .await
            .with_context(|| format!("unable to stat {}", path.display()))?
            .len();
        let file = file.into_std().await;

        let upload = self.drive.store().create_file(
            self.drive.parent(),
            task.file_name(),
            file,
            size,
            self.progress(task),
        );
        tokio::select! {
            res = upload => res,
            _ = cancel.cancelled() => bail!("upload of {} cancelled", task.relative_path),
        }
    }

    /// Logs transfer progress in steps of ten percent.
    fn progress(&self, task: &UploadTask) -> ProgressFn {
        let ctx = self.log_context().with_task(task.file_name());
        let last_step = AtomicU64::new(0);
        Arc::new(move |current, total| {
            if total == 0 {
                return;
            }
            let step = current.saturating_mul(10) / total;
            if step > last_step.fetch_max(step, Ordering::Relaxed) {
                log::info!(
                    "{}",
                    ctx.format(&format!("uploaded {} / {} bytes", current, total))
                );
            }
        })
    }
}
