use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::drive::{FOLDER_MIME_TYPE, ProgressFn, Quota, RemoteObject, RemoteStore};
use crate::event::{FileCloseData, SessionData};
use crate::live::{LiveInfo, MetadataSource};
use crate::notify::{MessageTransport, Notifier, WebhookMessage};
use crate::storage::{Capacity, CapacityBackend, RemovableStream, Removal, stream_removals};
use crate::upload::UploadTask;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------- capacity backend ----------

#[derive(Default)]
struct ScriptState {
    available: Capacity,
    items: Vec<(String, Capacity)>,
    removed: Vec<String>,
}

/// In-memory backend whose items are removed in insertion order.
pub struct ScriptedBackend {
    state: Arc<Mutex<ScriptState>>,
    failing_on: Option<String>,
    stale: bool,
    failing_measure: bool,
    removal_delay: Duration,
    measurements: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(available: Capacity) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                available,
                ..Default::default()
            })),
            failing_on: None,
            stale: false,
            failing_measure: false,
            removal_delay: Duration::ZERO,
            measurements: AtomicUsize::new(0),
        }
    }

    /// Items oldest first.
    pub fn with_items(self, items: &[(&str, Capacity)]) -> Self {
        lock(&self.state)
            .items
            .extend(items.iter().map(|(label, size)| (label.to_string(), *size)));
        self
    }

    pub fn failing_on(mut self, label: &str) -> Self {
        self.failing_on = Some(label.to_string());
        self
    }

    /// Removals succeed but never show up in the capacity report.
    pub fn stale(mut self) -> Self {
        self.stale = true;
        self
    }

    pub fn failing_measure(mut self) -> Self {
        self.failing_measure = true;
        self
    }

    pub fn with_removal_delay(mut self, delay: Duration) -> Self {
        self.removal_delay = delay;
        self
    }

    pub fn removed(&self) -> Vec<String> {
        lock(&self.state).removed.clone()
    }

    pub fn available(&self) -> Capacity {
        lock(&self.state).available
    }

    pub fn measurements(&self) -> usize {
        self.measurements.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CapacityBackend for ScriptedBackend {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    async fn available_capacity(&self) -> Result<Capacity> {
        self.measurements.fetch_add(1, Ordering::SeqCst);
        if self.failing_measure {
            bail!("disk unreadable");
        }
        Ok(self.available())
    }

    async fn removables(&self, cancel: CancellationToken) -> Result<RemovableStream> {
        let items = lock(&self.state).items.clone();
        let removals = items
            .into_iter()
            .map(|(label, size)| {
                let state = self.state.clone();
                let fail = self.failing_on.as_deref() == Some(label.as_str());
                let stale = self.stale;
                let delay = self.removal_delay;
                Removal::new(label.clone(), size, move || async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    if fail {
                        bail!("permission denied: {}", label);
                    }
                    let mut state = lock(&state);
                    state.items.retain(|(l, _)| l != &label);
                    state.removed.push(label);
                    if !stale {
                        state.available += size;
                    }
                    Ok(size)
                })
            })
            .collect();
        Ok(stream_removals("scripted", removals, cancel))
    }
}

// ---------- remote store ----------

#[derive(Default)]
struct StoreState {
    objects: Vec<RemoteObject>,
    deleted: Vec<String>,
    uploaded: Vec<String>,
    next_id: usize,
}

/// Remote store whose usage is the sum of its object sizes.
pub struct MockRemoteStore {
    limit: u64,
    state: Mutex<StoreState>,
    failing_upload: AtomicBool,
}

impl MockRemoteStore {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            state: Mutex::new(StoreState::default()),
            failing_upload: AtomicBool::new(false),
        }
    }

    /// Objects are listed in the order they were added.
    pub fn with_object(self, id: &str, name: &str, size: u64) -> Self {
        lock(&self.state).objects.push(RemoteObject {
            id: id.to_string(),
            name: name.to_string(),
            size,
            modified_time: None,
            mime_type: "video/x-flv".to_string(),
        });
        self
    }

    /// Adds a folder; the mock lists it like any other object.
    pub fn with_folder(self, id: &str, name: &str) -> Self {
        lock(&self.state).objects.push(RemoteObject {
            id: id.to_string(),
            name: name.to_string(),
            size: 0,
            modified_time: None,
            mime_type: FOLDER_MIME_TYPE.to_string(),
        });
        self
    }

    pub fn failing_upload(self) -> Self {
        self.failing_upload.store(true, Ordering::SeqCst);
        self
    }

    pub fn deleted(&self) -> Vec<String> {
        lock(&self.state).deleted.clone()
    }

    /// Names of uploaded files.
    pub fn uploaded(&self) -> Vec<String> {
        lock(&self.state).uploaded.clone()
    }

    pub fn quota_now(&self) -> Quota {
        let usage = lock(&self.state).objects.iter().map(|o| o.size).sum();
        Quota {
            usage,
            limit: self.limit,
        }
    }
}

#[async_trait]
impl RemoteStore for MockRemoteStore {
    async fn quota(&self) -> Result<Quota> {
        Ok(self.quota_now())
    }

    async fn list_oldest(&self, _parent: &str, page_size: usize) -> Result<Vec<RemoteObject>> {
        Ok(lock(&self.state)
            .objects
            .iter()
            .take(page_size)
            .cloned()
            .collect())
    }

    async fn delete_object(&self, id: &str) -> Result<()> {
        let mut state = lock(&self.state);
        let before = state.objects.len();
        state.objects.retain(|o| o.id != id);
        if state.objects.len() == before {
            bail!("object {} not found", id);
        }
        state.deleted.push(id.to_string());
        Ok(())
    }

    async fn create_file(
        &self,
        _parent: &str,
        name: &str,
        mut content: std::fs::File,
        size: u64,
        progress: ProgressFn,
    ) -> Result<RemoteObject> {
        if self.failing_upload.load(Ordering::SeqCst) {
            bail!("upload rejected");
        }
        let mut body = Vec::new();
        content.read_to_end(&mut body)?;
        progress(body.len() as u64, size);

        let mut state = lock(&self.state);
        state.next_id += 1;
        let object = RemoteObject {
            id: format!("upload-{}", state.next_id),
            name: name.to_string(),
            size: body.len() as u64,
            modified_time: Some(Utc::now()),
            mime_type: "application/octet-stream".to_string(),
        };
        state.objects.push(object.clone());
        state.uploaded.push(name.to_string());
        Ok(object)
    }
}

// ---------- message transport ----------

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<WebhookMessage>>,
    edits: Mutex<Vec<(String, WebhookMessage)>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        let transport = Self::default();
        transport.failing.store(true, Ordering::SeqCst);
        transport
    }

    pub fn sent(&self) -> Vec<WebhookMessage> {
        lock(&self.sent).clone()
    }

    pub fn edits(&self) -> Vec<(String, WebhookMessage)> {
        lock(&self.edits).clone()
    }
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn send(&self, message: &WebhookMessage) -> Result<String> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("webhook unreachable");
        }
        let mut sent = lock(&self.sent);
        sent.push(message.clone());
        Ok(format!("msg-{}", sent.len()))
    }

    async fn edit(&self, message_id: &str, message: &WebhookMessage) -> Result<()> {
        lock(&self.edits).push((message_id.to_string(), message.clone()));
        Ok(())
    }
}

// ---------- metadata ----------

pub struct StaticMetadata {
    info: Option<LiveInfo>,
    calls: AtomicUsize,
}

impl StaticMetadata {
    pub fn new(info: LiveInfo) -> Self {
        Self {
            info: Some(info),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            info: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for StaticMetadata {
    async fn live_info(&self, room_id: u64) -> Result<LiveInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.info
            .clone()
            .ok_or_else(|| anyhow!("room {} not found", room_id))
    }
}

// ---------- notifier ----------

/// Records notifier calls as `kind:subject` strings.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    /// Record start/ready notifications fail; alerts are still recorded.
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.failing.store(true, Ordering::SeqCst);
        notifier
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Polls until at least `count` calls were recorded or `within` passed.
    pub async fn wait_for(&self, count: usize, within: Duration) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let calls = self.calls();
            if calls.len() >= count || tokio::time::Instant::now() >= deadline {
                return calls;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn record(&self, call: String) -> Result<()> {
        lock(&self.calls).push(call);
        if self.failing.load(Ordering::SeqCst) {
            bail!("notification channel down");
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn on_record_start(&self, _at: DateTime<Utc>, data: &SessionData) -> Result<()> {
        self.record(format!("record_start:{}", data.room.room_id))
    }

    async fn on_record_ready(&self, _at: DateTime<Utc>, data: &FileCloseData) -> Result<()> {
        self.record(format!("record_ready:{}", data.relative_path))
    }

    async fn on_upload_complete(
        &self,
        _at: DateTime<Utc>,
        task: &UploadTask,
        _took: Duration,
    ) -> Result<()> {
        self.record(format!("upload_complete:{}", task.relative_path))
    }

    async fn alert(&self, msg: &str, _err: &anyhow::Error) {
        lock(&self.calls).push(format!("alert:{}", msg));
    }
}
