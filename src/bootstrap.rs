use std::sync::Arc;

use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ServiceEntryConfig};
use crate::dispatch::Dispatcher;
use crate::drive::DriveClient;
use crate::live::LiveClient;
use crate::notify::{
    MessageTransport, NotificationSender, UPDATE_QUEUE_CAPACITY, UpdateQueue, UpdateWorker,
    WebhookClient,
};
use crate::registry::{ServiceEntry, ServiceRegistry};
use crate::storage::{CapacityBackend, CleanupScheduler, LocalDrive, RemoteDrive};
use crate::upload::{UploadSettings, Uploader};
use crate::web::AppState;

/// Running services plus the state handed to the HTTP layer.
pub struct AppContext {
    pub state: AppState,
    pub workers: Vec<JoinHandle<()>>,
}

pub fn local_drive(cfg: &Config) -> LocalDrive {
    LocalDrive::new(&cfg.local_storage.root_path).at_depth(cfg.local_storage.traverse_depth)
}

/// Notification sender of one service entry; its update worker is spawned
/// onto the current runtime.
pub fn start_notifier(
    cfg: &Config,
    name: &str,
    entry: &ServiceEntryConfig,
    recorder_storage: Arc<dyn CapacityBackend>,
    cancel: &CancellationToken,
) -> (Arc<NotificationSender>, JoinHandle<()>) {
    let timeout = cfg.request_timeout();
    let transport: Arc<dyn MessageTransport> =
        Arc::new(WebhookClient::new(&entry.notification.webhook_url, timeout));
    let metadata = Arc::new(LiveClient::new(&entry.live.api_base, timeout));

    let (updates, rx) = UpdateQueue::bounded(UPDATE_QUEUE_CAPACITY);
    let worker = UpdateWorker::new(name, transport.clone(), metadata).spawn(rx, cancel.clone());

    let sender = NotificationSender::new(transport, updates, recorder_storage);
    (Arc::new(sender), worker)
}

pub fn build_uploader(
    cfg: &Config,
    name: &str,
    entry: &ServiceEntryConfig,
    notifier: Arc<NotificationSender>,
) -> Uploader {
    let drive_cfg = &entry.upload.drive;
    let client = DriveClient::new(
        &drive_cfg.api_base,
        &drive_cfg.access_token,
        drive_cfg.timeout(),
    );
    let drive = RemoteDrive::new(Arc::new(client), &drive_cfg.parent_folder_id)
        .with_page_size(drive_cfg.page_size);

    let settings = UploadSettings {
        local_root: cfg.local_storage.root_path.clone(),
        timeout: drive_cfg.timeout(),
        reserved: drive_cfg.reserved_capacity,
        max_concurrent: drive_cfg.max_concurrent,
    };
    Uploader::new(name, drive, notifier, settings)
}

fn start_entry(
    cfg: &Config,
    name: &str,
    entry: &ServiceEntryConfig,
    recorder_storage: Arc<dyn CapacityBackend>,
    cancel: &CancellationToken,
    workers: &mut Vec<JoinHandle<()>>,
) -> ServiceEntry {
    let (notifier, update_worker) = start_notifier(cfg, name, entry, recorder_storage, cancel);
    let (uploads, upload_loop) =
        build_uploader(cfg, name, entry, notifier.clone()).spawn(cancel.clone());
    workers.push(update_worker);
    workers.push(upload_loop);

    ServiceEntry { notifier, uploads }
}

/// Spawns the cleanup scheduler and every per-streamer service.
pub fn start(cfg: &Config, cancel: &CancellationToken) -> AppContext {
    let mut workers = Vec::new();

    let local = local_drive(cfg);
    let (cleanup, cleanup_loop) = CleanupScheduler::new(
        local.clone(),
        cfg.clean_interval(),
        cfg.local_storage.reserved_capacity,
    )
    .spawn(cancel.clone());
    workers.push(cleanup_loop);

    let recorder_storage: Arc<dyn CapacityBackend> = Arc::new(local);
    let default = start_entry(
        cfg,
        "default",
        &cfg.services.default,
        recorder_storage.clone(),
        cancel,
        &mut workers,
    );
    let mut services = ServiceRegistry::new(default);
    for streamer in &cfg.services.streamers {
        let name = format!("room:{}", streamer.room_id);
        let entry = start_entry(
            cfg,
            &name,
            &streamer.entry,
            recorder_storage.clone(),
            cancel,
            &mut workers,
        );
        services = services.with_room(streamer.room_id, entry);
    }
    info!(
        "[bootstrap] started {} streamer entries plus default",
        cfg.services.streamers.len()
    );

    let dispatcher = Dispatcher::new(cfg.request_timeout(), cleanup, services);
    AppContext {
        state: AppState {
            dispatcher: Arc::new(dispatcher),
        },
        workers,
    }
}
