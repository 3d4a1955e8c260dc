// src/bin/upload.rs - manual resubmission of a recording

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use log::{info, warn};
use rec_postproc::bootstrap;
use rec_postproc::config::Config;
use rec_postproc::notify::Notifier;
use rec_postproc::storage::CapacityBackend;
use rec_postproc::upload::UploadTask;
use tokio_util::sync::CancellationToken;

fn usage() -> ! {
    eprintln!("usage: upload <config.toml> <room_id> <relative_path>");
    std::process::exit(2);
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [cfg_path, room_id, relative_path] = args.as_slice() else {
        usage();
    };
    let room_id: u64 = room_id
        .parse()
        .with_context(|| format!("invalid room id {:?}", room_id))?;

    let cfg = Config::load(cfg_path)?;
    let entry = cfg.service_for(room_id);

    let cancel = CancellationToken::new();
    {
        let c = cancel.clone();
        ctrlc::set_handler(move || c.cancel())?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let local: Arc<dyn CapacityBackend> = Arc::new(bootstrap::local_drive(&cfg));
        let name = format!("manual:{}", room_id);
        let (notifier, update_worker) =
            bootstrap::start_notifier(&cfg, &name, entry, local, &cancel);
        let uploader = bootstrap::build_uploader(&cfg, &name, entry, notifier.clone());

        let mut task = UploadTask {
            streamer_name: String::new(),
            room_id,
            session_id: String::new(),
            title: String::new(),
            relative_path: relative_path.clone(),
            file_size: 0,
            duration: Duration::ZERO,
        };
        let path = task.local_path(&cfg.local_storage.root_path)?;
        task.file_size = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("unable to stat {}", path.display()))?
            .len();
        info!("[upload] uploading {} ({} bytes)", path.display(), task.file_size);

        let started = Instant::now();
        let object = uploader.upload(&task, &cancel).await?;
        let took = started.elapsed();
        info!("[upload] uploaded as {} in {:?}", object.id, took);

        if let Err(e) = notifier.on_upload_complete(Utc::now(), &task, took).await {
            warn!("[upload] error notifying upload completion: {:#}", e);
        }

        // closing the update queue lets the worker drain and exit
        drop(uploader);
        drop(notifier);
        if tokio::time::timeout(cfg.request_timeout() * 2, update_worker)
            .await
            .is_err()
        {
            warn!("[upload] message enrichment still pending; giving up");
        }
        Ok::<_, anyhow::Error>(())
    })
}
