// src/main.rs

use std::time::Duration;

use log::{info, warn};
use rec_postproc::bootstrap;
use rec_postproc::config::Config;
use rec_postproc::web;
use tokio_util::sync::CancellationToken;

/// Time granted to worker loops after the server stopped.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // ------------------------------------------------------------
    // Config
    // ------------------------------------------------------------
    let cfg_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".into());

    let cfg = Config::load(&cfg_path)?;
    info!("[rec-postproc] loaded {}", cfg_path);

    // ------------------------------------------------------------
    // Graceful shutdown
    // ------------------------------------------------------------
    let cancel = CancellationToken::new();
    {
        let c = cancel.clone();
        ctrlc::set_handler(move || {
            info!("[rec-postproc] shutdown requested");
            c.cancel();
        })?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let app = bootstrap::start(&cfg, &cancel);

        let served = web::serve(
            app.state,
            cfg.server.listen,
            &cfg.server.webhook_path,
            cancel.clone(),
        )
        .await;
        // a failed bind must still stop the workers
        cancel.cancel();

        for worker in app.workers {
            if tokio::time::timeout(SHUTDOWN_GRACE, worker).await.is_err() {
                warn!("[rec-postproc] worker did not stop within {:?}", SHUTDOWN_GRACE);
            }
        }
        served
    })?;

    info!("[rec-postproc] stopped");
    Ok(())
}
