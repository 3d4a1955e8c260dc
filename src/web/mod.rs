use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{any, get};
use log::info;
use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;

pub mod handlers;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

pub fn router(state: AppState, webhook_path: &str) -> Router {
    Router::new()
        .route(webhook_path, any(handlers::webhook))
        .route("/health", get(handlers::health))
        .with_state(state)
}

/// Serves until `cancel` fires, then drains in-flight requests.
pub async fn serve(
    state: AppState,
    addr: SocketAddr,
    webhook_path: &str,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = router(state, webhook_path);
    info!("[web] listening on {} (webhook at {})", addr, webhook_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    info!("[web] server stopped");
    Ok(())
}
