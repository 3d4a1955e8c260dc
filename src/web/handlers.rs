use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use log::{error, warn};

use crate::web::AppState;

pub async fn webhook(State(state): State<AppState>, method: Method, body: Bytes) -> StatusCode {
    if method != Method::POST {
        warn!("[web] unexpected HTTP method {} on webhook", method);
        return StatusCode::NO_CONTENT;
    }

    match state.dispatcher.handle(&body).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => {
            let status = e.status_code();
            if status.is_client_error() {
                error!("[web] rejected event: {}", e);
            } else {
                warn!("[web] error processing event: {}", e);
            }
            status
        }
    }
}

pub async fn health() -> &'static str {
    "ok"
}
