use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use imaged_protocol::{codes, endpoints, HealthResponse, ImagedCodec, ImagedMessage, InfoResponse};
use imaged_store::Store;
use tracing::warn;

use crate::dispatch::{dispatch, error_code};

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub max_message_size: usize,
}

/// Health check handler.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Store summary.
pub async fn info_handler(State(state): State<AppState>) -> Response {
    let store = Arc::clone(&state.store);
    let summary = tokio::task::spawn_blocking(move || {
        let entries = store.len()?;
        Ok::<_, imaged_store::StoreError>(InfoResponse {
            root: store.root().display().to_string(),
            entries,
            locked: store.locked_count(),
            max_message_size: state.max_message_size,
        })
    })
    .await;
    match summary {
        Ok(Ok(info)) => Json(info).into_response(),
        Ok(Err(e)) => status_for(error_code(&e), e.to_string()),
        Err(e) => status_for(codes::INTERNAL, e.to_string()),
    }
}

/// One framed request in, one framed reply out.
///
/// Frames that fail to decode are answered with `400` and an `Error` frame;
/// everything else is `200` with the reply, which may itself be an error.
pub async fn rpc_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match ImagedCodec::decode_with_limit(&body, state.max_message_size) {
        Ok((_, consumed)) if consumed != body.len() => {
            return bad_frame("trailing bytes after frame".to_string());
        }
        Ok((msg, _)) => msg,
        Err(e) => {
            warn!(error = %e, "undecodable request");
            return bad_frame(e.to_string());
        }
    };

    let store = Arc::clone(&state.store);
    let reply = tokio::task::spawn_blocking(move || dispatch(&store, request))
        .await
        .unwrap_or_else(|e| ImagedMessage::error(codes::INTERNAL, e.to_string()));
    frame(StatusCode::OK, &reply)
}

/// Encoded image bytes for `GET /v1/export/{key}/{format}`.
pub async fn export_handler(
    State(state): State<AppState>,
    Path((key, format)): Path<(String, String)>,
) -> Response {
    let format = format.to_ascii_lowercase();
    let store = Arc::clone(&state.store);
    let fmt = format.clone();
    let encoded = tokio::task::spawn_blocking(move || {
        let handle = store.get(&key, false)?;
        handle.encode(&fmt)
    })
    .await;
    match encoded {
        Ok(Ok(data)) => ([(header::CONTENT_TYPE, content_type(&format))], data).into_response(),
        Ok(Err(e)) => status_for(error_code(&e), e.to_string()),
        Err(e) => status_for(codes::INTERNAL, e.to_string()),
    }
}

/// MIME type for an export format name.
pub fn content_type(format: &str) -> &'static str {
    match format {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

fn bad_frame(message: String) -> Response {
    frame(StatusCode::BAD_REQUEST, &ImagedMessage::error(codes::BAD_REQUEST, message))
}

fn frame(status: StatusCode, msg: &ImagedMessage) -> Response {
    // Only an oversized export fails to encode; it is reported in its place.
    let encoded = ImagedCodec::encode_bytes(msg).or_else(|e| {
        ImagedCodec::encode_bytes(&ImagedMessage::error(codes::INTERNAL, e.to_string()))
    });
    match encoded {
        Ok(bytes) => (status, [(header::CONTENT_TYPE, endpoints::FRAME_CONTENT_TYPE)], bytes).into_response(),
        Err(e) => status_for(codes::INTERNAL, e.to_string()),
    }
}

/// Plain-text error response. Wire codes double as HTTP statuses.
fn status_for(code: u32, message: String) -> Response {
    let status = u16::try_from(code)
        .ok()
        .and_then(|c| StatusCode::from_u16(c).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, message).into_response()
}
