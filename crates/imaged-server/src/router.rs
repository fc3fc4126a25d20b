use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use imaged_protocol::{endpoints, FRAME_HEADER_LEN};
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with all imaged endpoints.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_message_size.saturating_add(FRAME_HEADER_LEN);
    Router::new()
        .route(endpoints::RPC, post(handler::rpc_handler))
        .route(endpoints::HEALTH, get(handler::health_handler))
        .route(endpoints::INFO, get(handler::info_handler))
        .route(&format!("{}/:key/:format", endpoints::EXPORT), get(handler::export_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
