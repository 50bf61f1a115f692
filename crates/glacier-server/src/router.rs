use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler;
use crate::state::AppState;

/// Build the axum router with all Glacier endpoints.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_size;
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/info", get(handler::info_handler))
        .route("/v1/status", get(handler::status_handler))
        .route("/uuid", get(handler::uuid_handler))
        .route("/upload", post(handler::upload_handler))
        .route(
            "/rawupload/:id",
            post(handler::raw_upload_handler).put(handler::raw_upload_handler),
        )
        .route("/get/:id", get(handler::get_handler))
        .route("/redirect", get(handler::redirect_handler))
        .route("/metrics", get(handler::metrics_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
