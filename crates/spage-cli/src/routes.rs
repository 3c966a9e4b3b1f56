//! HTTP route definitions

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the main router
pub fn create_router(state: Arc<AppState>) -> Router {
    // every response carries permissive cross-origin headers
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    // leave headroom over the upload cap so the cap itself answers with 413
    let body_limit = state.config.max_upload_bytes + 1024 * 1024;

    Router::new()
        .route("/page", get(handlers::get_page).post(handlers::post_page))
        .route("/file", get(handlers::get_file))
        .route("/history", get(handlers::get_history))
        .route("/info", get(handlers::get_info))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
