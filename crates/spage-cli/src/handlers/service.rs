//! Service-level handlers

use axum::Json;
use serde_json::{json, Value};

/// GET /info - node version
pub async fn get_info() -> Json<Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}
