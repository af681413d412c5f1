/// Health check endpoint
use crate::context::AppContext;
use axum::{response::Json, routing::get, Router};

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/health", get(health_basic))
}

/// Basic liveness check with the running version
pub async fn health_basic() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
