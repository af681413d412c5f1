/// Identity status and token endpoints
use crate::{
    compose::{status, UserStatus},
    context::AppContext,
};
use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    response::Json,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use uuid::Uuid;

/// Build user API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/user", get(current_user))
        .route("/api/uuid", get(new_uuid))
}

/// GET /api/user
///
/// Always 200; failed resolutions report `connected: false`.
pub async fn current_user(
    State(ctx): State<AppContext>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Json<UserStatus> {
    let outcome = ctx.identity_resolver.resolve(peer, &headers).await;
    Json(status(&outcome))
}

/// GET /api/uuid
pub async fn new_uuid() -> String {
    let id = Uuid::new_v4();
    tracing::debug!(%id, "generated uuid");
    format!("{}\n", id)
}
