/// The identity page
use crate::{compose::compose, context::AppContext, ui::INDEX_TEMPLATE};
use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;

/// Build page routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/", get(index))
}

/// GET /
///
/// Renders the visitor's identity. Lookup failures render the anonymous
/// page; a template failure still completes the response.
pub async fn index(
    State(ctx): State<AppContext>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let outcome = ctx.identity_resolver.resolve(peer, &headers).await;
    let projection = compose(&outcome);

    match ctx.templates.render(INDEX_TEMPLATE, &projection) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to render page");
            (StatusCode::INTERNAL_SERVER_ERROR, "page unavailable\n").into_response()
        }
    }
}
