/// Prometheus scrape endpoint
use crate::{context::AppContext, error::ServiceResult};
use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};

/// Build metrics routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/metrics", get(scrape))
}

/// GET /metrics
pub async fn scrape(State(ctx): State<AppContext>) -> ServiceResult<impl IntoResponse> {
    let body = ctx.metrics.export()?;
    Ok((
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        body,
    ))
}
