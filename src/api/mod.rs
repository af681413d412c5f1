/// API routes and handlers
pub mod health;
pub mod metrics;
pub mod page;
pub mod user;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(page::routes())
        .merge(user::routes())
        .merge(metrics::routes())
        .merge(health::routes())
}
