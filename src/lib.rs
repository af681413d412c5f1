//! tailwho - shows a tailnet visitor who they are
//!
//! Resolves the identity behind each request through the local tailscaled,
//! falling back to identity headers forwarded by a Tailscale edge, and
//! serves it as a page, a JSON status object and Prometheus metrics.
pub mod api;
pub mod compose;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod overlay;
pub mod server;
pub mod ui;
