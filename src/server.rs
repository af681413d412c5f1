/// HTTP server setup, routing and transport bootstrap
use crate::{
    config::TransportMode,
    context::AppContext,
    error::{ServiceError, ServiceResult},
    identity::LocalApiClient,
    metrics::track_http_requests,
    overlay::OverlaySession,
};
use axum::{http::StatusCode, middleware, response::Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use serde_json::json;
use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Grace period for in-flight TLS connections on shutdown
const TLS_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Build the main application router
/// Returns Router<()> because state is already provided
pub fn build_router(ctx: AppContext) -> Router {
    let live_dir = ctx.config.ui.dev.then(|| ctx.config.ui.dir.clone());

    Router::new()
        .merge(crate::api::routes())
        .merge(crate::ui::asset_routes(live_dir))
        // Unmatched requests still pass through the layers below
        .fallback(not_found)
        // Provide state - converts Router<AppContext> to Router<()>
        .with_state(ctx.clone())
        .layer(middleware::from_fn_with_state(
            Arc::clone(&ctx.metrics),
            track_http_requests,
        ))
        .layer(TraceLayer::new_for_http())
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// A bound socket the router can be served on
pub enum ServableListener {
    /// Plain HTTP
    Plain(TcpListener),
    /// HTTPS terminated with rustls
    Tls {
        listener: std::net::TcpListener,
        config: RustlsConfig,
    },
}

impl ServableListener {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        match self {
            ServableListener::Plain(listener) => listener.local_addr(),
            ServableListener::Tls { listener, .. } => listener.local_addr(),
        }
    }

    /// Spawn the accept loop; it stops gracefully once `shutdown` fires or
    /// its sender is dropped
    fn serve(
        self,
        app: Router,
        shutdown: oneshot::Receiver<()>,
    ) -> JoinHandle<std::io::Result<()>> {
        let make_service = app.into_make_service_with_connect_info::<SocketAddr>();

        match self {
            ServableListener::Plain(listener) => tokio::spawn(async move {
                axum::serve(listener, make_service)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown.await;
                    })
                    .await
            }),
            ServableListener::Tls { listener, config } => {
                let handle = axum_server::Handle::new();
                let watcher = handle.clone();
                tokio::spawn(async move {
                    let _ = shutdown.await;
                    watcher.graceful_shutdown(Some(TLS_SHUTDOWN_GRACE));
                });
                tokio::spawn(async move {
                    axum_server::from_tcp_rustls(listener, config)
                        .handle(handle)
                        .serve(make_service)
                        .await
                })
            }
        }
    }
}

/// A running server and everything it holds open
pub struct ListenerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
    session: Option<OverlaySession>,
}

impl ListenerHandle {
    /// Serve `app` on `listener`, taking ownership of an optional tailnet session
    pub fn spawn(
        listener: ServableListener,
        app: Router,
        session: Option<OverlaySession>,
    ) -> ServiceResult<Self> {
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = listener.serve(app, shutdown_rx);

        Ok(Self {
            local_addr,
            shutdown: Some(shutdown_tx),
            task: Some(task),
            session,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The tailnet session this listener holds, until closed
    pub fn session(&self) -> Option<&OverlaySession> {
        self.session.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_none() && self.task.is_none() && self.session.is_none()
    }

    /// Wait for the server to stop on its own (it normally runs until closed)
    pub async fn stopped(&mut self) -> ServiceResult<()> {
        match self.task.as_mut() {
            Some(task) => {
                let result = task.await;
                self.task = None;
                flatten(result)
            }
            None => Ok(()),
        }
    }

    /// Stop accepting, drain the server and release the socket and any
    /// tailnet session. Calling it again is a no-op.
    pub async fn close(&mut self) -> ServiceResult<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        let result = match self.task.take() {
            Some(task) => flatten(task.await),
            None => Ok(()),
        };

        if let Some(mut session) = self.session.take() {
            session.close();
        }

        if result.is_ok() {
            info!(addr = %self.local_addr, "listener closed");
        }
        result
    }
}

fn flatten(
    result: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> ServiceResult<()> {
    match result {
        Ok(served) => served.map_err(|e| ServiceError::Internal(format!("Server error: {}", e))),
        Err(e) => Err(ServiceError::Internal(format!("Server task failed: {}", e))),
    }
}

/// Start the configured transport and serve the router on it
pub async fn start(ctx: AppContext) -> ServiceResult<ListenerHandle> {
    let app = build_router(ctx.clone());

    let handle = match &ctx.config.transport {
        TransportMode::Direct { port } => {
            let addr = SocketAddr::from(([0, 0, 0, 0], *port));
            let listener = TcpListener::bind(addr).await.map_err(|e| {
                ServiceError::BootstrapFatal(format!("Failed to bind to {}: {}", addr, e))
            })?;
            ListenerHandle::spawn(ServableListener::Plain(listener), app, None)?
        }
        TransportMode::Overlay(overlay) => {
            let client = LocalApiClient::new(ctx.config.identity.socket_path.clone());
            let session = OverlaySession::join(client, overlay).await?;
            let listener = session.listener(overlay.tls).await?;
            ListenerHandle::spawn(listener, app, Some(session))?
        }
    };

    let scheme = match &ctx.config.transport {
        TransportMode::Overlay(overlay) if overlay.tls => "https",
        _ => "http",
    };
    info!("tailwho listening on {}://{}/", scheme, handle.local_addr());
    if let Some(dns_name) = handle.session().and_then(OverlaySession::dns_name) {
        info!("tailnet name: {}://{}/", scheme, dns_name);
    }
    Ok(handle)
}

/// Serve until `shutdown` resolves or the server stops by itself, then close
///
/// A server that stopped with an error is reported as that error even though
/// the close afterwards succeeds.
pub async fn run_until<F>(mut handle: ListenerHandle, shutdown: F) -> ServiceResult<()>
where
    F: Future<Output = ()>,
{
    let stopped = tokio::select! {
        _ = shutdown => {
            info!("shutdown signal received");
            Ok(())
        }
        result = handle.stopped() => {
            if let Err(e) = &result {
                error!(error = %e, "server stopped unexpectedly");
            }
            result
        }
    };

    let closed = handle.close().await;
    stopped.and(closed)
}

/// Resolves on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
