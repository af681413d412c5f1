/// Tailnet session management
///
/// Joins the tailnet through tailscaled, then hands out a listener bound on
/// the node's tailnet address: HTTPS on 443 with a certificate provisioned
/// by tailscaled, or plain HTTP on 80.
use crate::{
    config::OverlayConfig,
    error::{ServiceError, ServiceResult},
    identity::agent::{AgentError, LocalApiClient, Status},
    server::ServableListener,
};
use axum_server::tls_rustls::RustlsConfig;
use std::{net::IpAddr, time::Duration};
use tokio::net::TcpListener;
use tracing::{info, warn};

const HTTPS_PORT: u16 = 443;
const HTTP_PORT: u16 = 80;
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// An established tailnet presence
pub struct OverlaySession {
    client: Option<LocalApiClient>,
    hostname: String,
    dns_name: Option<String>,
    ip: IpAddr,
}

impl OverlaySession {
    /// Register `hostname` on the tailnet and wait for the backend to run
    pub async fn join(client: LocalApiClient, config: &OverlayConfig) -> ServiceResult<Self> {
        info!(
            hostname = %config.hostname,
            socket = %client.socket_path().display(),
            "joining tailnet"
        );

        client
            .set_hostname(&config.hostname)
            .await
            .map_err(|e| fatal("could not set tailnet hostname", e))?;

        if let Some(auth_key) = &config.auth_key {
            client
                .start(auth_key)
                .await
                .map_err(|e| fatal("could not start tailnet login", e))?;
        }

        let status = tokio::time::timeout(config.join_timeout, wait_until_running(&client))
            .await
            .map_err(|_| {
                ServiceError::BootstrapFatal(format!(
                    "tailnet backend not running after {:?}",
                    config.join_timeout
                ))
            })??;

        let ip = status.primary_ip().ok_or_else(|| {
            ServiceError::BootstrapFatal("tailnet node has no addresses".to_string())
        })?;
        let dns_name = status.dns_name().map(str::to_string);

        info!(%ip, dns_name = dns_name.as_deref(), "joined tailnet");

        Ok(Self {
            client: Some(client),
            hostname: config.hostname.clone(),
            dns_name,
            ip,
        })
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn dns_name(&self) -> Option<&str> {
        self.dns_name.as_deref()
    }

    /// Bind the session's listener: HTTPS on 443 or plain HTTP on 80
    pub async fn listener(&self, tls: bool) -> ServiceResult<ServableListener> {
        let port = if tls { HTTPS_PORT } else { HTTP_PORT };
        self.listener_on(tls, port).await
    }

    pub(crate) async fn listener_on(&self, tls: bool, port: u16) -> ServiceResult<ServableListener> {
        let client = self.client.as_ref().ok_or_else(|| {
            ServiceError::BootstrapFatal("tailnet session already closed".to_string())
        })?;

        if !tls {
            let listener = bind(self.ip, port).await?;
            return Ok(ServableListener::Plain(listener));
        }

        let domain = self.dns_name.as_deref().ok_or_else(|| {
            ServiceError::BootstrapFatal(
                "tailnet node has no MagicDNS name; cannot provision a certificate".to_string(),
            )
        })?;
        let pair = client
            .cert_pair(domain)
            .await
            .map_err(|e| fatal("could not provision TLS certificate", e))?;
        let config = RustlsConfig::from_pem(pair.cert_pem, pair.key_pem)
            .await
            .map_err(|e| ServiceError::BootstrapFatal(format!("invalid TLS certificate: {}", e)))?;

        let listener = bind(self.ip, port).await?.into_std()?;
        Ok(ServableListener::Tls { listener, config })
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_none()
    }

    /// Release the session; later calls do nothing
    pub fn close(&mut self) {
        if self.client.take().is_some() {
            info!(hostname = %self.hostname, "tailnet session closed");
        }
    }
}

async fn wait_until_running(client: &LocalApiClient) -> ServiceResult<Status> {
    let mut announced_login = false;
    loop {
        let status = client
            .status()
            .await
            .map_err(|e| fatal("could not read tailnet status", e))?;
        if status.is_running() {
            return Ok(status);
        }
        if !announced_login && !status.auth_url.is_empty() {
            warn!(auth_url = %status.auth_url, "tailnet login required; visit the URL or pass --auth-key");
            announced_login = true;
        }
        tokio::time::sleep(STATUS_POLL_INTERVAL).await;
    }
}

async fn bind(ip: IpAddr, port: u16) -> ServiceResult<TcpListener> {
    TcpListener::bind((ip, port))
        .await
        .map_err(|e| ServiceError::BootstrapFatal(format!("failed to bind {}:{}: {}", ip, port, e)))
}

fn fatal(context: &str, err: AgentError) -> ServiceError {
    ServiceError::BootstrapFatal(format!("{}: {}", context, err))
}
