/// Configuration management for tailwho
use crate::{
    error::{ServiceError, ServiceResult},
    identity::agent::DEFAULT_SOCKET_PATH,
};
use clap::Parser;
use std::{fmt, path::PathBuf, time::Duration};

/// Command line flags, each with an environment fallback
#[derive(Debug, Clone, Parser)]
#[command(name = "tailwho", version, about = "Shows tailnet visitors who they are")]
pub struct Cli {
    /// Port to listen on in direct mode
    #[arg(long, env = "TAILWHO_PORT", default_value_t = 80)]
    pub port: u16,

    /// Serve the page template and assets from disk
    #[arg(long, env = "TAILWHO_DEV")]
    pub dev: bool,

    /// Asset directory used in dev mode
    #[arg(long, env = "TAILWHO_UI_DIR", default_value = "ui")]
    pub ui_dir: PathBuf,

    /// Listen on the tailnet instead of a plain TCP port
    #[arg(long, env = "TAILWHO_OVERLAY")]
    pub overlay: bool,

    /// Tailnet hostname to register in overlay mode
    #[arg(long, env = "TAILWHO_HOSTNAME", default_value = "tailwho")]
    pub hostname: String,

    /// Auth key used to join the tailnet
    #[arg(long, env = "TS_AUTHKEY", hide_env_values = true)]
    pub auth_key: Option<String>,

    /// Serve HTTPS with a tailnet-provisioned certificate (overlay mode)
    #[arg(long, env = "TAILWHO_TLS")]
    pub tls: bool,

    /// tailscaled LocalAPI socket
    #[arg(long, env = "TAILWHO_LOCALAPI_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    pub socket: PathBuf,

    /// Upper bound on one whois lookup
    #[arg(long, env = "TAILWHO_LOOKUP_TIMEOUT_MS", default_value_t = 2000)]
    pub lookup_timeout_ms: u64,

    /// How long to wait for the tailnet backend to come up
    #[arg(long, env = "TAILWHO_JOIN_TIMEOUT_SECS", default_value_t = 60)]
    pub join_timeout_secs: u64,
}

/// Main server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub transport: TransportMode,
    pub ui: UiConfig,
    pub identity: IdentityConfig,
}

/// How the service is reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMode {
    /// Plain HTTP on a local TCP port
    Direct { port: u16 },
    /// Listener bound on the node's tailnet address
    Overlay(OverlayConfig),
}

/// Tailnet join settings
#[derive(Clone, PartialEq, Eq)]
pub struct OverlayConfig {
    pub hostname: String,
    pub auth_key: Option<String>,
    pub tls: bool,
    pub join_timeout: Duration,
}

impl fmt::Debug for OverlayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayConfig")
            .field("hostname", &self.hostname)
            .field("auth_key", &self.auth_key.as_ref().map(|_| "<redacted>"))
            .field("tls", &self.tls)
            .field("join_timeout", &self.join_timeout)
            .finish()
    }
}

/// Page and asset settings
#[derive(Debug, Clone)]
pub struct UiConfig {
    pub dev: bool,
    pub dir: PathBuf,
}

/// Identity lookup settings
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub socket_path: PathBuf,
    pub lookup_timeout: Duration,
}

impl ServerConfig {
    /// Load configuration from `.env`, the environment and the command line
    pub fn from_env() -> ServiceResult<Self> {
        dotenv::dotenv().ok();
        Self::from_cli(Cli::parse())
    }

    /// Build the typed configuration from parsed flags
    pub fn from_cli(cli: Cli) -> ServiceResult<Self> {
        if cli.tls && !cli.overlay {
            return Err(ServiceError::Config(
                "--tls requires --overlay".to_string(),
            ));
        }

        let transport = if cli.overlay {
            TransportMode::Overlay(OverlayConfig {
                hostname: cli.hostname,
                auth_key: cli.auth_key.filter(|k| !k.is_empty()),
                tls: cli.tls,
                join_timeout: Duration::from_secs(cli.join_timeout_secs),
            })
        } else {
            TransportMode::Direct { port: cli.port }
        };

        let config = ServerConfig {
            transport,
            ui: UiConfig {
                dev: cli.dev,
                dir: cli.ui_dir,
            },
            identity: IdentityConfig {
                socket_path: cli.socket,
                lookup_timeout: Duration::from_millis(cli.lookup_timeout_ms),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> ServiceResult<()> {
        if self.identity.lookup_timeout.is_zero() {
            return Err(ServiceError::Config(
                "Lookup timeout must be greater than zero".to_string(),
            ));
        }

        if let TransportMode::Overlay(overlay) = &self.transport {
            if overlay.hostname.trim().is_empty() {
                return Err(ServiceError::Config(
                    "Overlay hostname cannot be empty".to_string(),
                ));
            }
            if overlay.join_timeout.is_zero() {
                return Err(ServiceError::Config(
                    "Join timeout must be greater than zero".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ServiceResult<ServerConfig> {
        let mut argv = vec!["tailwho"];
        argv.extend_from_slice(args);
        ServerConfig::from_cli(Cli::try_parse_from(argv).unwrap())
    }

    #[test]
    fn test_direct_mode_port() {
        let config = parse(&["--port", "8080"]).unwrap();
        assert_eq!(config.transport, TransportMode::Direct { port: 8080 });
        assert!(!config.ui.dev);
    }

    #[test]
    fn test_overlay_mode() {
        let config = parse(&["--overlay", "--tls", "--hostname", "whoami"]).unwrap();
        match config.transport {
            TransportMode::Overlay(overlay) => {
                assert_eq!(overlay.hostname, "whoami");
                assert!(overlay.tls);
            }
            other => panic!("unexpected transport {:?}", other),
        }
    }

    #[test]
    fn test_tls_requires_overlay() {
        assert!(matches!(parse(&["--tls"]), Err(ServiceError::Config(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(parse(&["--lookup-timeout-ms", "0"]).is_err());
    }

    #[test]
    fn test_empty_hostname_rejected() {
        assert!(parse(&["--overlay", "--hostname", " "]).is_err());
    }

    #[test]
    fn test_auth_key_redacted() {
        let config = parse(&["--overlay", "--auth-key", "tskey-auth-secret"]).unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("tskey-auth-secret"));
        assert!(printed.contains("<redacted>"));
    }
}
