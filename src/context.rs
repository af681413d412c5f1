/// Application context and dependency injection
use crate::{
    config::ServerConfig,
    error::ServiceResult,
    identity::{IdentityAgent, IdentityResolver, IdentityResolverConfig, LocalApiClient},
    metrics::Metrics,
    ui::Templates,
};
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub identity_resolver: Arc<IdentityResolver>,
    pub templates: Arc<Templates>,
    pub metrics: Arc<Metrics>,
}

impl AppContext {
    /// Create a new application context backed by the local tailscaled
    pub fn new(config: ServerConfig) -> ServiceResult<Self> {
        let agent = Arc::new(LocalApiClient::new(config.identity.socket_path.clone()));
        Self::with_agent(config, agent)
    }

    /// Create a context with a specific identity-lookup agent
    pub fn with_agent(config: ServerConfig, agent: Arc<dyn IdentityAgent>) -> ServiceResult<Self> {
        // Validate configuration
        config.validate()?;

        let metrics = Arc::new(Metrics::new()?);

        let identity_resolver = Arc::new(IdentityResolver::new(
            agent,
            Arc::clone(&metrics),
            IdentityResolverConfig {
                lookup_timeout: config.identity.lookup_timeout,
            },
        ));

        let templates = if config.ui.dev {
            tracing::info!(dir = %config.ui.dir.display(), "dev mode: serving ui from disk");
            Templates::live(config.ui.dir.clone())
        } else {
            Templates::embedded()?
        };

        Ok(Self {
            config: Arc::new(config),
            identity_resolver,
            templates: Arc::new(templates),
            metrics,
        })
    }
}
