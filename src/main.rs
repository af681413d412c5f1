/// tailwho - tailnet identity demo service
use tailwho::{config::ServerConfig, context::AppContext, error::ServiceResult, server};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ServiceResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tailwho=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    if let Err(e) = run().await {
        error!(error = %e, "tailwho failed");
        return Err(e);
    }
    Ok(())
}

async fn run() -> ServiceResult<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;
    info!(transport = ?config.transport, dev = config.ui.dev, "configuration loaded");

    let ctx = AppContext::new(config)?;

    // Startup failures are fatal; nothing is left half-running
    let handle = server::start(ctx).await?;

    server::run_until(handle, server::shutdown_signal()).await
}

fn print_banner() {
    println!(
        r#"
   _        _ _           _
  | |_ __ _(_) |_      __| |__   ___
  | __/ _` | | \ \ /\ / /| '_ \ / _ \
  | || (_| | | |\ V  V / | | | | (_) |
   \__\__,_|_|_| \_/\_/  |_| |_|\___/

        tailnet identity demo v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
