//! The `gatehouse` binary.

use gatehouse::{Gateway, GatewayConfig, OidcProvider};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gatehouse=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (env, secrets) = gatehouse::bootstrap()?;
    if let Some(report) = secrets {
        tracing::info!(secrets = report.len(), "secret source processed");
    }

    let config = GatewayConfig::from_env(&env)?;
    tracing::info!(?config, "configuration loaded");

    let identity = OidcProvider::new(config.identity.oidc())?;
    let gateway = Gateway::builder()
        .config(&config)
        .build(identity, &config.session_secret)?;

    gateway.serve(&config.bind_address(), shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => tracing::error!(error = %e, "failed to listen for ctrl-c"),
    }
}
