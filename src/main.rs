use anyhow::Result;
use mediakit::{config::Config, web, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting media kit service");

    // Load configuration from environment (read once, injected everywhere)
    let config = Config::load()?;
    tracing::info!(
        environment = ?config.environment,
        provider_configured = config.provider.is_some(),
        public_site_url = ?config.public_site_url,
        deployment_host = ?config.deployment_host,
        "Configuration loaded"
    );

    let bind_address = config.bind_address();

    // Create shared application state
    let state = Arc::new(AppState::from_config(config)?);

    let app = web::create_router(state);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Media kit listening on {}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
