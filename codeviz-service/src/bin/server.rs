//! Code Visualizer server binary

use anyhow::{Context, Result};
use codeviz::CodevizConfig;
use codeviz::analyzer::Analyzer;
use codeviz::api::{ApiState, create_router};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_CONFIG: &str = "codeviz.toml";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // An explicit path must exist; the default one is optional
    let explicit = std::env::args().nth(1);
    let config_path = explicit.clone().unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = if explicit.is_some() || Path::new(&config_path).exists() {
        CodevizConfig::load(&config_path)
            .with_context(|| format!("Failed to load config: {}", config_path))?
    } else {
        CodevizConfig::default()
    };

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(tracing::Level::from(config.log_level))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Code Visualizer v{}", env!("CARGO_PKG_VERSION"));
    info!(
        config_path = config_path,
        provider = config.provider.provider_type,
        model = config.provider.model,
        "Loaded configuration"
    );

    let provider = config
        .build_provider()
        .context("Failed to create LLM provider")?;
    let credentials = Arc::new(config.credential_chain());
    let autoplay_interval_ms = config.server.autoplay_interval_ms;
    let bind = config.server.bind.clone();

    let analyzer = Analyzer::new(config, provider, credentials);
    if !analyzer.credential_available() {
        warn!(
            env = analyzer.config().provider.api_key_env,
            "No API key found; analysis requests will be refused until one is set"
        );
    }

    let state = Arc::new(ApiState {
        analyzer: Arc::new(analyzer),
        autoplay_interval_ms,
    });
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on {}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}
