//! # Roomcast Server
//!
//! Realtime room broadcast server with encrypted room content storage.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! roomcast
//!
//! # Run with a specific config file
//! ROOMCAST_CONFIG=/path/to/roomcast.toml roomcast
//!
//! # Override settings with environment variables
//! ROOMCAST_PORT=8080 ROOMCAST_HOST=0.0.0.0 ROOMCAST_DELIVERY__POLICY=disconnect roomcast
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomcast=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Roomcast server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}
