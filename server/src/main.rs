mod error;
mod routes;
mod state;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;

use snapact::{load_config, Config};

use state::AppState;

/// Initializes tracing with an env-filter and bridges `log` records from
/// the core crate into the same subscriber.
fn init_tracing() {
    let _ = tracing_log::LogTracer::init();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Loads configuration from `$SNAPACT_CONFIG`, the first CLI argument, or
/// `snapact.json`. A missing file falls back to built-in defaults.
fn resolve_config() -> Result<Config, snapact::ConfigError> {
    let path = std::env::var("SNAPACT_CONFIG")
        .ok()
        .or_else(|| std::env::args().nth(1))
        .unwrap_or_else(|| "snapact.json".to_string());

    if std::path::Path::new(&path).exists() {
        info!("Loading configuration from {}", path);
        load_config(&path)
    } else {
        log::warn!("Config file {} not found, using defaults", path);
        snapact::config::load_config_from_str(r#"{"version": "1.0"}"#)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting snapact-server v{}", env!("CARGO_PKG_VERSION"));

    let config = resolve_config()?;
    let addr: SocketAddr = config.server.bind_addr.parse()?;

    let state = AppState::from_config(&config)?;
    let app = routes::router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
