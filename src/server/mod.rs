//! ExoAI prediction API
//!
//! Serves single and batch predictions, validation metrics, feature
//! importances and the mission dataset browser over HTTP.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: String,
    pub models_dir: String,
    /// Labelled CSV scored by `/metrics`
    pub validation_csv: String,
    pub max_upload_size: usize,
    pub cors_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            validation_csv: std::env::var("VALIDATION_CSV")
                .unwrap_or_else(|_| format!("{}/validation.csv", data_dir.trim_end_matches('/'))),
            data_dir,
            models_dir: std::env::var("MODELS_DIR").unwrap_or_else(|_| "./models".to_string()),
            max_upload_size: std::env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100 * 1024 * 1024), // 100MB
            cors_origin: std::env::var("CORS_ORIGIN").ok(),
        }
    }
}

impl ServerConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_models_dir(mut self, dir: impl Into<String>) -> Self {
        self.models_dir = dir.into();
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<String>) -> Self {
        self.data_dir = dir.into();
        self
    }
}

/// Start the server with the given configuration
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();
    info!(
        data_dir = %config.data_dir,
        models_dir = %config.models_dir,
        validation_csv = %config.validation_csv,
        "Loading model artifacts"
    );

    // Missing artifacts are fatal; the API never serves without a model
    let state = Arc::new(AppState::load(config.clone())?);
    info!(
        classes = ?state.predictor.class_names(),
        trained_at = %state.trained_at().to_rfc3339(),
        "Artifacts loaded"
    );
    if !std::path::Path::new(&config.validation_csv).exists() {
        warn!(path = %config.validation_csv, "Validation CSV not found, /metrics will return 404");
    }

    let app = create_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        address = %addr,
        max_upload_size_mb = config.max_upload_size / 1024 / 1024,
        pid = std::process::id(),
        "ExoAI API listening"
    );

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
        let uptime = chrono::Utc::now().signed_duration_since(start_time);
        info!(uptime_secs = uptime.num_seconds(), "Shutdown signal received, stopping server gracefully");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_upload_size, 100 * 1024 * 1024);
        assert!(config.validation_csv.ends_with("validation.csv"));
    }

    #[test]
    fn test_builder_overrides() {
        let config = ServerConfig::default().with_host("127.0.0.1").with_port(9000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
    }
}
