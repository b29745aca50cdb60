//! Application state management

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::dataset::DatasetBrowser;
use crate::error::Result;
use crate::export::{ArtifactBundle, ArtifactPaths};
use crate::inference::Predictor;

use super::ServerConfig;

/// Application state shared across handlers.
///
/// Everything here is read-only after startup; the artifact bundle is shared
/// through an `Arc` and never locked.
pub struct AppState {
    pub config: ServerConfig,
    pub predictor: Predictor,
    pub browser: DatasetBrowser,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ServerConfig, bundle: Arc<ArtifactBundle>) -> Self {
        let browser = DatasetBrowser::new(&config.data_dir);
        Self {
            config,
            predictor: Predictor::new(bundle),
            browser,
            started_at: Utc::now(),
        }
    }

    /// Load the artifacts from the configured models directory
    pub fn load(config: ServerConfig) -> Result<Self> {
        let bundle = ArtifactBundle::load(&ArtifactPaths::new(&config.models_dir))?;
        Ok(Self::new(config, Arc::new(bundle)))
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.predictor.bundle().model.trained_at
    }
}
