//! Shared server state.
//!
//! The scoring engine lives in a replaceable slot: empty while no model is
//! loaded (every scoring endpoint answers 503), filled at startup or through
//! `/api/model/reload`.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::info;

use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::metrics::ScoringMetrics;
use crate::models::ScoringEngine;
use crate::producer::PredictionPublisher;

/// State shared by all handlers.
pub struct AppState {
    engine: RwLock<Option<Arc<ScoringEngine>>>,
    /// Reason the engine slot is empty
    unavailable_reason: RwLock<String>,
    pub metrics: Arc<ScoringMetrics>,
    pub publisher: Option<PredictionPublisher>,
    pub config: AppConfig,
    start_time: Instant,
}

impl AppState {
    pub fn new(
        engine: Option<ScoringEngine>,
        config: AppConfig,
        metrics: Arc<ScoringMetrics>,
        publisher: Option<PredictionPublisher>,
    ) -> Self {
        Self {
            engine: RwLock::new(engine.map(Arc::new)),
            unavailable_reason: RwLock::new("no model loaded".to_string()),
            metrics,
            publisher,
            config,
            start_time: Instant::now(),
        }
    }

    /// State with no model loaded, remembering why.
    pub fn unavailable(config: AppConfig, metrics: Arc<ScoringMetrics>, reason: String) -> Self {
        let state = Self::new(None, config, metrics, None);
        Self {
            unavailable_reason: RwLock::new(reason),
            ..state
        }
    }

    /// Attach a prediction publisher.
    pub fn with_publisher(mut self, publisher: Option<PredictionPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// The loaded engine, or 503 when none is.
    pub async fn engine(&self) -> Result<Arc<ScoringEngine>, AppError> {
        match self.engine.read().await.as_ref() {
            Some(engine) => Ok(Arc::clone(engine)),
            None => Err(AppError::Unavailable(format!(
                "model unavailable: {}",
                self.unavailable_reason.read().await
            ))),
        }
    }

    pub async fn is_ready(&self) -> bool {
        self.engine.read().await.is_some()
    }

    pub async fn unavailable_reason(&self) -> Option<String> {
        if self.is_ready().await {
            None
        } else {
            Some(self.unavailable_reason.read().await.clone())
        }
    }

    /// Swap in a freshly loaded engine. In-flight requests keep the old one.
    pub async fn install_engine(&self, engine: ScoringEngine) -> Arc<ScoringEngine> {
        let engine = Arc::new(engine);
        let previous = self.engine.write().await.replace(Arc::clone(&engine));
        let replaced = previous.as_ref().map(|p| p.model_name()).unwrap_or("none");
        info!(
            model = %engine.model_name(),
            replaced = %replaced,
            "Scoring engine installed"
        );
        engine
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
