//! Cross-Sell Scoring Service - Main Entry Point
//!
//! Loads the ONNX model and its metadata, then serves the scoring API.
//! A missing or broken model does not stop the server: it starts
//! unavailable and waits for `/api/model/reload`.

use anyhow::{Context, Result};
use cross_sell_scoring::{
    api::{create_app, AppState},
    config::{AppConfig, LoggingConfig},
    metrics::{MetricsReporter, ScoringMetrics},
    models::ScoringEngine,
    producer::PredictionPublisher,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!(
            "cross_sell_scoring={level},cross_sell_server={level},tower_http={level}",
            level = logging.level
        ))
    })?;

    if logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;
    init_tracing(&config.logging)?;

    info!("Starting Cross-Sell Scoring Service");
    info!(
        model_path = %config.model.model_path,
        threshold = config.scoring.threshold,
        max_batch_size = config.scoring.max_batch_size,
        "Configuration loaded"
    );

    let metrics = Arc::new(ScoringMetrics::new());

    // Load the model; failure leaves the service unavailable rather than down
    let state = match ScoringEngine::from_config(&config.model, &config.scoring) {
        Ok(engine) => {
            info!(
                model = %engine.model_name(),
                features = engine.feature_names().len(),
                threshold = engine.threshold(),
                "Model loaded"
            );
            AppState::new(Some(engine), config.clone(), metrics.clone(), None)
        }
        Err(e) => {
            let reason = format!("{:#}", e);
            error!(
                error = %reason,
                "Model failed to load; serving in unavailable state until /api/model/reload succeeds"
            );
            AppState::unavailable(config.clone(), metrics.clone(), reason)
        }
    };

    // Optional prediction event stream
    let publisher = if config.publisher.enabled {
        match PredictionPublisher::connect(&config.publisher.nats_url, &config.publisher.subject)
            .await
        {
            Ok(publisher) => Some(publisher),
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Prediction events disabled");
                None
            }
        }
    } else {
        None
    };
    let state = Arc::new(state.with_publisher(publisher));

    // Start metrics reporter (prints summary every 60 seconds)
    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        let reporter = MetricsReporter::new(metrics_clone, 60);
        reporter.start().await;
    });

    let app = create_app(state);
    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Print final summary
    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}
