//! NATS publisher for scored predictions

use crate::types::event::{PredictionEvent, PredictionSource};
use crate::types::score::{BatchScore, ScoreResult};
use anyhow::{Context, Result};
use async_nats::Client;
use tracing::{debug, error, info};

/// Publisher for prediction events
#[derive(Clone)]
pub struct PredictionPublisher {
    client: Client,
    subject: String,
}

impl PredictionPublisher {
    /// Create a new publisher on an existing connection
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Connect to NATS and create a publisher
    pub async fn connect(url: &str, subject: &str) -> Result<Self> {
        let client = async_nats::connect(url)
            .await
            .with_context(|| format!("Failed to connect to NATS at {}", url))?;
        info!(url = %url, subject = %subject, "Connected to NATS");
        Ok(Self::new(client, subject))
    }

    /// Publish a prediction event
    pub async fn publish(&self, event: &PredictionEvent) -> Result<()> {
        let payload = serde_json::to_vec(event)?;

        self.client
            .publish(self.subject.clone(), payload.into())
            .await?;

        debug!(
            prediction_id = %event.prediction_id,
            probability = event.probability,
            prediction = event.prediction,
            "Published prediction event"
        );

        Ok(())
    }

    /// Publish a single-record result. Failures are logged, not returned.
    pub async fn publish_result(&self, result: &ScoreResult) {
        let event = PredictionEvent::from_result(result, PredictionSource::Single);
        if let Err(e) = self.publish(&event).await {
            error!(
                prediction_id = %event.prediction_id,
                error = %e,
                "Failed to publish prediction event"
            );
        }
    }

    /// Publish every successful row of a batch. Failures are logged, not returned.
    pub async fn publish_batch(&self, batch: &BatchScore) {
        for outcome in &batch.predictions {
            let Some(result) = outcome.result() else {
                continue;
            };
            let event = PredictionEvent::from_result(result, PredictionSource::Batch)
                .with_batch_index(outcome.index());
            if let Err(e) = self.publish(&event).await {
                error!(
                    prediction_id = %event.prediction_id,
                    row = outcome.index(),
                    error = %e,
                    "Failed to publish prediction event"
                );
            }
        }
    }

    /// Get the subject name
    pub fn subject(&self) -> &str {
        &self.subject
    }
}
