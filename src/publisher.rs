//! Domain event publishing.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::events::DomainEvent;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to publish event: {0}")]
    Transport(String),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError>;
}

/// Publishes events that were raised by a committed unit of work.
///
/// The change is already durable, so a failed publish is logged and skipped.
pub async fn publish_all(publisher: &dyn EventPublisher, events: Vec<DomainEvent>) {
    for event in events {
        if let Err(e) = publisher.publish(&event).await {
            tracing::warn!(subject = event.subject(), error = %e, "event not published");
        }
    }
}

pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }

    pub async fn connect(url: &str) -> Result<Self, PublishError> {
        let client = async_nats::connect(url).await.map_err(|e| PublishError::Transport(e.to_string()))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;
        self.client
            .publish(event.subject().to_string(), payload.into())
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))
    }
}

/// Writes events to the log. Used when no broker is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_string(event)?;
        tracing::info!(subject = event.subject(), %payload, "domain event");
        Ok(())
    }
}
