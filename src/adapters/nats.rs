//! NATS domain event publisher.

use async_trait::async_trait;
use tracing::debug;

use crate::domain::events::DomainEvent;
use crate::ports::{EventPublisher, PublishError};

#[derive(Clone)]
pub struct NatsPublisher { client: async_nats::Client }

impl NatsPublisher {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }

    pub async fn connect(url: &str) -> Result<Self, async_nats::ConnectError> {
        Ok(Self::new(async_nats::connect(url).await?))
    }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;
        self.client.publish(event.subject(), payload.into()).await.map_err(|e| PublishError::Transport(e.to_string()))?;
        debug!(subject = event.subject(), "domain event published");
        Ok(())
    }
}
