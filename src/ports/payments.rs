//! Payment gateway, post-payment hook and event publishing capabilities.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::events::DomainEvent;
use crate::domain::value_objects::Money;

/// Request for a hosted checkout link.
#[derive(Clone, Debug)]
pub struct PaymentLinkRequest {
    pub amount: Money,
    pub order_id: Uuid,
    pub description: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Gateway reply: the correlation id later echoed by the webhook.
#[derive(Clone, Debug)]
pub struct PaymentLink {
    pub id: String,
    pub checkout_url: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("gateway rejected request ({status})")]
    Rejected { status: u16, body: serde_json::Value },
    #[error("gateway unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] crate::domain::value_objects::MoneyError),
    #[error("gateway reply missing link id")]
    MissingLinkId,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_link(&self, request: &PaymentLinkRequest) -> Result<PaymentLink, PaymentError>;
}

/// Business logic run once a payment has been confirmed on an order.
#[async_trait]
pub trait PostPaymentHook: Send + Sync {
    async fn complete_order_payment(&self, order_id: Uuid) -> Result<serde_json::Value, crate::ports::StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("publish event: {0}")]
    Transport(String),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError>;
}
