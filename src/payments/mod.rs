//! Online payments: hosted checkout links and the gateway webhook.

pub mod webhook;

use std::sync::Arc;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::aggregates::OrderStage;
use crate::domain::value_objects::Money;
use crate::ports::{EventPublisher, PaymentError, PaymentGateway, PaymentLinkRequest, PostPaymentHook, RecordStore, StoreError};
use webhook::PaymentEvent;

#[derive(Debug, Deserialize)]
pub struct CreatePayment {
    #[serde(default)]
    pub amount_php: Option<Decimal>,
    #[serde(rename = "orderId")]
    pub order_id: Option<Uuid>,
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutLink {
    pub checkout_url: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Error)]
pub enum PaymentServiceError {
    #[error("amount_php and orderId required")]
    MissingFields,
    #[error("amount must be positive")]
    NonPositiveAmount,
    #[error(transparent)]
    Gateway(#[from] PaymentError),
    #[error("failed to store payment link: {0}")]
    Store(#[from] StoreError),
}

/// What a webhook delivery did. Maps onto the reply status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    Confirmed { order_id: Uuid },
    /// The order was already confirmed by an earlier delivery.
    Duplicate { order_id: Uuid },
    Ignored { event_type: String },
    InvalidSignature,
    Malformed,
    MissingLinkId,
    OrderNotFound { link_id: String },
    StoreFailure,
}

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn RecordStore>,
    gateway: Arc<dyn PaymentGateway>,
    hook: Arc<dyn PostPaymentHook>,
    events: Option<Arc<dyn EventPublisher>>,
    webhook_secret: Option<SecretString>,
}

impl PaymentService {
    pub fn new(store: Arc<dyn RecordStore>, gateway: Arc<dyn PaymentGateway>, hook: Arc<dyn PostPaymentHook>) -> Self {
        Self { store, gateway, hook, events: None, webhook_secret: None }
    }

    pub fn with_publisher(mut self, events: Arc<dyn EventPublisher>) -> Self { self.events = Some(events); self }

    /// Require a valid `Paymongo-Signature` on every webhook delivery.
    pub fn with_webhook_secret(mut self, secret: SecretString) -> Self { self.webhook_secret = Some(secret); self }

    #[instrument(skip(self, request), fields(order_id))]
    pub async fn create_payment_link(&self, request: CreatePayment) -> Result<CheckoutLink, PaymentServiceError> {
        let (Some(amount), Some(order_id)) = (request.amount_php, request.order_id) else {
            return Err(PaymentServiceError::MissingFields);
        };
        tracing::Span::current().record("order_id", tracing::field::display(order_id));
        if amount <= Decimal::ZERO {
            return Err(PaymentServiceError::NonPositiveAmount);
        }

        let mut metadata = request.metadata.unwrap_or_default();
        metadata.insert("order_id".to_string(), Value::String(order_id.to_string()));
        let link_request = PaymentLinkRequest {
            amount: Money::php(amount),
            order_id,
            description: request.description.filter(|d| !d.is_empty()).unwrap_or_else(|| format!("Order {order_id}")),
            metadata,
        };

        let link = self.gateway.create_link(&link_request).await?;
        if self.store.attach_payment_link(order_id, &link.id).await? {
            info!(link_id = %link.id, "stored payment link on order");
        } else {
            warn!(link_id = %link.id, "no order row to attach payment link to");
        }
        Ok(CheckoutLink { checkout_url: link.checkout_url, raw: link.raw })
    }

    #[instrument(skip_all)]
    pub async fn handle_webhook(&self, body: &str, signature: Option<&str>) -> WebhookOutcome {
        if let Some(secret) = &self.webhook_secret {
            let valid = signature.is_some_and(|header| webhook::verify_signature(secret.expose_secret(), header, body));
            if !valid {
                warn!("rejecting webhook with invalid signature");
                return WebhookOutcome::InvalidSignature;
            }
        }

        let event = match PaymentEvent::parse(body) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "malformed webhook payload");
                return WebhookOutcome::Malformed;
            }
        };
        info!(event_type = %event.event_type, "payment event received");

        if !event.is_payment() {
            info!(event_type = %event.event_type, "ignored non-payment event");
            return WebhookOutcome::Ignored { event_type: event.event_type };
        }

        let Some(link_id) = event.link_id() else {
            warn!("missing link id in webhook payload");
            return WebhookOutcome::MissingLinkId;
        };

        let mut order = match self.store.find_order_by_payment_link(link_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                warn!(link_id, "no matching order for link id");
                return WebhookOutcome::OrderNotFound { link_id: link_id.to_string() };
            }
            Err(e) => {
                error!(link_id, error = %e, "order lookup failed");
                return WebhookOutcome::StoreFailure;
            }
        };
        let order_id = order.id();

        if !order.confirm_payment(event.payment().clone()) {
            info!(%order_id, "payment already confirmed");
            return WebhookOutcome::Duplicate { order_id };
        }
        match self.store.confirm_payment(&order).await {
            Ok(true) => info!(%order_id, "order marked as paid"),
            Ok(false) => {
                info!(%order_id, "payment confirmed by a concurrent delivery");
                return WebhookOutcome::Duplicate { order_id };
            }
            Err(e) => {
                error!(%order_id, error = %e, "order payment update failed");
                return WebhookOutcome::StoreFailure;
            }
        }

        if matches!(order.stage(), OrderStage::Declined | OrderStage::Cancelled) {
            warn!(%order_id, stage = %order.stage(), "payment received for a closed order, skipping post-payment processing");
        } else {
            match self.hook.complete_order_payment(order_id).await {
                Ok(result) => info!(%order_id, result = %result, "post-payment processing completed"),
                Err(e) => error!(%order_id, error = %e, "post-payment processing failed"),
            }
        }

        if let Some(publisher) = &self.events {
            for event in order.take_events() {
                if let Err(e) = publisher.publish(&event).await {
                    warn!(subject = event.subject(), error = %e, "failed to publish payment event");
                }
            }
        }

        WebhookOutcome::Confirmed { order_id }
    }
}
