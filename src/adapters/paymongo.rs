//! PayMongo payment links.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::config::PaymongoConfig;
use crate::ports::{PaymentError, PaymentGateway, PaymentLink, PaymentLinkRequest};

pub struct PaymongoGateway {
    client: reqwest::Client,
    api_base: String,
    secret: SecretString,
}

impl PaymongoGateway {
    pub fn new(config: &PaymongoConfig) -> Self {
        Self { client: reqwest::Client::new(), api_base: config.api_base.clone(), secret: config.secret.clone() }
    }
}

fn link_payload(request: &PaymentLinkRequest) -> Result<Value, PaymentError> {
    Ok(json!({
        "data": {
            "attributes": {
                "amount": request.amount.to_minor_units()?,
                "currency": request.amount.currency(),
                "description": request.description,
                "metadata": request.metadata,
            }
        }
    }))
}

fn parse_link(raw: Value) -> Result<PaymentLink, PaymentError> {
    let id = raw["data"]["id"].as_str().filter(|id| !id.is_empty()).ok_or(PaymentError::MissingLinkId)?.to_string();
    let checkout_url = raw["data"]["attributes"]["checkout_url"].as_str().map(str::to_string);
    Ok(PaymentLink { id, checkout_url, raw })
}

#[async_trait]
impl PaymentGateway for PaymongoGateway {
    async fn create_link(&self, request: &PaymentLinkRequest) -> Result<PaymentLink, PaymentError> {
        let payload = link_payload(request)?;
        debug!(order_id = %request.order_id, amount = %request.amount, "creating payment link");

        let response = self
            .client
            .post(format!("{}/links", self.api_base))
            .basic_auth(self.secret.expose_secret(), None::<&str>)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            error!(order_id = %request.order_id, status = status.as_u16(), "gateway rejected payment link");
            return Err(PaymentError::Rejected { status: status.as_u16(), body });
        }
        parse_link(body)
    }
}
