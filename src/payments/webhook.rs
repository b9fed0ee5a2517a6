//! PayMongo webhook payloads and signatures.

use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde_json::Value;
use sha2::Sha256;

use crate::domain::aggregates::PaymentInfo;
use crate::domain::value_objects::Money;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Paymongo-Signature";

/// Event types that mean money was received.
pub const PAID_EVENTS: [&str; 3] = ["payment.paid", "link.payment.paid", "checkout_session.payment.paid"];

/// A parsed webhook delivery.
#[derive(Clone, Debug, PartialEq)]
pub struct PaymentEvent {
    pub event_type: String,
    link_id: Option<String>,
    payment: PaymentInfo,
}

impl PaymentEvent {
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        let event: Value = serde_json::from_str(body)?;
        let data = &event["data"];
        let attributes = &data["attributes"];
        let event_type = attributes["type"].as_str().unwrap_or("unknown").to_string();

        let link_id = non_empty(&attributes["data"]["id"]).or_else(|| non_empty(&attributes["id"]));

        let nested = &attributes["data"]["attributes"];
        let payment_data = if nested.is_object() { nested } else { attributes };
        let minor_units = payment_data["amount"].as_i64().unwrap_or(0);
        let id = non_empty(&payment_data["id"]).or_else(|| non_empty(&data["id"])).unwrap_or_else(|| "unknown".to_string());
        let method = non_empty(&payment_data["source"]["type"])
            .or_else(|| non_empty(&payment_data["payment_method_used"]))
            .unwrap_or_else(|| "unknown".to_string());

        let amount: Decimal = Money::from_minor_units(minor_units, Money::PHP).amount();
        Ok(Self { event_type, link_id, payment: PaymentInfo { id, method, amount } })
    }

    pub fn is_payment(&self) -> bool { PAID_EVENTS.contains(&self.event_type.as_str()) }
    pub fn link_id(&self) -> Option<&str> { self.link_id.as_deref() }
    pub fn payment(&self) -> &PaymentInfo { &self.payment }
}

fn non_empty(value: &Value) -> Option<String> {
    value.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

/// Checks a `t=<ts>,te=<test sig>,li=<live sig>` header against the raw body.
pub fn verify_signature(secret: &str, header: &str, body: &str) -> bool {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("te" | "li", value)) if !value.is_empty() => candidates.push(value),
            _ => {}
        }
    }
    let Some(timestamp) = timestamp else { return false };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else { return false };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());

    candidates.into_iter().filter_map(|sig| hex::decode(sig).ok()).any(|sig| mac.clone().verify_slice(&sig).is_ok())
}

#[cfg(test)]
pub(crate) fn sign(secret: &str, timestamp: &str, body: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.{body}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINK_PAID: &str = r#"{
        "data": {
            "id": "evt_1",
            "attributes": {
                "type": "link.payment.paid",
                "data": {
                    "id": "link_abc",
                    "attributes": { "amount": 60050, "source": { "type": "gcash" } }
                }
            }
        }
    }"#;

    #[test]
    fn test_parse_link_payment() {
        let event = PaymentEvent::parse(LINK_PAID).unwrap();
        assert!(event.is_payment());
        assert_eq!(event.link_id(), Some("link_abc"));
        assert_eq!(event.payment().amount, Decimal::new(60050, 2));
        assert_eq!(event.payment().method, "gcash");
        assert_eq!(event.payment().id, "evt_1");
    }

    #[test]
    fn test_link_id_falls_back_to_attributes() {
        let body = r#"{"data":{"attributes":{"type":"payment.paid","id":"link_flat","amount":100,"payment_method_used":"card"}}}"#;
        let event = PaymentEvent::parse(body).unwrap();
        assert_eq!(event.link_id(), Some("link_flat"));
        assert_eq!(event.payment().method, "card");
        assert_eq!(event.payment().amount, Decimal::ONE);
    }

    #[test]
    fn test_other_events_are_not_payments() {
        let event = PaymentEvent::parse(r#"{"data":{"attributes":{"type":"source.chargeable"}}}"#).unwrap();
        assert!(!event.is_payment());
        assert!(PaymentEvent::parse("{not json").is_err());
    }

    #[test]
    fn test_signature_check() {
        let sig = sign("whsk_test", "1700000000", LINK_PAID);
        assert!(verify_signature("whsk_test", &format!("t=1700000000,te={sig},li="), LINK_PAID));
        assert!(verify_signature("whsk_test", &format!("t=1700000000,te=,li={sig}"), LINK_PAID));
        assert!(!verify_signature("whsk_other", &format!("t=1700000000,te={sig},li="), LINK_PAID));
        assert!(!verify_signature("whsk_test", &format!("t=1700000001,te={sig},li="), LINK_PAID));
        assert!(!verify_signature("whsk_test", &format!("te={sig}"), LINK_PAID));
    }
}
