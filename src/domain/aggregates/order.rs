//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::UserId;

#[derive(Clone, Debug)]
pub struct Order {
    id: Uuid,
    user_id: UserId,
    stage: OrderStage,
    payment_status: PaymentStatus,
    total: Decimal,
    grand_total: Option<Decimal>,
    payment_link_id: Option<String>,
    payment_info: Option<PaymentInfo>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    events: Vec<DomainEvent>,
}

/// Persisted shape of an order, used by store adapters to rebuild the aggregate.
#[derive(Clone, Debug)]
pub struct OrderRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub stage: OrderStage,
    pub payment_status: PaymentStatus,
    pub total: Decimal,
    pub grand_total: Option<Decimal>,
    pub payment_link_id: Option<String>,
    pub payment_info: Option<PaymentInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStage {
    #[default]
    Pending,
    Confirmed,
    #[serde(rename = "To Be Received")]
    ToBeReceived,
    Delivered,
    Declined,
    Cancelled,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus { #[default] Pending, Confirmed, Failed, Refunded }

/// Gateway payment details recorded when a payment completes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentInfo { pub id: String, pub method: String, pub amount: Decimal }

impl OrderStage {
    pub const ALL: [OrderStage; 6] = [Self::Pending, Self::Confirmed, Self::ToBeReceived, Self::Delivered, Self::Declined, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Confirmed => "Confirmed",
            Self::ToBeReceived => "To Be Received",
            Self::Delivered => "Delivered",
            Self::Declined => "Declined",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Declined | Self::Cancelled) }

    fn rank(&self) -> u8 {
        match self { Self::Pending => 0, Self::Confirmed => 1, Self::ToBeReceived => 2, Self::Delivered | Self::Declined | Self::Cancelled => 3 }
    }

    /// Forward moves along the fulfilment path, or to a terminal rejection from any live stage.
    pub fn can_transition_to(&self, next: OrderStage) -> bool {
        if self.is_terminal() { return false; }
        match next {
            Self::Declined | Self::Cancelled => true,
            _ => next.rank() > self.rank(),
        }
    }
}

impl fmt::Display for OrderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStage {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim())).ok_or_else(|| OrderError::UnknownStage(s.to_string()))
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "Pending", Self::Confirmed => "Confirmed", Self::Failed => "Failed", Self::Refunded => "Refunded" }
    }
}

impl FromStr for PaymentStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            other => Err(OrderError::UnknownPaymentStatus(other.to_string())),
        }
    }
}

impl Order {
    pub fn create(user_id: UserId, total: Decimal, grand_total: Option<Decimal>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), user_id, stage: OrderStage::Pending, payment_status: PaymentStatus::Pending,
            total, grand_total, payment_link_id: None, payment_info: None, created_at: now, updated_at: now, events: vec![],
        }
    }

    pub fn restore(record: OrderRecord) -> Self {
        Self {
            id: record.id, user_id: record.user_id, stage: record.stage, payment_status: record.payment_status,
            total: record.total, grand_total: record.grand_total, payment_link_id: record.payment_link_id,
            payment_info: record.payment_info, created_at: record.created_at, updated_at: record.updated_at, events: vec![],
        }
    }

    pub fn to_record(&self) -> OrderRecord {
        OrderRecord {
            id: self.id, user_id: self.user_id.clone(), stage: self.stage, payment_status: self.payment_status,
            total: self.total, grand_total: self.grand_total, payment_link_id: self.payment_link_id.clone(),
            payment_info: self.payment_info.clone(), created_at: self.created_at, updated_at: self.updated_at,
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> &UserId { &self.user_id }
    pub fn stage(&self) -> OrderStage { self.stage }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn total(&self) -> Decimal { self.total }
    pub fn grand_total(&self) -> Option<Decimal> { self.grand_total }
    pub fn payment_link_id(&self) -> Option<&str> { self.payment_link_id.as_deref() }
    pub fn payment_info(&self) -> Option<&PaymentInfo> { self.payment_info.as_ref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Amount the order counts for: the grand total when set, the plain total otherwise.
    pub fn amount(&self) -> Decimal {
        self.grand_total.filter(|g| !g.is_zero()).unwrap_or(self.total)
    }

    /// Moves the order to `next`. Returns `Ok(false)` when already there.
    pub fn set_stage(&mut self, next: OrderStage) -> Result<bool, OrderError> {
        if self.stage == next { return Ok(false); }
        if !self.stage.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from: self.stage, to: next });
        }
        let from = std::mem::replace(&mut self.stage, next);
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StageChanged { order_id: self.id, user_id: self.user_id.clone(), from, to: next }));
        Ok(true)
    }

    pub fn attach_payment_link(&mut self, link_id: impl Into<String>) { self.payment_link_id = Some(link_id.into()); self.touch(); }

    /// Records a completed gateway payment. Returns `false` when the payment was already confirmed.
    pub fn confirm_payment(&mut self, info: PaymentInfo) -> bool {
        if self.payment_status == PaymentStatus::Confirmed { return false; }
        self.payment_status = PaymentStatus::Confirmed;
        if self.stage == OrderStage::Pending {
            self.stage = OrderStage::Confirmed;
            self.raise_event(DomainEvent::Order(OrderEvent::StageChanged {
                order_id: self.id, user_id: self.user_id.clone(), from: OrderStage::Pending, to: OrderStage::Confirmed,
            }));
        }
        self.raise_event(DomainEvent::Order(OrderEvent::PaymentConfirmed { order_id: self.id, payment_id: info.id.clone(), amount: info.amount }));
        self.payment_info = Some(info);
        self.touch();
        true
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStage, to: OrderStage },
    #[error("unknown order stage: {0}")]
    UnknownStage(String),
    #[error("unknown payment status: {0}")]
    UnknownPaymentStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order { Order::create(UserId::new("u-1"), Decimal::new(500, 0), None) }

    #[test]
    fn test_order_workflow() {
        let mut order = order();
        assert!(order.set_stage(OrderStage::Confirmed).unwrap());
        assert!(order.set_stage(OrderStage::ToBeReceived).unwrap());
        assert!(order.set_stage(OrderStage::Delivered).unwrap());
        assert_eq!(order.stage(), OrderStage::Delivered);
        assert_eq!(order.take_events().len(), 3);
    }

    #[test]
    fn test_terminal_stages_are_final() {
        let mut order = order();
        order.set_stage(OrderStage::Cancelled).unwrap();
        assert_eq!(
            order.set_stage(OrderStage::Delivered),
            Err(OrderError::InvalidTransition { from: OrderStage::Cancelled, to: OrderStage::Delivered })
        );
        assert!(!order.set_stage(OrderStage::Cancelled).unwrap());
    }

    #[test]
    fn test_no_backward_moves() {
        let mut order = order();
        order.set_stage(OrderStage::ToBeReceived).unwrap();
        assert!(order.set_stage(OrderStage::Confirmed).is_err());
        assert!(order.set_stage(OrderStage::Declined).is_ok());
    }

    #[test]
    fn test_amount_prefers_grand_total() {
        let o = Order::create(UserId::new("u"), Decimal::new(100, 0), Some(Decimal::new(150, 0)));
        assert_eq!(o.amount(), Decimal::new(150, 0));
        let o = Order::create(UserId::new("u"), Decimal::new(100, 0), Some(Decimal::ZERO));
        assert_eq!(o.amount(), Decimal::new(100, 0));
    }

    #[test]
    fn test_payment_confirmation_applies_once() {
        let mut order = order();
        let info = PaymentInfo { id: "pay_1".into(), method: "gcash".into(), amount: Decimal::new(500, 0) };
        assert!(order.confirm_payment(info.clone()));
        assert_eq!(order.stage(), OrderStage::Confirmed);
        assert_eq!(order.payment_status(), PaymentStatus::Confirmed);
        assert_eq!(order.take_events().len(), 2);
        assert!(!order.confirm_payment(info));
        assert!(order.take_events().is_empty());
    }

    #[test]
    fn test_stage_parsing() {
        assert_eq!("To Be Received".parse::<OrderStage>().unwrap(), OrderStage::ToBeReceived);
        assert_eq!("delivered".parse::<OrderStage>().unwrap(), OrderStage::Delivered);
        assert!("Shipped".parse::<OrderStage>().is_err());
    }
}
