//! Domain events
use crate::domain::aggregates::OrderStage;
use crate::domain::value_objects::UserId;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "aggregate", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Account(AccountEvent),
}

impl DomainEvent {
    /// Subject the event is published under.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Order(OrderEvent::StageChanged { .. }) => "pharma.orders.stage_changed",
            Self::Order(OrderEvent::PaymentConfirmed { .. }) => "pharma.orders.payment_confirmed",
            Self::Account(AccountEvent::CodUnlocked { .. }) => "pharma.accounts.cod_unlocked",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    StageChanged { order_id: Uuid, user_id: UserId, from: OrderStage, to: OrderStage },
    PaymentConfirmed { order_id: Uuid, payment_id: String, amount: Decimal },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccountEvent {
    CodUnlocked { user_id: UserId, reason: String },
}
