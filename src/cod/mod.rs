//! Cash-on-delivery eligibility.
//!
//! A user earns the COD privilege from their delivered-order history. The
//! thresholds live in the settings table; a threshold of zero is not
//! enforced. Once granted the privilege is never recomputed or revoked here.

use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::events::{AccountEvent, DomainEvent};
use crate::domain::value_objects::UserId;
use crate::ports::{EventPublisher, RecordStore, Setting, StoreError};

pub const MIN_ORDERS_KEY: &str = "cod_min_orders";
pub const MIN_SPEND_KEY: &str = "cod_min_spend";
pub const MIN_ORDER_AMOUNT_KEY: &str = "cod_min_order_amount";

const DEFAULT_MIN_ORDERS: u32 = 3;
const DEFAULT_MIN_SPEND: i64 = 1000;

/// Unlock thresholds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EligibilitySettings {
    pub min_orders: u32,
    pub min_spend: Decimal,
    /// Per-order floor; delivered orders below it do not count at all.
    pub min_order_amount: Decimal,
}

impl Default for EligibilitySettings {
    fn default() -> Self {
        Self { min_orders: DEFAULT_MIN_ORDERS, min_spend: Decimal::from(DEFAULT_MIN_SPEND), min_order_amount: Decimal::ZERO }
    }
}

impl EligibilitySettings {
    /// Builds settings from raw rows. Missing keys keep their defaults;
    /// unparseable values are logged and treated as missing.
    pub fn from_rows(rows: &[Setting]) -> Self {
        let mut settings = Self::default();
        for row in rows {
            let Some(value) = parse_amount(&row.value) else {
                warn!(key = %row.key, value = %row.value, "ignoring unparseable COD setting");
                continue;
            };
            match row.key.as_str() {
                MIN_ORDERS_KEY => match value.trunc().to_u32() {
                    Some(n) => settings.min_orders = n,
                    None => warn!(key = %row.key, value = %row.value, "ignoring out-of-range COD setting"),
                },
                MIN_SPEND_KEY => settings.min_spend = value,
                MIN_ORDER_AMOUNT_KEY => settings.min_order_amount = value,
                _ => {}
            }
        }
        settings
    }

    pub fn orders_enforced(&self) -> bool { self.min_orders > 0 }
    pub fn spend_enforced(&self) -> bool { self.min_spend > Decimal::ZERO }

    fn counts(&self, amount: Decimal) -> bool {
        self.min_order_amount <= Decimal::ZERO || amount >= self.min_order_amount
    }

    fn orders_met(&self, stats: &CodStats) -> bool { self.orders_enforced() && stats.successful_orders >= self.min_orders }
    fn spend_met(&self, stats: &CodStats) -> bool { self.spend_enforced() && stats.total_spent >= self.min_spend }

    /// Both thresholds set: both must hold. One set: that one decides. None: never.
    pub fn qualifies(&self, stats: &CodStats) -> bool {
        match (self.orders_enforced(), self.spend_enforced()) {
            (true, true) => self.orders_met(stats) && self.spend_met(stats),
            (true, false) => self.orders_met(stats),
            (false, true) => self.spend_met(stats),
            (false, false) => false,
        }
    }

    fn reason(&self, stats: &CodStats) -> String {
        if self.orders_met(stats) {
            format!("{}+ successful orders", self.min_orders)
        } else {
            format!("₱{}+ total spent", self.min_spend.normalize())
        }
    }
}

fn parse_amount(raw: &str) -> Option<Decimal> {
    let value: Decimal = raw.trim().trim_matches('"').parse().ok()?;
    (value >= Decimal::ZERO).then_some(value)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CodStats {
    pub successful_orders: u32,
    pub total_spent: Decimal,
}

/// What is still missing for a user who does not qualify yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Requirements {
    pub min_orders: u32,
    pub min_spent: Decimal,
    pub min_order_amount: Decimal,
    pub current_orders: u32,
    pub current_spent: Decimal,
}

impl Requirements {
    /// Orders still needed; zero when the order threshold is not enforced.
    pub fn remaining_orders(&self) -> u32 { self.min_orders.saturating_sub(self.current_orders) }

    /// Spend still needed; zero when the spend threshold is not enforced.
    pub fn remaining_spend(&self) -> Decimal { (self.min_spent - self.current_spent).max(Decimal::ZERO) }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum CodDecision {
    /// This evaluation granted the privilege and persisted it.
    Unlocked { reason: String },
    /// The user already holds the privilege; nothing was written.
    AlreadyUnlocked,
    NotEligible { requirements: Requirements },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CodEvaluation {
    #[serde(flatten)]
    pub decision: CodDecision,
    pub stats: CodStats,
}

impl CodEvaluation {
    /// True only for the evaluation that flipped the flag.
    pub fn unlocked(&self) -> bool { matches!(self.decision, CodDecision::Unlocked { .. }) }

    pub fn reason(&self) -> Option<&str> {
        match &self.decision { CodDecision::Unlocked { reason } => Some(reason), _ => None }
    }

    pub fn requirements(&self) -> Option<&Requirements> {
        match &self.decision { CodDecision::NotEligible { requirements } => Some(requirements), _ => None }
    }
}

#[derive(Debug, Error)]
pub enum EligibilityError {
    #[error("failed to read order history: {0}")]
    OrderHistory(#[source] StoreError),
    #[error("failed to read COD settings: {0}")]
    Settings(#[source] StoreError),
    #[error("failed to read account: {0}")]
    Account(#[source] StoreError),
    #[error("account {0} not found")]
    AccountMissing(UserId),
    #[error("failed to persist COD unlock: {0}")]
    Persist(#[source] StoreError),
}

/// Evaluates and grants COD eligibility.
#[derive(Clone)]
pub struct CodEligibility {
    store: Arc<dyn RecordStore>,
    events: Option<Arc<dyn EventPublisher>>,
}

impl CodEligibility {
    pub fn new(store: Arc<dyn RecordStore>) -> Self { Self { store, events: None } }

    pub fn with_publisher(mut self, events: Arc<dyn EventPublisher>) -> Self { self.events = Some(events); self }

    /// Recomputes eligibility from delivered orders and grants COD when the
    /// thresholds are met. Any read failure aborts before a write.
    pub async fn evaluate(&self, user_id: &UserId) -> Result<CodEvaluation, EligibilityError> {
        let delivered = self.store.delivered_orders(user_id).await.map_err(EligibilityError::OrderHistory)?;
        debug!(user_id = %user_id, delivered = delivered.len(), "fetched delivered orders for COD check");

        let rows = self.store.settings(&[MIN_ORDERS_KEY, MIN_SPEND_KEY, MIN_ORDER_AMOUNT_KEY]).await.map_err(EligibilityError::Settings)?;
        let settings = EligibilitySettings::from_rows(&rows);

        let stats = delivered.iter().map(|order| order.amount()).filter(|amount| settings.counts(*amount)).fold(CodStats::default(), |mut acc, amount| {
            acc.successful_orders += 1;
            acc.total_spent += amount;
            acc
        });

        let qualifies = settings.qualifies(&stats);
        debug!(
            user_id = %user_id,
            successful_orders = stats.successful_orders,
            total_spent = %stats.total_spent,
            min_orders = settings.min_orders,
            min_spend = %settings.min_spend,
            min_order_amount = %settings.min_order_amount,
            qualifies,
            "COD unlock decision"
        );

        if !qualifies {
            let requirements = Requirements {
                min_orders: settings.min_orders,
                min_spent: settings.min_spend,
                min_order_amount: settings.min_order_amount,
                current_orders: stats.successful_orders,
                current_spent: stats.total_spent,
            };
            return Ok(CodEvaluation { decision: CodDecision::NotEligible { requirements }, stats });
        }

        let account = self.store.fetch_account(user_id).await.map_err(EligibilityError::Account)?.ok_or_else(|| EligibilityError::AccountMissing(user_id.clone()))?;
        if account.cod_unlocked {
            return Ok(CodEvaluation { decision: CodDecision::AlreadyUnlocked, stats });
        }

        if !self.store.set_cod_unlocked(user_id).await.map_err(EligibilityError::Persist)? {
            debug!(user_id = %user_id, "COD already unlocked by a concurrent evaluation");
            return Ok(CodEvaluation { decision: CodDecision::AlreadyUnlocked, stats });
        }
        let reason = settings.reason(&stats);
        info!(user_id = %user_id, reason = %reason, "COD automatically unlocked");

        if let Some(events) = &self.events {
            let event = DomainEvent::Account(AccountEvent::CodUnlocked { user_id: user_id.clone(), reason: reason.clone() });
            if let Err(e) = events.publish(&event).await {
                warn!(user_id = %user_id, error = %e, "failed to publish COD unlock event");
            }
        }

        Ok(CodEvaluation { decision: CodDecision::Unlocked { reason }, stats })
    }

    /// Whether checkout may offer COD to the user right now.
    pub async fn cod_offered(&self, user_id: &UserId) -> Result<bool, EligibilityError> {
        let account = self.store.fetch_account(user_id).await.map_err(EligibilityError::Account)?.ok_or_else(|| EligibilityError::AccountMissing(user_id.clone()))?;
        if account.cod_unlocked {
            return Ok(true);
        }
        Ok(self.evaluate(user_id).await?.unlocked())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Role;
    use crate::testing::{account, delivered_order, FakeStore, RecordingPublisher};

    fn dec(n: i64) -> Decimal { Decimal::from(n) }

    fn setup(settings: &[(&str, &str)], orders: &[i64]) -> (Arc<FakeStore>, CodEligibility, UserId) {
        let store = Arc::new(FakeStore::default());
        let user = UserId::new("user-1");
        store.insert_account(account("user-1", Role::User));
        for (key, value) in settings {
            store.put_setting(key, value);
        }
        for amount in orders {
            store.insert_order(delivered_order(&user, dec(*amount)));
        }
        let cod = CodEligibility::new(store.clone());
        (store, cod, user)
    }

    #[tokio::test]
    async fn test_conjunctive_unlock_happens_once() {
        let (store, cod, user) = setup(&[(MIN_ORDERS_KEY, "3"), (MIN_SPEND_KEY, "1000")], &[400, 400, 400]);

        let first = cod.evaluate(&user).await.unwrap();
        assert!(first.unlocked());
        assert_eq!(first.reason(), Some("3+ successful orders"));
        assert_eq!(first.stats, CodStats { successful_orders: 3, total_spent: dec(1200) });
        assert!(store.account(&user).unwrap().cod_unlocked);

        let second = cod.evaluate(&user).await.unwrap();
        assert!(!second.unlocked());
        assert_eq!(second.decision, CodDecision::AlreadyUnlocked);
        assert_eq!(store.cod_writes(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_evaluations_unlock_once() {
        let (store, cod, user) = setup(&[(MIN_ORDERS_KEY, "1"), (MIN_SPEND_KEY, "0")], &[100]);
        store.yield_after_account_reads();
        let publisher = Arc::new(RecordingPublisher::default());
        let cod = cod.with_publisher(publisher.clone());

        let (a, b) = tokio::join!(cod.evaluate(&user), cod.evaluate(&user));
        let unlocked = [a.unwrap(), b.unwrap()].iter().filter(|e| e.unlocked()).count();
        assert_eq!(unlocked, 1);
        assert_eq!(store.cod_writes(), 1);
        assert_eq!(publisher.subjects().len(), 1);
    }

    #[tokio::test]
    async fn test_conjunctive_requires_both() {
        let (store, cod, user) = setup(&[(MIN_ORDERS_KEY, "3"), (MIN_SPEND_KEY, "1000")], &[100, 100, 100, 100]);

        let outcome = cod.evaluate(&user).await.unwrap();
        let requirements = outcome.requirements().unwrap();
        assert!(!outcome.unlocked());
        assert_eq!(requirements.remaining_orders(), 0);
        assert_eq!(requirements.remaining_spend(), dec(600));
        assert!(!store.account(&user).unwrap().cod_unlocked);
    }

    #[tokio::test]
    async fn test_spend_only_mode() {
        let (_store, cod, user) = setup(&[(MIN_ORDERS_KEY, "0"), (MIN_SPEND_KEY, "500")], &[600]);

        let outcome = cod.evaluate(&user).await.unwrap();
        assert!(outcome.unlocked());
        assert_eq!(outcome.reason(), Some("₱500+ total spent"));
    }

    #[tokio::test]
    async fn test_orders_only_mode() {
        let (_store, cod, user) = setup(&[(MIN_ORDERS_KEY, "2"), (MIN_SPEND_KEY, "0")], &[1, 1]);
        assert!(cod.evaluate(&user).await.unwrap().unlocked());
    }

    #[tokio::test]
    async fn test_no_thresholds_never_unlocks() {
        let (_store, cod, user) = setup(&[(MIN_ORDERS_KEY, "0"), (MIN_SPEND_KEY, "0")], &[5000, 5000, 5000, 5000]);
        assert!(!cod.evaluate(&user).await.unwrap().unlocked());
    }

    #[tokio::test]
    async fn test_defaults_apply_without_settings() {
        let (_store, cod, user) = setup(&[], &[300, 300, 300]);
        let outcome = cod.evaluate(&user).await.unwrap();
        assert!(!outcome.unlocked());
        assert_eq!(outcome.requirements().unwrap().remaining_spend(), dec(100));
    }

    #[tokio::test]
    async fn test_per_order_floor_excludes_small_orders() {
        let (_store, cod, user) = setup(&[(MIN_ORDERS_KEY, "3"), (MIN_SPEND_KEY, "1000"), (MIN_ORDER_AMOUNT_KEY, "200")], &[900, 150, 199, 300]);

        let outcome = cod.evaluate(&user).await.unwrap();
        assert_eq!(outcome.stats, CodStats { successful_orders: 2, total_spent: dec(1200) });
        assert!(!outcome.unlocked());
    }

    #[tokio::test]
    async fn test_sums_are_exact() {
        let store = Arc::new(FakeStore::default());
        let user = UserId::new("user-1");
        store.insert_account(account("user-1", Role::User));
        store.put_setting(MIN_ORDERS_KEY, "0");
        store.put_setting(MIN_SPEND_KEY, "3.3");
        for _ in 0..33 {
            store.insert_order(delivered_order(&user, Decimal::new(10, 2)));
        }
        let outcome = CodEligibility::new(store).evaluate(&user).await.unwrap();
        assert_eq!(outcome.stats.total_spent, Decimal::new(330, 2));
        assert!(outcome.unlocked());
    }

    #[tokio::test]
    async fn test_read_failure_leaves_account_untouched() {
        let (store, cod, user) = setup(&[(MIN_ORDERS_KEY, "1")], &[100]);
        store.fail_settings_reads();
        assert!(matches!(cod.evaluate(&user).await, Err(EligibilityError::Settings(_))));

        let (store, cod, user) = setup(&[(MIN_ORDERS_KEY, "1")], &[100]);
        store.fail_order_reads();
        assert!(matches!(cod.evaluate(&user).await, Err(EligibilityError::OrderHistory(_))));
        assert_eq!(store.cod_writes(), 0);
        assert!(!store.account(&user).unwrap().cod_unlocked);
    }

    #[tokio::test]
    async fn test_unlock_is_published() {
        let (_store, cod, user) = setup(&[(MIN_ORDERS_KEY, "1"), (MIN_SPEND_KEY, "0")], &[100]);
        let publisher = Arc::new(RecordingPublisher::default());
        let cod = cod.with_publisher(publisher.clone());
        cod.evaluate(&user).await.unwrap();
        assert_eq!(publisher.subjects(), vec!["pharma.accounts.cod_unlocked"]);
    }

    #[tokio::test]
    async fn test_cod_offered_for_admin_without_history() {
        let store = Arc::new(FakeStore::default());
        store.insert_account(account("boss", Role::Admin));
        let cod = CodEligibility::new(store);
        assert!(cod.cod_offered(&UserId::new("boss")).await.unwrap());
    }

    #[test]
    fn test_settings_parsing() {
        let rows = vec![
            Setting { key: MIN_ORDERS_KEY.into(), value: "five".into() },
            Setting { key: MIN_SPEND_KEY.into(), value: "\"2500.50\"".into() },
            Setting { key: MIN_ORDER_AMOUNT_KEY.into(), value: "-1".into() },
        ];
        let settings = EligibilitySettings::from_rows(&rows);
        assert_eq!(settings.min_orders, 3);
        assert_eq!(settings.min_spend, Decimal::new(250050, 2));
        assert_eq!(settings.min_order_amount, Decimal::ZERO);
    }
}
