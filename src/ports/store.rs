//! Record store capability: accounts, orders and settings.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::aggregates::{Order, PharmacyRecord, UserAccount};
use crate::domain::value_objects::UserId;

/// Raw key/value settings row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch_account(&self, id: &UserId) -> Result<Option<UserAccount>, StoreError>;

    /// Writes the account, and the pharmacy record when given, as one unit.
    async fn create_account(&self, account: &UserAccount, pharmacy: Option<&PharmacyRecord>) -> Result<(), StoreError>;

    /// Sets the COD flag only if it is still clear. Returns whether this
    /// call flipped it.
    async fn set_cod_unlocked(&self, id: &UserId) -> Result<bool, StoreError>;

    async fn fetch_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Delivered orders of `user`, newest first.
    async fn delivered_orders(&self, user: &UserId) -> Result<Vec<Order>, StoreError>;

    async fn save_stage(&self, order: &Order) -> Result<(), StoreError>;

    async fn attach_payment_link(&self, order_id: Uuid, link_id: &str) -> Result<bool, StoreError>;

    async fn find_order_by_payment_link(&self, link_id: &str) -> Result<Option<Order>, StoreError>;

    /// Persists a payment confirmation only if the stored order is not
    /// already confirmed. Returns whether this call applied it.
    async fn confirm_payment(&self, order: &Order) -> Result<bool, StoreError>;

    async fn settings(&self, keys: &[&str]) -> Result<Vec<Setting>, StoreError>;
}
