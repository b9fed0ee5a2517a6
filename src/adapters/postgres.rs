//! Postgres record store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderRecord, PaymentInfo, PaymentStatus, PharmacyRecord, UserAccount};
use crate::domain::value_objects::{Role, UserId};
use crate::ports::{PostPaymentHook, RecordStore, Setting, StoreError};

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: String, name: String, email: String, phone: String, role: String,
    disabled: bool, cod_unlocked: bool, successful_orders: i32, total_spent: Decimal,
}

impl From<AccountRow> for UserAccount {
    fn from(r: AccountRow) -> Self {
        Self {
            id: UserId::new(r.id), name: r.name, email: r.email, phone: r.phone, role: Role::from_stored(&r.role),
            disabled: r.disabled, cod_unlocked: r.cod_unlocked,
            successful_orders: u32::try_from(r.successful_orders).unwrap_or(0), total_spent: r.total_spent,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid, user_id: String, stage: String, payment_status: String, total: Decimal, grand_total: Option<Decimal>,
    paymongo_link_id: Option<String>, payment_info: Option<Json<PaymentInfo>>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;
    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        let corrupt = |e: crate::domain::aggregates::OrderError| StoreError::Corrupt(format!("order {}: {e}", r.id));
        Ok(Order::restore(OrderRecord {
            id: r.id, user_id: UserId::new(r.user_id.clone()), stage: r.stage.parse().map_err(corrupt)?,
            payment_status: r.payment_status.parse().map_err(corrupt)?, total: r.total, grand_total: r.grand_total,
            payment_link_id: r.paymongo_link_id.clone(), payment_info: r.payment_info.map(|Json(info)| info),
            created_at: r.created_at, updated_at: r.updated_at,
        }))
    }
}

const ORDER_COLUMNS: &str = "id, user_id, stage, payment_status, total, grand_total, paymongo_link_id, payment_info, created_at, updated_at";

#[derive(Clone)]
pub struct PostgresStore { pool: PgPool }

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn fetch_account(&self, id: &UserId) -> Result<Option<UserAccount>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>("SELECT id, name, email, phone, role, disabled, cod_unlocked, successful_orders, total_spent FROM users WHERE id = $1")
            .bind(id.as_str()).fetch_optional(&self.pool).await?;
        Ok(row.map(UserAccount::from))
    }

    async fn create_account(&self, account: &UserAccount, pharmacy: Option<&PharmacyRecord>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO users (id, name, email, phone, role, disabled, cod_unlocked, successful_orders, total_spent, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())")
            .bind(account.id.as_str()).bind(&account.name).bind(&account.email).bind(&account.phone).bind(account.role.as_str())
            .bind(account.disabled).bind(account.cod_unlocked).bind(account.successful_orders as i32).bind(account.total_spent)
            .execute(&mut *tx).await?;
        if let Some(p) = pharmacy {
            sqlx::query("INSERT INTO pharmacies (user_id, name, email, phone, approved, disabled, total_orders, wallet_balance, pending_balance, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())")
                .bind(p.user_id.as_str()).bind(&p.name).bind(&p.email).bind(&p.phone).bind(p.approved).bind(p.disabled)
                .bind(p.total_orders as i32).bind(p.wallet_balance).bind(p.pending_balance)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        debug!(uid = %account.id, role = account.role.as_str(), "user record created");
        Ok(())
    }

    async fn set_cod_unlocked(&self, id: &UserId) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET cod_unlocked = TRUE WHERE id = $1 AND cod_unlocked = FALSE").bind(id.as_str()).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn fetch_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id).fetch_optional(&self.pool).await?.map(Order::try_from).transpose()
    }

    async fn delivered_orders(&self, user: &UserId) -> Result<Vec<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 AND stage = 'Delivered' ORDER BY created_at DESC"))
            .bind(user.as_str()).fetch_all(&self.pool).await?.into_iter().map(Order::try_from).collect()
    }

    async fn save_stage(&self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE orders SET stage = $2, updated_at = $3 WHERE id = $1")
            .bind(order.id()).bind(order.stage().as_str()).bind(order.updated_at()).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Unavailable(format!("order {} vanished during update", order.id())));
        }
        Ok(())
    }

    async fn attach_payment_link(&self, order_id: Uuid, link_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE orders SET paymongo_link_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(order_id).bind(link_id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_order_by_payment_link(&self, link_id: &str) -> Result<Option<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE paymongo_link_id = $1"))
            .bind(link_id).fetch_optional(&self.pool).await?.map(Order::try_from).transpose()
    }

    async fn confirm_payment(&self, order: &Order) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE orders SET payment_status = $2, stage = $3, payment_info = $4, updated_at = $5 WHERE id = $1 AND payment_status <> $6")
            .bind(order.id()).bind(order.payment_status().as_str()).bind(order.stage().as_str())
            .bind(order.payment_info().map(Json)).bind(order.updated_at()).bind(PaymentStatus::Confirmed.as_str())
            .execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn settings(&self, keys: &[&str]) -> Result<Vec<Setting>, StoreError> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings WHERE key = ANY($1)").bind(&keys).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(key, value)| Setting { key, value }).collect())
    }
}

#[async_trait]
impl PostPaymentHook for PostgresStore {
    async fn complete_order_payment(&self, order_id: Uuid) -> Result<serde_json::Value, StoreError> {
        let result: Option<serde_json::Value> = sqlx::query_scalar("SELECT complete_order_payment($1)").bind(order_id).fetch_one(&self.pool).await?;
        Ok(result.unwrap_or(serde_json::Value::Null))
    }
}
