//! Account Aggregate
//!
//! The application-side user record. Role and the disabled flag here are the
//! source of truth; any locally cached copy is advisory.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::{Role, UserId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: Role,
    pub disabled: bool,
    pub cod_unlocked: bool,
    /// Informational counters, never read by the eligibility evaluator.
    pub successful_orders: u32,
    pub total_spent: Decimal,
}

impl UserAccount {
    /// Fresh record for a just-created identity.
    pub fn new(id: UserId, name: impl Into<String>, email: impl Into<String>, phone: impl Into<String>, role: Role) -> Self {
        Self {
            id, name: name.into(), email: email.into(), phone: phone.into(), role,
            disabled: false, cod_unlocked: role.cod_unlocked_by_default(),
            successful_orders: 0, total_spent: Decimal::ZERO,
        }
    }
}

/// Pharmacy storefront linked to a `pharmacy` account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PharmacyRecord {
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub approved: bool,
    pub disabled: bool,
    pub total_orders: u32,
    pub wallet_balance: Decimal,
    pub pending_balance: Decimal,
}

impl PharmacyRecord {
    pub fn for_account(account: &UserAccount) -> Self {
        Self {
            user_id: account.id.clone(), name: account.name.clone(), email: account.email.clone(), phone: account.phone.clone(),
            approved: false, disabled: false, total_orders: 0, wallet_balance: Decimal::ZERO, pending_balance: Decimal::ZERO,
        }
    }
}
