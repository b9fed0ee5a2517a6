//! Value Objects for the marketplace

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity-provider assigned account id. Stable for the account's lifetime
/// and shared by the user record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self { Self::new(value) }
}

/// Access level of an account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Pharmacy,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self { Self::User => "user", Self::Pharmacy => "pharmacy", Self::Admin => "admin" }
    }

    /// Parses a stored role. Anything unrecognised lands in the user area.
    pub fn from_stored(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| {
            tracing::debug!(role = value, "unknown role, treating as user");
            Self::User
        })
    }

    /// Landing path for the role.
    pub fn landing_path(&self) -> &'static str {
        match self { Self::Admin => "/admin/", Self::Pharmacy => "/pharmacy/", Self::User => "/" }
    }

    /// Whether `path` already lies inside this role's area.
    pub fn owns_path(&self, path: &str) -> bool {
        match self {
            Self::Admin => path.contains("/admin/"),
            Self::Pharmacy => path.contains("/pharmacy/"),
            Self::User => !["/admin/", "/pharmacy/", "/login/", "/register/", "/disabled/"]
                .iter()
                .any(|area| path.contains(area)),
        }
    }

    /// COD starts unlocked only for administrators.
    pub fn cod_unlocked_by_default(&self) -> bool { matches!(self, Self::Admin) }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Role {
    type Err = RoleError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "pharmacy" => Ok(Self::Pharmacy),
            "admin" => Ok(Self::Admin),
            other => Err(RoleError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct RoleError(pub String);

/// Money value object. Amounts are exact decimals in the currency's major unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub const PHP: &'static str = "PHP";

    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    pub fn php(amount: Decimal) -> Self { Self::new(amount, Self::PHP) }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }

    /// Builds an amount from minor units (centavos).
    pub fn from_minor_units(units: i64, currency: &str) -> Self { Self::new(Decimal::new(units, 2), currency) }

    /// Minor units, rounding half away from zero.
    pub fn to_minor_units(&self) -> Result<i64, MoneyError> {
        (self.amount * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or(MoneyError::OutOfRange)
    }

    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }
}

impl Default for Money { fn default() -> Self { Self::zero(Self::PHP) } }

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.currency == Self::PHP { write!(f, "₱{:.2}", self.amount) } else { write!(f, "{:.2} {}", self.amount, self.currency) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("currency mismatch")]
    CurrencyMismatch,
    #[error("amount out of range")]
    OutOfRange,
}
