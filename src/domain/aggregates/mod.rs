//! Aggregates module
pub mod account;
pub mod order;

pub use account::{PharmacyRecord, UserAccount};
pub use order::{Order, OrderError, OrderRecord, OrderStage, PaymentInfo, PaymentStatus};
