//! PHARMA DIRECT marketplace core
//!
//! Pharmacy marketplace back end for buyers, pharmacies and administrators.
//!
//! ## Features
//! - Role-gated sessions with bounded role-based redirection
//! - Cash-on-delivery eligibility from delivered-order history
//! - Order stage workflow
//! - PayMongo payment links and webhook confirmation

pub mod adapters;
pub mod auth;
pub mod cod;
pub mod config;
pub mod domain;
pub mod http;
pub mod orders;
pub mod payments;
pub mod ports;

#[cfg(test)]
mod testing;

pub use auth::{AuthConfig, AuthError, AuthPhase, AuthSession, Registration};
pub use cod::{CodEligibility, CodEvaluation, EligibilitySettings};
pub use config::{Config, ConfigError};
pub use orders::OrderService;
pub use payments::PaymentService;
