//! Service configuration loaded from environment variables.
//!
//! ## Required
//! - `DATABASE_URL` - Postgres connection string
//! - `PAYMONGO_SECRET` - payment gateway secret key
//!
//! ## Optional
//! - `PORT` (default 8083)
//! - `SUPABASE_URL` - identity provider for embedded sessions; once set,
//!   `SUPABASE_ANON_KEY` is required too
//! - `SUPABASE_SERVICE_KEY` - needed to roll back half-finished registrations
//! - `PAYMONGO_API_BASE` (default `https://api.paymongo.com/v1`)
//! - `PAYMONGO_WEBHOOK_SECRET` - enables webhook signature checks
//! - `NATS_URL` - enables domain event publishing

use std::fmt;

use secrecy::SecretString;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8083;
pub const DEFAULT_PAYMONGO_API_BASE: &str = "https://api.paymongo.com/v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingEnvVar(&'static str),
    #[error("invalid environment variable {0}: {1}")]
    InvalidEnvVar(&'static str, String),
}

#[derive(Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: SecretString,
    pub service_key: Option<SecretString>,
}

impl fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .field("service_key", &self.service_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Clone)]
pub struct PaymongoConfig {
    pub api_base: String,
    pub secret: SecretString,
    pub webhook_secret: Option<SecretString>,
}

impl fmt::Debug for PaymongoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymongoConfig")
            .field("api_base", &self.api_base)
            .field("secret", &"[REDACTED]")
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Clone)]
pub struct Config {
    pub database_url: SecretString,
    pub port: u16,
    /// Only set for deployments that embed an auth session.
    pub supabase: Option<SupabaseConfig>,
    pub paymongo: PaymongoConfig,
    pub nats_url: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("port", &self.port)
            .field("supabase", &self.supabase)
            .field("paymongo", &self.paymongo)
            .field("nats_url", &self.nats_url)
            .finish()
    }
}

impl Config {
    /// Loads from the process environment after reading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &'static str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::MissingEnvVar(key));

        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::InvalidEnvVar("PORT", e.to_string()))?,
            None => DEFAULT_PORT,
        };

        let supabase = match get("SUPABASE_URL") {
            Some(url) => {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(ConfigError::InvalidEnvVar("SUPABASE_URL", "expected an http(s) URL".into()));
                }
                Some(SupabaseConfig {
                    url: url.trim_end_matches('/').to_string(),
                    anon_key: SecretString::from(required("SUPABASE_ANON_KEY")?),
                    service_key: get("SUPABASE_SERVICE_KEY").map(SecretString::from),
                })
            }
            None => None,
        };

        Ok(Self {
            database_url: SecretString::from(required("DATABASE_URL")?),
            port,
            supabase,
            paymongo: PaymongoConfig {
                api_base: get("PAYMONGO_API_BASE").unwrap_or_else(|| DEFAULT_PAYMONGO_API_BASE.to_string()).trim_end_matches('/').to_string(),
                secret: SecretString::from(required("PAYMONGO_SECRET")?),
                webhook_secret: get("PAYMONGO_WEBHOOK_SECRET").map(SecretString::from),
            },
            nats_url: get("NATS_URL"),
        })
    }
}
