//! Authentication session and role routing.
//!
//! [`AuthSession`] owns the mapping from an authenticated identity to a role
//! and moves the user to the role's landing area once per sign-in.

mod error;
mod redirect;
mod session;

pub use error::AuthError;
pub use redirect::{RedirectDecision, RedirectGuard};
pub use session::{AuthPhase, AuthSession, SessionSubscription};

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use validator::Validate;

use crate::domain::value_objects::Role;

/// Tuning for session routing.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub max_redirects: u32,
    pub redirect_window: Duration,
    /// Delay before a scheduled navigation fires.
    pub settle_delay: Duration,
    pub login_path: String,
    pub register_path: String,
    pub disabled_path: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_redirects: 3,
            redirect_window: Duration::from_secs(3),
            settle_delay: Duration::from_millis(100),
            login_path: "/login/".to_string(),
            register_path: "/register/".to_string(),
            disabled_path: "/disabled/".to_string(),
        }
    }
}

impl AuthConfig {
    /// Sign-in and sign-up pages, the only places a redirect may start once initialised.
    pub fn is_entry_point(&self, path: &str) -> bool {
        path.contains(&self.login_path) || path.contains(&self.register_path)
    }
}

/// Sign-up form.
#[derive(Clone, Deserialize, Validate)]
pub struct Registration {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6))]
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Role,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("phone", &self.phone)
            .field("role", &self.role)
            .finish()
    }
}
