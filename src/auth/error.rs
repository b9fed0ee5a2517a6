//! Authentication error types.

use thiserror::Error;

use crate::domain::value_objects::UserId;
use crate::ports::{IdentityError, StoreError};

/// Errors surfaced by sign-in, sign-up and session validation.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong email or password. Never says which.
    #[error("invalid credentials")]
    Rejected,

    /// The account was disabled by an administrator.
    #[error("account disabled")]
    AccountDisabled,

    /// Identity and user record disagree (one exists without the other).
    #[error("account record inconsistent for {uid}: {detail}")]
    RecordInconsistency { uid: UserId, detail: String },

    /// The user record could not be read.
    #[error("could not read account record: {0}")]
    TransientReadFailure(#[source] StoreError),

    /// Email already has an identity.
    #[error("email already registered")]
    AlreadyRegistered,

    /// Registration input failed validation.
    #[error("invalid registration: {0}")]
    InvalidInput(#[from] validator::ValidationErrors),

    /// A newer sign-in, sign-out or reset replaced this attempt.
    #[error("superseded by a newer session change")]
    Superseded,

    /// Identity provider failure other than a credential rejection.
    #[error("identity provider error: {0}")]
    Identity(#[source] IdentityError),
}

impl From<IdentityError> for AuthError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidCredentials | IdentityError::NotFound => Self::Rejected,
            IdentityError::AlreadyRegistered => Self::AlreadyRegistered,
            other => Self::Identity(other),
        }
    }
}

impl AuthError {
    /// Text safe to show the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Rejected => "Invalid email or password. Please check your credentials and try again.",
            Self::AccountDisabled => "Your account has been disabled by an administrator. Please contact support for assistance.",
            Self::AlreadyRegistered => "An account with this email already exists. Please use a different email or try logging in.",
            Self::InvalidInput(_) => "Please check your details. Passwords need at least 6 characters.",
            Self::RecordInconsistency { .. } | Self::TransientReadFailure(_) => "Service is temporarily unavailable. Please try again in a few moments.",
            Self::Superseded => "Sign-in was interrupted. Please try again.",
            Self::Identity(_) => "An unexpected error occurred. Please try again or contact support if the problem persists.",
        }
    }
}
