//! Identity provider capability.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::value_objects::{Role, UserId};

/// An authenticated identity as reported by the provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: UserId,
    pub email: String,
}

/// Session-change notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(Identity),
    SignedOut,
}

/// Account creation request. Metadata is stored with the identity itself.
#[derive(Clone, Debug)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: String,
    pub role: Role,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("email already registered")]
    AlreadyRegistered,
    #[error("identity not found")]
    NotFound,
    #[error("identity provider rejected request: {0}")]
    Provider(String),
    #[error("identity provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, request: &SignUpRequest) -> Result<Identity, IdentityError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError>;

    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Removes an identity. Used to roll back a half-finished registration.
    async fn delete_identity(&self, id: &UserId) -> Result<(), IdentityError>;

    /// Identity of the live provider session, if any.
    async fn current_identity(&self) -> Result<Option<Identity>, IdentityError>;

    /// New receiver of session-change notifications. Delivery order across
    /// receivers is unspecified.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}
