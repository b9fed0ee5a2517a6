//! Supabase GoTrue identity provider.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::SupabaseConfig;
use crate::domain::value_objects::UserId;
use crate::ports::{Identity, IdentityError, IdentityProvider, SessionEvent, SignUpRequest};

const EVENT_CAPACITY: usize = 64;

#[derive(Deserialize)]
struct UserBody {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct SessionBody {
    access_token: String,
    user: UserBody,
}

struct LiveSession {
    access_token: SecretString,
    identity: Identity,
}

pub struct SupabaseAuth {
    client: reqwest::Client,
    config: SupabaseConfig,
    session: Mutex<Option<LiveSession>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SupabaseAuth {
    pub fn new(config: SupabaseConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { client: reqwest::Client::new(), config, session: Mutex::new(None), events }
    }

    fn endpoint(&self, path: &str) -> String { format!("{}/auth/v1/{}", self.config.url, path) }

    fn with_key(&self, request: RequestBuilder, key: &SecretString) -> RequestBuilder {
        request.header("apikey", key.expose_secret()).bearer_auth(key.expose_secret())
    }

    fn access_token(&self) -> Option<String> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner).as_ref().map(|s| s.access_token.expose_secret().to_string())
    }

    fn store_session(&self, body: SessionBody) -> Identity {
        let identity = identity_from(body.user);
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        *session = Some(LiveSession { access_token: SecretString::from(body.access_token), identity: identity.clone() });
        drop(session);
        let _ = self.events.send(SessionEvent::SignedIn(identity.clone()));
        identity
    }

    fn clear_session(&self) -> bool {
        let had = self.session.lock().unwrap_or_else(PoisonError::into_inner).take().is_some();
        if had {
            let _ = self.events.send(SessionEvent::SignedOut);
        }
        had
    }
}

fn identity_from(user: UserBody) -> Identity {
    Identity { id: UserId::new(user.id), email: user.email.unwrap_or_default() }
}

/// Reads the GoTrue error body and classifies it.
async fn provider_error(response: Response) -> IdentityError {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    let code = body["error_code"].as_str().or_else(|| body["error"].as_str()).unwrap_or_default().to_string();
    let message = ["msg", "error_description", "message"].iter().find_map(|k| body[*k].as_str()).unwrap_or_default().to_string();
    classify(status, &code, &message)
}

fn classify(status: StatusCode, code: &str, message: &str) -> IdentityError {
    let lower = message.to_ascii_lowercase();
    if code == "user_already_exists" || lower.contains("already registered") {
        IdentityError::AlreadyRegistered
    } else if code == "invalid_grant" || code == "invalid_credentials" || lower.contains("invalid login credentials") {
        IdentityError::InvalidCredentials
    } else if status == StatusCode::NOT_FOUND || code == "user_not_found" {
        IdentityError::NotFound
    } else {
        IdentityError::Provider(format!("{status}: {}", if message.is_empty() { code } else { message }))
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
    async fn sign_up(&self, request: &SignUpRequest) -> Result<Identity, IdentityError> {
        let payload = json!({
            "email": request.email,
            "password": request.password,
            "data": { "name": request.name, "phone": request.phone, "role": request.role.as_str() },
        });
        let response = self.with_key(self.client.post(self.endpoint("signup")), &self.config.anon_key).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }

        // With email confirmation on, GoTrue returns the bare user and no session.
        let body: Value = response.json().await?;
        if body.get("access_token").is_some() {
            let session: SessionBody = serde_json::from_value(body).map_err(|e| IdentityError::Provider(e.to_string()))?;
            return Ok(self.store_session(session));
        }
        let user: UserBody = serde_json::from_value(body).map_err(|e| IdentityError::Provider(e.to_string()))?;
        info!(uid = %user.id, "identity created pending confirmation");
        Ok(identity_from(user))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let response = self
            .with_key(self.client.post(self.endpoint("token")), &self.config.anon_key)
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }
        let session: SessionBody = response.json().await?;
        Ok(self.store_session(session))
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        let token = self.access_token();
        self.clear_session();
        let Some(token) = token else { return Ok(()) };

        let response = self
            .client
            .post(self.endpoint("logout"))
            .header("apikey", self.config.anon_key.expose_secret())
            .bearer_auth(token)
            .send()
            .await?;
        // An already expired token is as good as signed out.
        if !response.status().is_success() && response.status() != StatusCode::UNAUTHORIZED {
            return Err(provider_error(response).await);
        }
        Ok(())
    }

    async fn delete_identity(&self, id: &UserId) -> Result<(), IdentityError> {
        let Some(service_key) = &self.config.service_key else {
            return Err(IdentityError::Provider("service key not configured".into()));
        };
        let response = self.with_key(self.client.delete(self.endpoint(&format!("admin/users/{id}"))), service_key).send().await?;
        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }
        let was_current = self.session.lock().unwrap_or_else(PoisonError::into_inner).as_ref().is_some_and(|s| &s.identity.id == id);
        if was_current {
            self.clear_session();
        }
        debug!(uid = %id, "identity deleted");
        Ok(())
    }

    async fn current_identity(&self) -> Result<Option<Identity>, IdentityError> {
        let Some(token) = self.access_token() else { return Ok(None) };
        let response = self
            .client
            .get(self.endpoint("user"))
            .header("apikey", self.config.anon_key.expose_secret())
            .bearer_auth(token)
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::FORBIDDEN {
            warn!("stored session rejected by provider");
            self.clear_session();
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }
        let user: UserBody = response.json().await?;
        Ok(Some(identity_from(user)))
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> { self.events.subscribe() }
}
