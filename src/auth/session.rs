//! Session state machine.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use validator::Validate;

use super::{AuthConfig, AuthError, RedirectDecision, RedirectGuard, Registration};
use crate::domain::aggregates::{PharmacyRecord, UserAccount};
use crate::domain::value_objects::{Role, UserId};
use crate::ports::{Identity, IdentityProvider, Navigator, RecordStore, SessionCache, SessionEvent, SignUpRequest, CACHE_ROLE, CACHE_UID};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthPhase {
    Anonymous,
    Authenticating,
    Authenticated(Role),
    Disabled,
    Error,
}

#[derive(Debug)]
struct SessionState {
    phase: AuthPhase,
    current_user: Option<Identity>,
    current_role: Option<Role>,
    disabled_user: Option<UserId>,
    initialized: bool,
    guard: RedirectGuard,
    /// Bumped on teardown, on each login or registration attempt and when a
    /// different identity is established; deferred work compares it.
    generation: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: AuthPhase::Anonymous,
            current_user: None,
            current_role: None,
            disabled_user: None,
            initialized: false,
            guard: RedirectGuard::default(),
            generation: 0,
        }
    }
}

impl SessionState {
    fn clear(&mut self, phase: AuthPhase) {
        self.phase = phase;
        self.current_user = None;
        self.current_role = None;
        self.generation += 1;
    }
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle for a session-change subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct SessionSubscription {
    handle: JoinHandle<()>,
}

impl SessionSubscription {
    pub fn unsubscribe(self) {}
}

impl Drop for SessionSubscription {
    fn drop(&mut self) { self.handle.abort(); }
}

/// Process-local authentication context.
///
/// Constructed explicitly and passed to whatever handles routing. Only this
/// type writes the current user and role; the user record stays the source
/// of truth and the local cache is reconciled against it.
pub struct AuthSession {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn RecordStore>,
    navigator: Arc<dyn Navigator>,
    cache: Arc<dyn SessionCache>,
    config: AuthConfig,
    state: Arc<Mutex<SessionState>>,
    listener: Mutex<Option<AbortHandle>>,
}

impl AuthSession {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn RecordStore>,
        navigator: Arc<dyn Navigator>,
        cache: Arc<dyn SessionCache>,
        config: AuthConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            identity,
            store,
            navigator,
            cache,
            config,
            state: Arc::new(Mutex::new(SessionState::default())),
            listener: Mutex::new(None),
        })
    }

    /// Starts listening to identity-provider session changes.
    pub fn attach(self: &Arc<Self>) -> SessionSubscription {
        let mut events = self.identity.subscribe();
        let session: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session listener lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(session) = session.upgrade() else { break };
                session.on_session_change(event).await;
            }
            debug!("session listener stopped");
        });

        let previous = self.listener.lock().unwrap_or_else(PoisonError::into_inner).replace(handle.abort_handle());
        if let Some(previous) = previous {
            previous.abort();
        }
        SessionSubscription { handle }
    }

    /// Page-load check of an existing provider session.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<Option<Role>, AuthError> {
        match self.identity.current_identity().await {
            Ok(Some(identity)) => self.accept_notification(identity).await,
            Ok(None) => {
                lock(&self.state).initialized = true;
                Ok(None)
            }
            Err(e) => {
                lock(&self.state).initialized = true;
                Err(e.into())
            }
        }
    }

    /// Handles one session-change notification.
    pub async fn on_session_change(&self, event: SessionEvent) {
        match event {
            SessionEvent::SignedIn(identity) => {
                if let Err(e) = self.accept_notification(identity).await {
                    debug!(error = %e, "session notification not accepted");
                }
            }
            SessionEvent::SignedOut => {
                lock(&self.state).clear(AuthPhase::Anonymous);
                self.clear_cache();
                info!("user signed out");
            }
        }
    }

    /// Validates a notified identity. `Ok(None)` means the notification was
    /// ignored: a login or registration owns the transition, the identity is
    /// known to be disabled, or the session changed while validating.
    async fn accept_notification(&self, identity: Identity) -> Result<Option<Role>, AuthError> {
        let generation = {
            let state = lock(&self.state);
            if state.phase == AuthPhase::Authenticating {
                debug!(uid = %identity.id, "sign-in in progress, ignoring notification");
                return Ok(None);
            }
            if state.disabled_user.as_ref() == Some(&identity.id) {
                debug!(uid = %identity.id, "identity already disabled, ignoring notification");
                return Ok(None);
            }
            state.generation
        };

        let origin = self.navigator.current_path();
        let validated = self.validate(identity, generation).await;
        let should_redirect = {
            let mut state = lock(&self.state);
            let should = !state.initialized || self.config.is_entry_point(&origin);
            state.initialized = true;
            should
        };
        let role = validated?;
        if let (Some(role), true) = (role, should_redirect) {
            self.attempt_redirect(role);
        }
        Ok(role)
    }

    /// Re-reads the user record for `identity` and moves the session to the
    /// role it holds there.
    async fn validate(&self, identity: Identity, generation: u64) -> Result<Option<Role>, AuthError> {
        let uid = identity.id.clone();
        let fetched = self.store.fetch_account(&uid).await;
        if !self.is_current(generation) {
            debug!(uid = %uid, "session changed while validating, dropping result");
            return Ok(None);
        }

        let account = match fetched {
            Ok(Some(account)) => account,
            Ok(None) => {
                warn!(uid = %uid, "no user record for identity");
                self.fail_closed().await;
                return Err(AuthError::RecordInconsistency { uid, detail: "user record missing".into() });
            }
            Err(e) => {
                error!(uid = %uid, error = %e, "failed to read user record");
                self.fail_closed().await;
                return Err(AuthError::TransientReadFailure(e));
            }
        };

        if account.disabled {
            self.enter_disabled(&uid).await;
            return Err(AuthError::AccountDisabled);
        }

        if let Some(cached) = self.cache.get(CACHE_ROLE) {
            if cached != account.role.as_str() {
                info!(uid = %uid, from = %cached, to = %account.role, "role changed in user record, updating cache");
            }
        }
        self.establish(identity, account.role);
        Ok(Some(account.role))
    }

    /// Creates the identity, then the user record (and pharmacy record) that
    /// depends on its id. A failed record write deletes the identity again.
    #[instrument(skip(self, registration), fields(email = %registration.email, role = %registration.role))]
    pub async fn register(&self, registration: Registration) -> Result<UserAccount, AuthError> {
        registration.validate()?;
        let generation = self.begin_attempt();

        let request = SignUpRequest {
            email: registration.email.clone(),
            password: registration.password.clone(),
            name: registration.name.clone(),
            phone: registration.phone.clone().unwrap_or_default(),
            role: registration.role,
        };
        let identity = match self.identity.sign_up(&request).await {
            Ok(identity) => identity,
            Err(e) => {
                error!(error = %e, "identity creation failed");
                self.abandon_attempt();
                return Err(e.into());
            }
        };
        info!(uid = %identity.id, "identity created");

        let account = UserAccount::new(identity.id.clone(), request.name, request.email, request.phone, request.role);
        let pharmacy = (account.role == Role::Pharmacy).then(|| PharmacyRecord::for_account(&account));
        if let Err(e) = self.store.create_account(&account, pharmacy.as_ref()).await {
            error!(uid = %identity.id, error = %e, "user record write failed, rolling back identity");
            self.roll_back_identity(&identity.id).await;
            self.abandon_attempt();
            return Err(AuthError::RecordInconsistency { uid: identity.id, detail: e.to_string() });
        }

        if !self.is_current(generation) {
            debug!(uid = %identity.id, "registration superseded, leaving session as is");
            return Err(AuthError::Superseded);
        }
        self.establish(identity, account.role);
        info!(uid = %account.id, "registration completed");
        self.redirect_from_entry_point(account.role);
        Ok(account)
    }

    /// Authenticates, then checks the user record. A missing or unreadable
    /// record signs the identity out again.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<UserAccount, AuthError> {
        let generation = self.begin_attempt();

        let identity = match self.identity.sign_in(email, password).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "sign-in failed");
                if self.is_current(generation) {
                    self.fail_closed().await;
                }
                return Err(e.into());
            }
        };

        let fetched = self.store.fetch_account(&identity.id).await;
        if !self.is_current(generation) {
            debug!(uid = %identity.id, "login superseded, dropping result");
            return Err(AuthError::Superseded);
        }

        let account = match fetched {
            Ok(Some(account)) => account,
            Ok(None) => {
                warn!(uid = %identity.id, "signed in without a user record");
                self.fail_closed().await;
                return Err(AuthError::RecordInconsistency { uid: identity.id, detail: "user record missing".into() });
            }
            Err(e) => {
                error!(uid = %identity.id, error = %e, "failed to read user record");
                self.fail_closed().await;
                return Err(AuthError::TransientReadFailure(e));
            }
        };

        if account.disabled {
            self.enter_disabled(&identity.id).await;
            return Err(AuthError::AccountDisabled);
        }

        self.establish(identity, account.role);
        info!(uid = %account.id, role = %account.role, "login completed");
        self.redirect_from_entry_point(account.role);
        Ok(account)
    }

    /// Signs out and returns to the sign-in page.
    pub async fn logout(&self) -> Result<(), AuthError> {
        self.clear_cache();
        self.reset();

        let result = self.identity.sign_out().await;
        if let Err(e) = &result {
            warn!(error = %e, "sign-out failed");
        }

        if self.navigator.current_path().contains(&self.config.disabled_path) {
            debug!("on disabled page, not redirecting to login");
        } else {
            self.navigator.navigate(&self.config.login_path);
        }
        result.map_err(AuthError::from)
    }

    /// Manual redirect request; honours the same guards.
    pub fn redirect_by_role(&self, role: Role) -> RedirectDecision {
        info!(role = %role, "manual redirect requested");
        self.attempt_redirect(role)
    }

    pub fn reset(&self) {
        let mut state = lock(&self.state);
        state.clear(AuthPhase::Anonymous);
        state.disabled_user = None;
        state.guard = RedirectGuard::default();
    }

    /// Ends the subscription and resets.
    pub fn dispose(&self) {
        if let Some(listener) = self.listener.lock().unwrap_or_else(PoisonError::into_inner).take() {
            listener.abort();
        }
        self.reset();
    }

    pub fn phase(&self) -> AuthPhase { lock(&self.state).phase }
    pub fn current_user(&self) -> Option<Identity> { lock(&self.state).current_user.clone() }
    pub fn current_role(&self) -> Option<Role> { lock(&self.state).current_role }
    pub fn is_authenticated(&self) -> bool { lock(&self.state).current_user.is_some() }
    pub fn is_admin(&self) -> bool { self.current_role() == Some(Role::Admin) }
    pub fn is_pharmacy(&self) -> bool { self.current_role() == Some(Role::Pharmacy) }
    pub fn is_user(&self) -> bool { self.current_role() == Some(Role::User) }
    pub fn redirect_count(&self) -> u32 { lock(&self.state).guard.count() }

    /// Starts a login or registration; validations already in flight go stale.
    fn begin_attempt(&self) -> u64 {
        let mut state = lock(&self.state);
        state.phase = AuthPhase::Authenticating;
        state.disabled_user = None;
        state.generation += 1;
        state.generation
    }

    fn is_current(&self, generation: u64) -> bool { lock(&self.state).generation == generation }

    fn abandon_attempt(&self) {
        lock(&self.state).clear(AuthPhase::Error);
        self.clear_cache();
    }

    fn establish(&self, identity: Identity, role: Role) {
        self.cache.set(CACHE_UID, identity.id.as_str());
        self.cache.set(CACHE_ROLE, role.as_str());
        let mut state = lock(&self.state);
        if state.current_user.as_ref().map(|u| &u.id) != Some(&identity.id) {
            state.generation += 1;
        }
        state.phase = AuthPhase::Authenticated(role);
        state.current_user = Some(identity);
        state.current_role = Some(role);
        state.disabled_user = None;
    }

    async fn fail_closed(&self) {
        if let Err(e) = self.identity.sign_out().await {
            warn!(error = %e, "sign-out after failed authentication failed");
        }
        self.abandon_attempt();
    }

    async fn enter_disabled(&self, uid: &UserId) {
        info!(uid = %uid, "account is disabled, signing out");
        {
            let mut state = lock(&self.state);
            state.clear(AuthPhase::Disabled);
            state.disabled_user = Some(uid.clone());
        }
        self.clear_cache();
        if let Err(e) = self.identity.sign_out().await {
            warn!(uid = %uid, error = %e, "sign-out of disabled account failed");
        }
        if !self.navigator.current_path().contains(&self.config.disabled_path) {
            self.navigator.navigate(&self.config.disabled_path);
        }
    }

    async fn roll_back_identity(&self, uid: &UserId) {
        match self.identity.delete_identity(uid).await {
            Ok(()) => info!(uid = %uid, "orphaned identity deleted"),
            Err(e) => {
                error!(uid = %uid, error = %e, "failed to delete orphaned identity, signing out instead");
                if let Err(e) = self.identity.sign_out().await {
                    error!(uid = %uid, error = %e, "fallback sign-out failed");
                }
            }
        }
    }

    fn clear_cache(&self) {
        self.cache.remove(CACHE_UID);
        self.cache.remove(CACHE_ROLE);
    }

    fn redirect_from_entry_point(&self, role: Role) {
        let path = self.navigator.current_path();
        let should_redirect = {
            let mut state = lock(&self.state);
            let should = !state.initialized || self.config.is_entry_point(&path);
            state.initialized = true;
            should
        };
        if should_redirect {
            self.attempt_redirect(role);
        }
    }

    fn attempt_redirect(&self, role: Role) -> RedirectDecision {
        let path = self.navigator.current_path();
        let (decision, generation) = {
            let mut state = lock(&self.state);
            if state.phase != AuthPhase::Authenticated(role) {
                return RedirectDecision::NotApplicable;
            }
            let decision = state.guard.decide(role, &path, Instant::now(), &self.config);
            (decision, state.generation)
        };

        match decision {
            RedirectDecision::Scheduled(destination) => {
                info!(role = %role, from = %path, to = destination, "redirecting");
                self.schedule_navigation(destination, path, generation);
            }
            RedirectDecision::AlreadyThere => debug!(role = %role, path = %path, "already on correct page for role"),
            RedirectDecision::CapReached => warn!(role = %role, "redirect prevented: maximum redirect count reached"),
            RedirectDecision::TooSoon => debug!(role = %role, "redirect prevented: too soon after last redirect"),
            RedirectDecision::NotApplicable => {}
        }
        decision
    }

    /// Navigates after the settle delay, unless the session was torn down or
    /// the page moved in the meantime.
    fn schedule_navigation(&self, destination: &'static str, origin: String, generation: u64) {
        let navigator = Arc::clone(&self.navigator);
        let state = Arc::clone(&self.state);
        let delay = self.config.settle_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if lock(&state).generation != generation {
                debug!(to = destination, "session reset before redirect fired");
                return;
            }
            if navigator.current_path() != origin {
                debug!(to = destination, "page already navigated away");
                return;
            }
            navigator.navigate(destination);
        });
    }
}
