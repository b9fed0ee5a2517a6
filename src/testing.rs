//! In-memory fakes of the external systems for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{broadcast, Notify};
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderRecord, OrderStage, PaymentStatus, PharmacyRecord, UserAccount};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::{Role, UserId};
use crate::ports::{
    EventPublisher, Identity, IdentityError, IdentityProvider, Navigator, PaymentError, PaymentGateway, PaymentLink,
    PaymentLinkRequest, PostPaymentHook, PublishError, RecordStore, SessionEvent, Setting, SignUpRequest, StoreError,
};

pub fn account(id: &str, role: Role) -> UserAccount {
    UserAccount::new(UserId::new(id), "Test User", format!("{id}@example.com"), "", role)
}

pub fn delivered_order(user: &UserId, amount: Decimal) -> Order {
    let now = Utc::now();
    Order::restore(OrderRecord {
        id: Uuid::now_v7(),
        user_id: user.clone(),
        stage: OrderStage::Delivered,
        payment_status: PaymentStatus::Confirmed,
        total: amount,
        grand_total: None,
        payment_link_id: None,
        payment_info: None,
        created_at: now,
        updated_at: now,
    })
}

fn unavailable() -> StoreError { StoreError::Unavailable("injected failure".into()) }

#[derive(Default)]
pub struct FakeStore {
    accounts: Mutex<HashMap<UserId, UserAccount>>,
    pharmacies: Mutex<Vec<PharmacyRecord>>,
    orders: Mutex<Vec<OrderRecord>>,
    settings: Mutex<Vec<Setting>>,
    cod_writes: AtomicUsize,
    fail_account_reads: AtomicBool,
    fail_account_writes: AtomicBool,
    fail_order_reads: AtomicBool,
    fail_order_writes: AtomicBool,
    fail_settings_reads: AtomicBool,
    yield_after_account_reads: AtomicBool,
    account_gate: Mutex<Option<(Arc<Notify>, bool)>>,
}

impl FakeStore {
    pub fn insert_account(&self, account: UserAccount) { self.accounts.lock().unwrap().insert(account.id.clone(), account); }
    pub fn account(&self, id: &UserId) -> Option<UserAccount> { self.accounts.lock().unwrap().get(id).cloned() }
    pub fn pharmacies(&self) -> Vec<PharmacyRecord> { self.pharmacies.lock().unwrap().clone() }
    pub fn insert_order(&self, order: Order) { self.orders.lock().unwrap().push(order.to_record()); }
    pub fn order(&self, id: Uuid) -> Option<Order> {
        self.orders.lock().unwrap().iter().find(|o| o.id == id).cloned().map(Order::restore)
    }
    pub fn put_setting(&self, key: &str, value: &str) {
        self.settings.lock().unwrap().push(Setting { key: key.to_string(), value: value.to_string() });
    }
    pub fn cod_writes(&self) -> usize { self.cod_writes.load(Ordering::SeqCst) }
    pub fn fail_account_reads(&self) { self.fail_account_reads.store(true, Ordering::SeqCst); }
    pub fn fail_account_writes(&self) { self.fail_account_writes.store(true, Ordering::SeqCst); }
    pub fn fail_order_reads(&self) { self.fail_order_reads.store(true, Ordering::SeqCst); }
    pub fn fail_order_writes(&self) { self.fail_order_writes.store(true, Ordering::SeqCst); }
    pub fn fail_settings_reads(&self) { self.fail_settings_reads.store(true, Ordering::SeqCst); }
    pub fn yield_after_account_reads(&self) { self.yield_after_account_reads.store(true, Ordering::SeqCst); }

    /// Parks the next account read until the returned handle is notified.
    /// With `fail` set, that read then errors.
    pub fn hold_next_account_read(&self, fail: bool) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        *self.account_gate.lock().unwrap() = Some((release.clone(), fail));
        release
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) { Err(unavailable()) } else { Ok(()) }
    }
}

#[async_trait]
impl RecordStore for FakeStore {
    async fn fetch_account(&self, id: &UserId) -> Result<Option<UserAccount>, StoreError> {
        let gate = self.account_gate.lock().unwrap().take();
        if let Some((release, fail)) = gate {
            release.notified().await;
            if fail {
                return Err(unavailable());
            }
        }
        Self::check(&self.fail_account_reads)?;
        let account = self.account(id);
        if self.yield_after_account_reads.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        Ok(account)
    }

    async fn create_account(&self, account: &UserAccount, pharmacy: Option<&PharmacyRecord>) -> Result<(), StoreError> {
        Self::check(&self.fail_account_writes)?;
        self.insert_account(account.clone());
        if let Some(pharmacy) = pharmacy {
            self.pharmacies.lock().unwrap().push(pharmacy.clone());
        }
        Ok(())
    }

    async fn set_cod_unlocked(&self, id: &UserId) -> Result<bool, StoreError> {
        Self::check(&self.fail_account_writes)?;
        match self.accounts.lock().unwrap().get_mut(id) {
            Some(account) if !account.cod_unlocked => {
                self.cod_writes.fetch_add(1, Ordering::SeqCst);
                account.cod_unlocked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fetch_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Self::check(&self.fail_order_reads)?;
        Ok(self.order(id))
    }

    async fn delivered_orders(&self, user: &UserId) -> Result<Vec<Order>, StoreError> {
        Self::check(&self.fail_order_reads)?;
        let mut orders: Vec<OrderRecord> = self.orders.lock().unwrap().iter()
            .filter(|o| &o.user_id == user && o.stage == OrderStage::Delivered)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders.into_iter().map(Order::restore).collect())
    }

    async fn save_stage(&self, order: &Order) -> Result<(), StoreError> {
        Self::check(&self.fail_order_writes)?;
        let mut orders = self.orders.lock().unwrap();
        let stored = orders.iter_mut().find(|o| o.id == order.id()).ok_or_else(unavailable)?;
        stored.stage = order.stage();
        stored.updated_at = order.updated_at();
        Ok(())
    }

    async fn attach_payment_link(&self, order_id: Uuid, link_id: &str) -> Result<bool, StoreError> {
        Self::check(&self.fail_order_writes)?;
        let mut orders = self.orders.lock().unwrap();
        Ok(match orders.iter_mut().find(|o| o.id == order_id) {
            Some(stored) => { stored.payment_link_id = Some(link_id.to_string()); true }
            None => false,
        })
    }

    async fn find_order_by_payment_link(&self, link_id: &str) -> Result<Option<Order>, StoreError> {
        Self::check(&self.fail_order_reads)?;
        Ok(self.orders.lock().unwrap().iter().find(|o| o.payment_link_id.as_deref() == Some(link_id)).cloned().map(Order::restore))
    }

    async fn confirm_payment(&self, order: &Order) -> Result<bool, StoreError> {
        Self::check(&self.fail_order_writes)?;
        let mut orders = self.orders.lock().unwrap();
        let stored = orders.iter_mut().find(|o| o.id == order.id()).ok_or_else(unavailable)?;
        if stored.payment_status == PaymentStatus::Confirmed {
            return Ok(false);
        }
        stored.payment_status = order.payment_status();
        stored.stage = order.stage();
        stored.payment_info = order.payment_info().cloned();
        stored.updated_at = order.updated_at();
        Ok(true)
    }

    async fn settings(&self, keys: &[&str]) -> Result<Vec<Setting>, StoreError> {
        Self::check(&self.fail_settings_reads)?;
        Ok(self.settings.lock().unwrap().iter().filter(|s| keys.contains(&s.key.as_str())).cloned().collect())
    }
}

struct FakeUser { identity: Identity, password: String }

pub struct FakeIdentity {
    users: Mutex<HashMap<String, FakeUser>>,
    current: Mutex<Option<Identity>>,
    events: broadcast::Sender<SessionEvent>,
    sign_outs: AtomicUsize,
    fail_deletes: AtomicBool,
}

impl Default for FakeIdentity {
    fn default() -> Self {
        let (events, _) = broadcast::channel(32);
        Self { users: Mutex::default(), current: Mutex::default(), events, sign_outs: AtomicUsize::new(0), fail_deletes: AtomicBool::new(false) }
    }
}

impl FakeIdentity {
    pub fn add_user(&self, email: &str, password: &str) -> UserId {
        let id = UserId::new(Uuid::new_v4().to_string());
        let identity = Identity { id: id.clone(), email: email.to_string() };
        self.users.lock().unwrap().insert(email.to_string(), FakeUser { identity, password: password.to_string() });
        id
    }

    pub fn identity(&self, id: &UserId) -> Identity {
        self.users.lock().unwrap().values().find(|u| &u.identity.id == id).map(|u| u.identity.clone()).unwrap()
    }

    pub fn has_email(&self, email: &str) -> bool { self.users.lock().unwrap().contains_key(email) }
    pub fn set_current(&self, identity: Option<Identity>) { *self.current.lock().unwrap() = identity; }
    pub fn sign_outs(&self) -> usize { self.sign_outs.load(Ordering::SeqCst) }
    pub fn fail_deletes(&self) { self.fail_deletes.store(true, Ordering::SeqCst); }
    pub fn emit(&self, event: SessionEvent) { let _ = self.events.send(event); }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn sign_up(&self, request: &SignUpRequest) -> Result<Identity, IdentityError> {
        if self.has_email(&request.email) {
            return Err(IdentityError::AlreadyRegistered);
        }
        let id = self.add_user(&request.email, &request.password);
        let identity = self.identity(&id);
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let identity = match self.users.lock().unwrap().get(email) {
            Some(user) if user.password == password => user.identity.clone(),
            _ => return Err(IdentityError::InvalidCredentials),
        };
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        self.set_current(None);
        Ok(())
    }

    async fn delete_identity(&self, id: &UserId) -> Result<(), IdentityError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(IdentityError::Provider("delete not permitted".into()));
        }
        self.users.lock().unwrap().retain(|_, u| &u.identity.id != id);
        Ok(())
    }

    async fn current_identity(&self) -> Result<Option<Identity>, IdentityError> { Ok(self.current.lock().unwrap().clone()) }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> { self.events.subscribe() }
}

/// Records navigations without moving; tests move it with [`FakeNavigator::go`].
pub struct FakeNavigator {
    path: Mutex<String>,
    navigations: Mutex<Vec<String>>,
}

impl FakeNavigator {
    pub fn at(path: &str) -> Self { Self { path: Mutex::new(path.to_string()), navigations: Mutex::default() } }
    pub fn go(&self, path: &str) { *self.path.lock().unwrap() = path.to_string(); }
    pub fn navigations(&self) -> Vec<String> { self.navigations.lock().unwrap().clone() }
}

impl Navigator for FakeNavigator {
    fn current_path(&self) -> String { self.path.lock().unwrap().clone() }
    fn navigate(&self, path: &str) { self.navigations.lock().unwrap().push(path.to_string()); }
}

#[derive(Default)]
pub struct RecordingPublisher { events: Mutex<Vec<DomainEvent>> }

impl RecordingPublisher {
    pub fn subjects(&self) -> Vec<&'static str> { self.events.lock().unwrap().iter().map(DomainEvent::subject).collect() }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingHook { calls: Mutex<Vec<Uuid>> }

impl RecordingHook {
    pub fn calls(&self) -> Vec<Uuid> { self.calls.lock().unwrap().clone() }
}

#[async_trait]
impl PostPaymentHook for RecordingHook {
    async fn complete_order_payment(&self, order_id: Uuid) -> Result<serde_json::Value, StoreError> {
        self.calls.lock().unwrap().push(order_id);
        Ok(serde_json::json!({ "completed": true }))
    }
}

#[derive(Default)]
pub struct FakeGateway { requests: Mutex<Vec<PaymentLinkRequest>> }

impl FakeGateway {
    pub fn requests(&self) -> Vec<PaymentLinkRequest> { self.requests.lock().unwrap().clone() }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_link(&self, request: &PaymentLinkRequest) -> Result<PaymentLink, PaymentError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(PaymentLink {
            id: "link_test_1".into(),
            checkout_url: Some("https://pm.link/pharma/test".into()),
            raw: serde_json::json!({ "data": { "id": "link_test_1" } }),
        })
    }
}
