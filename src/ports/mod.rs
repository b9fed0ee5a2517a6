//! Capability interfaces over the external systems.
//!
//! Server-side adapters live in [`crate::adapters`].

pub mod identity;
pub mod navigation;
pub mod payments;
pub mod store;

pub use identity::{Identity, IdentityError, IdentityProvider, SessionEvent, SignUpRequest};
pub use navigation::{MemorySessionCache, Navigator, SessionCache, CACHE_ROLE, CACHE_UID};
pub use payments::{EventPublisher, PaymentError, PaymentGateway, PaymentLink, PaymentLinkRequest, PostPaymentHook, PublishError};
pub use store::{RecordStore, Setting, StoreError};
