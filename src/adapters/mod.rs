//! Production adapters for the capability traits in [`crate::ports`].

pub mod nats;
pub mod paymongo;
pub mod postgres;
pub mod supabase_auth;

pub use nats::NatsPublisher;
pub use paymongo::PaymongoGateway;
pub use postgres::PostgresStore;
pub use supabase_auth::SupabaseAuth;
