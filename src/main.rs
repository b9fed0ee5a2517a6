//! PHARMA DIRECT - pharmacy marketplace API

use std::sync::Arc;

use anyhow::Result;
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pharma_direct::adapters::{NatsPublisher, PaymongoGateway, PostgresStore};
use pharma_direct::http::{router, AppState};
use pharma_direct::ports::EventPublisher;
use pharma_direct::{CodEligibility, Config, OrderService, PaymentService};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    let db = PgPoolOptions::new().max_connections(10).connect(config.database_url.expose_secret()).await?;
    sqlx::migrate!("./migrations").run(&db).await?;
    let store = Arc::new(PostgresStore::new(db));

    let events: Option<Arc<dyn EventPublisher>> = match &config.nats_url {
        Some(url) => match NatsPublisher::connect(url).await {
            Ok(publisher) => Some(Arc::new(publisher)),
            Err(e) => { tracing::warn!(error = %e, "NATS unavailable, domain events disabled"); None }
        },
        None => None,
    };

    let mut cod = CodEligibility::new(store.clone());
    let mut payments = PaymentService::new(store.clone(), Arc::new(PaymongoGateway::new(&config.paymongo)), store.clone());
    if let Some(events) = &events {
        cod = cod.with_publisher(events.clone());
        payments = payments.with_publisher(events.clone());
    }
    if let Some(secret) = config.paymongo.webhook_secret.clone() {
        payments = payments.with_webhook_secret(secret);
    }
    let mut orders = OrderService::new(store.clone(), cod.clone());
    if let Some(events) = events {
        orders = orders.with_publisher(events);
    }

    let app = router(AppState { orders, payments, cod }).layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive());

    tracing::info!("🚀 PHARMA DIRECT listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
