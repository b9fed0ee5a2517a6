//! HTTP API.

mod error;

pub use error::AppError;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::cod::{CodEligibility, CodEvaluation};
use crate::domain::aggregates::{Order, OrderStage, PaymentInfo, PaymentStatus};
use crate::domain::value_objects::UserId;
use crate::orders::OrderService;
use crate::payments::{webhook::SIGNATURE_HEADER, CheckoutLink, CreatePayment, PaymentService, WebhookOutcome};

#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    pub payments: PaymentService,
    pub cod: CodEligibility,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "pharma-direct"})) }))
        .route("/api/create-payment", post(create_payment))
        .route("/api/webhook", post(webhook))
        .route("/api/v1/orders/:id/stage", post(update_stage).put(update_stage))
        .route("/api/v1/users/:id/cod-eligibility", get(cod_eligibility))
        .route("/api/v1/users/:id/cod-offered", get(cod_offered))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: Uuid,
    pub user_id: UserId,
    pub stage: OrderStage,
    pub payment_status: PaymentStatus,
    pub total: Decimal,
    pub grand_total: Option<Decimal>,
    pub payment_info: Option<PaymentInfo>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderView {
    fn from(o: &Order) -> Self {
        Self {
            id: o.id(), user_id: o.user_id().clone(), stage: o.stage(), payment_status: o.payment_status(),
            total: o.total(), grand_total: o.grand_total(), payment_info: o.payment_info().cloned(), updated_at: o.updated_at(),
        }
    }
}

async fn create_payment(State(s): State<AppState>, Json(r): Json<CreatePayment>) -> Result<Json<CheckoutLink>, AppError> {
    Ok(Json(s.payments.create_payment_link(r).await?))
}

async fn webhook(State(s): State<AppState>, headers: HeaderMap, body: String) -> impl IntoResponse {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let (status, body) = match s.payments.handle_webhook(&body, signature).await {
        WebhookOutcome::Confirmed { .. } | WebhookOutcome::Duplicate { .. } | WebhookOutcome::Ignored { .. } => (StatusCode::OK, json!({"received": true})),
        WebhookOutcome::InvalidSignature => (StatusCode::BAD_REQUEST, json!({"error": "Invalid signature"})),
        WebhookOutcome::Malformed => (StatusCode::BAD_REQUEST, json!({"error": "Webhook processing failed"})),
        WebhookOutcome::MissingLinkId => (StatusCode::BAD_REQUEST, json!({"error": "Missing link ID"})),
        WebhookOutcome::OrderNotFound { .. } => (StatusCode::NOT_FOUND, json!({"error": "Order not found for link ID"})),
        WebhookOutcome::StoreFailure => (StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "Order update failed"})),
    };
    (status, Json(body))
}

#[derive(Debug, Deserialize)] pub struct StageRequest { pub stage: String }

async fn update_stage(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<StageRequest>) -> Result<Json<OrderView>, AppError> {
    let stage: OrderStage = r.stage.parse().map_err(|e: crate::domain::aggregates::OrderError| AppError::BadRequest(e.to_string()))?;
    let update = s.orders.update_stage(id, stage).await?;
    Ok(Json(OrderView::from(&update.order)))
}

async fn cod_eligibility(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<CodEvaluation>, AppError> {
    Ok(Json(s.cod.evaluate(&UserId::new(id)).await?))
}

async fn cod_offered(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<serde_json::Value>, AppError> {
    let offered = s.cod.cod_offered(&UserId::new(id)).await?;
    Ok(Json(json!({ "offered": offered })))
}
