//! Order stage workflow.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::cod::{CodEligibility, CodEvaluation};
use crate::domain::aggregates::{Order, OrderError, OrderStage};
use crate::domain::events::DomainEvent;
use crate::ports::{EventPublisher, RecordStore, StoreError};

#[derive(Debug, Error)]
pub enum OrderServiceError {
    #[error("order {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Transition(#[from] OrderError),
    #[error("order store error: {0}")]
    Store(#[from] StoreError),
}

/// Result of a stage update. `cod_review` is set when delivery started a
/// background eligibility check.
#[derive(Debug)]
pub struct StageUpdate {
    pub order: Order,
    pub changed: bool,
    pub cod_review: Option<JoinHandle<Option<CodEvaluation>>>,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn RecordStore>,
    cod: CodEligibility,
    events: Option<Arc<dyn EventPublisher>>,
}

impl OrderService {
    pub fn new(store: Arc<dyn RecordStore>, cod: CodEligibility) -> Self { Self { store, cod, events: None } }

    pub fn with_publisher(mut self, events: Arc<dyn EventPublisher>) -> Self { self.events = Some(events); self }

    #[instrument(skip(self), fields(order_id = %order_id, stage = %stage))]
    pub async fn update_stage(&self, order_id: Uuid, stage: OrderStage) -> Result<StageUpdate, OrderServiceError> {
        let mut order = self.store.fetch_order(order_id).await?.ok_or(OrderServiceError::NotFound(order_id))?;
        let from = order.stage();
        let changed = order.set_stage(stage)?;
        if !changed {
            return Ok(StageUpdate { order, changed, cod_review: None });
        }

        self.store.save_stage(&order).await?;
        info!(from = %from, to = %stage, "order stage updated");
        let events = order.take_events();
        self.publish(&events).await;

        let cod_review = (stage == OrderStage::Delivered).then(|| {
            let cod = self.cod.clone();
            let user_id = order.user_id().clone();
            tokio::spawn(async move {
                match cod.evaluate(&user_id).await {
                    Ok(evaluation) => Some(evaluation),
                    Err(e) => {
                        error!(user_id = %user_id, error = %e, "COD review after delivery failed");
                        None
                    }
                }
            })
        });

        Ok(StageUpdate { order, changed, cod_review })
    }

    async fn publish(&self, events: &[DomainEvent]) {
        let Some(publisher) = &self.events else { return };
        for event in events {
            if let Err(e) = publisher.publish(event).await {
                warn!(subject = event.subject(), error = %e, "failed to publish order event");
            }
        }
    }
}
