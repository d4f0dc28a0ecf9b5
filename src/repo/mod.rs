use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::webhook::WebhookEvent;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod payments_repo;
pub mod webhook_events_repo;

/// Durable payment persistence. The store is the only serialization point
/// between concurrent requests, so every status mutation goes through it.
#[async_trait::async_trait]
pub trait PaymentStore: Send + Sync {
    /// Fails with `DuplicateIdempotencyKey` when the idempotency key is
    /// already taken.
    async fn create_payment(&self, payment: &Payment) -> Result<(), StoreError>;

    async fn get_by_provider_payment_id(
        &self,
        provider_payment_id: &str,
        provider_id: &str,
    ) -> Result<Payment, StoreError>;

    /// Full-row replace keyed by id.
    async fn update_payment(&self, payment: &Payment) -> Result<(), StoreError>;

    /// Conditionally applies a webhook-driven status change. The write only
    /// lands when `event_time` is newer than the payment's last applied
    /// event, so a retried stale delivery cannot regress the status.
    /// Returns whether a row changed.
    async fn apply_event(
        &self,
        id: Uuid,
        status: PaymentStatus,
        event_time: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError>;
}

/// Append-only audit log; rows are saved once and never updated.
#[async_trait::async_trait]
pub trait WebhookEventStore: Send + Sync {
    async fn save(&self, event: &WebhookEvent) -> Result<(), StoreError>;
}
