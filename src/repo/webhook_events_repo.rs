use crate::domain::webhook::WebhookEvent;
use crate::error::StoreError;
use crate::repo::WebhookEventStore;
use anyhow::anyhow;
use sqlx::PgPool;

#[derive(Clone)]
pub struct WebhookEventsRepo {
    pub pool: PgPool,
}

#[async_trait::async_trait]
impl WebhookEventStore for WebhookEventsRepo {
    async fn save(&self, event: &WebhookEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO webhook_events (
                id, provider_id, provider_payment_id, event_type, signature,
                payload, is_verified, is_processed, processing_error,
                received_at, processed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(event.id)
        .bind(&event.provider_id)
        .bind(&event.provider_payment_id)
        .bind(&event.event_type)
        .bind(&event.signature)
        .bind(&event.payload)
        .bind(event.is_verified)
        .bind(event.is_processed)
        .bind(&event.processing_error)
        .bind(event.received_at)
        .bind(event.processed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(anyhow!("save webhook event: {e}")))?;

        Ok(())
    }
}
