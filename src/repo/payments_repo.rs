use crate::domain::payment::{Payment, PaymentStatus};
use crate::error::StoreError;
use crate::repo::PaymentStore;
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PaymentsRepo {
    pub pool: PgPool,
}

fn metadata_to_json(metadata: &Option<HashMap<String, String>>) -> Option<serde_json::Value> {
    metadata
        .as_ref()
        .map(|m| serde_json::to_value(m).unwrap_or(serde_json::Value::Null))
}

fn row_to_payment(row: PgRow) -> Result<Payment, StoreError> {
    let status: String = row.get("status");
    let status = PaymentStatus::parse(&status)
        .ok_or_else(|| StoreError::Backend(anyhow!("unknown payment status {status}")))?;

    let metadata: Option<serde_json::Value> = row.get("metadata");
    let metadata = match metadata {
        Some(value) => Some(
            serde_json::from_value::<HashMap<String, String>>(value)
                .map_err(|e| StoreError::Backend(anyhow!("bad metadata column: {e}")))?,
        ),
        None => None,
    };

    Ok(Payment {
        id: row.get("id"),
        amount_minor: row.get("amount_minor"),
        currency: row.get("currency"),
        idempotency_key: row.get("idempotency_key"),
        provider_id: row.get("provider_id"),
        provider_payment_id: row.get("provider_payment_id"),
        status,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        completed_at: row.get("completed_at"),
        expires_at: row.get("expires_at"),
        last_event_at: row.get("last_event_at"),
        metadata,
    })
}

#[async_trait::async_trait]
impl PaymentStore for PaymentsRepo {
    async fn create_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payments (
                id, amount_minor, currency, idempotency_key, provider_id,
                provider_payment_id, status, created_at, updated_at,
                completed_at, expires_at, last_event_at, metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(payment.id)
        .bind(payment.amount_minor)
        .bind(&payment.currency)
        .bind(&payment.idempotency_key)
        .bind(&payment.provider_id)
        .bind(&payment.provider_payment_id)
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .bind(payment.completed_at)
        .bind(payment.expires_at)
        .bind(payment.last_event_at)
        .bind(metadata_to_json(&payment.metadata))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(StoreError::DuplicateIdempotencyKey)
            }
            Err(e) => Err(StoreError::Backend(anyhow!("insert payment: {e}"))),
        }
    }

    async fn get_by_provider_payment_id(
        &self,
        provider_payment_id: &str,
        provider_id: &str,
    ) -> Result<Payment, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, amount_minor, currency, idempotency_key, provider_id,
                   provider_payment_id, status, created_at, updated_at,
                   completed_at, expires_at, last_event_at, metadata
            FROM payments
            WHERE provider_payment_id = $1 AND provider_id = $2
            "#,
        )
        .bind(provider_payment_id)
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(anyhow!("get payment: {e}")))?;

        match row {
            Some(row) => row_to_payment(row),
            None => Err(StoreError::PaymentNotFound),
        }
    }

    async fn update_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET
                amount_minor = $2,
                currency = $3,
                provider_payment_id = $4,
                status = $5,
                updated_at = $6,
                completed_at = $7,
                expires_at = $8,
                last_event_at = $9,
                metadata = $10
            WHERE id = $1
            "#,
        )
        .bind(payment.id)
        .bind(payment.amount_minor)
        .bind(&payment.currency)
        .bind(&payment.provider_payment_id)
        .bind(payment.status.as_str())
        .bind(payment.updated_at)
        .bind(payment.completed_at)
        .bind(payment.expires_at)
        .bind(payment.last_event_at)
        .bind(metadata_to_json(&payment.metadata))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(anyhow!("update payment: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::PaymentNotFound);
        }
        Ok(())
    }

    async fn apply_event(
        &self,
        id: Uuid,
        status: PaymentStatus,
        event_time: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET
                status = $2,
                updated_at = now(),
                completed_at = COALESCE($3, completed_at),
                last_event_at = $4
            WHERE id = $1
              AND (last_event_at IS NULL OR last_event_at < $4)
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(completed_at)
        .bind(event_time)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(anyhow!("apply event: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}
