use crate::domain::context::RequestContext;
use crate::domain::payment::{validate_transition, Payment, PaymentStatus};
use crate::error::{PaymentError, ProviderError, StoreError};
use crate::providers::ProviderRegistry;
use crate::repo::PaymentStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CreatePaymentInput {
    pub idempotency_key: String,
    pub amount_minor: i64,
    pub currency: String,
    pub provider_id: String,
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Clone)]
pub struct PaymentService {
    pub store: Arc<dyn PaymentStore>,
    pub registry: Arc<ProviderRegistry>,
    pub provider_timeout: Duration,
}

impl PaymentService {
    /// Creates a payment: durable pending record first, then the synchronous
    /// provider call, then status finalization. No automatic retries here;
    /// retry and backoff are caller policy.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        input: CreatePaymentInput,
    ) -> Result<Payment, PaymentError> {
        let start = Instant::now();

        // Unknown provider fails before anything is persisted.
        let adapter = self.registry.get(&input.provider_id)?;

        let now = Utc::now();
        let mut payment = Payment {
            id: Uuid::new_v4(),
            amount_minor: input.amount_minor,
            currency: input.currency,
            idempotency_key: input.idempotency_key,
            provider_id: input.provider_id,
            provider_payment_id: None,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
            completed_at: None,
            expires_at: None,
            last_event_at: None,
            metadata: input.metadata,
        };

        // Durable commit point. A crash after this leaves a pending row with
        // no provider reference; recovery correlates by idempotency key and
        // creation time.
        self.store.create_payment(&payment).await.map_err(|e| match e {
            StoreError::DuplicateIdempotencyKey => PaymentError::Conflict,
            other => PaymentError::Persistence(other),
        })?;

        let call = adapter.create_payment(ctx, &payment);
        let result = match tokio::time::timeout(self.provider_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Transient(format!(
                "provider call timed out after {:?}",
                self.provider_timeout
            ))),
        };

        let result = match result {
            Ok(result) => result,
            Err(provider_err) => {
                return Err(self.compensate(ctx, payment, provider_err, start).await);
            }
        };

        if result.status != PaymentStatus::Pending {
            validate_transition(PaymentStatus::Pending, result.status).map_err(|e| {
                PaymentError::Provider(ProviderError::Permanent(format!(
                    "provider returned unusable status: {e}"
                )))
            })?;
            payment.status = result.status;
        }
        payment.provider_payment_id = Some(result.provider_payment_id);
        if !result.metadata.is_empty() {
            payment
                .metadata
                .get_or_insert_with(HashMap::new)
                .extend(result.metadata);
        }
        if payment.status == PaymentStatus::Succeeded {
            payment.completed_at = Some(Utc::now());
        }
        payment.updated_at = Utc::now();

        self.store
            .update_payment(&payment)
            .await
            .map_err(PaymentError::Persistence)?;

        tracing::info!(
            request_id = %ctx.request_id,
            payment_id = %payment.id,
            provider = %payment.provider_id,
            status = payment.status.as_str(),
            latency_ms = start.elapsed().as_millis() as u64,
            "payment created"
        );

        Ok(payment)
    }

    /// Compensating write after a failed provider call. If the write itself
    /// fails, both causes are surfaced together rather than either being
    /// dropped.
    async fn compensate(
        &self,
        ctx: &RequestContext,
        mut payment: Payment,
        provider_err: ProviderError,
        start: Instant,
    ) -> PaymentError {
        payment.status = PaymentStatus::Failed;
        payment.updated_at = Utc::now();

        let outcome = match self.store.update_payment(&payment).await {
            Ok(()) => PaymentError::Provider(provider_err),
            Err(persistence) => {
                tracing::error!(
                    request_id = %ctx.request_id,
                    payment_id = %payment.id,
                    provider_error = %provider_err,
                    persistence_error = %persistence,
                    "compensating write failed after provider error"
                );
                return PaymentError::Compensation {
                    provider: provider_err,
                    persistence,
                };
            }
        };

        tracing::warn!(
            request_id = %ctx.request_id,
            payment_id = %payment.id,
            provider = %payment.provider_id,
            error = %outcome,
            latency_ms = start.elapsed().as_millis() as u64,
            "payment failed at provider"
        );

        outcome
    }
}
