use crate::domain::context::RequestContext;
use crate::domain::payment::{validate_transition, PaymentStatus};
use crate::domain::webhook::{WebhookContext, WebhookEvent};
use crate::error::{PaymentError, StoreError};
use crate::providers::{ProviderAdapter, ProviderRegistry};
use crate::repo::{PaymentStore, WebhookEventStore};
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct WebhookService {
    pub payment_store: Arc<dyn PaymentStore>,
    pub event_store: Arc<dyn WebhookEventStore>,
    pub registry: Arc<ProviderRegistry>,
}

impl WebhookService {
    /// Verifies, parses, audits and applies one inbound delivery. The audit
    /// row is saved exactly once whatever happens past provider resolution,
    /// with the verification outcome and any processing error recorded.
    /// Callers acknowledge the provider regardless of the result here.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        provider_id: &str,
        webhook: WebhookContext,
    ) -> Result<(), PaymentError> {
        // No adapter, no further work: an unregistered provider id cannot
        // even be attributed in the audit log.
        let adapter = self.registry.get(provider_id)?;

        let mut audit = WebhookEvent::received(provider_id, &webhook);
        let outcome = self
            .reconcile(ctx, adapter.as_ref(), &webhook, &mut audit)
            .await;

        if let Err(e) = &outcome {
            audit.processing_error = Some(e.to_string());
        }
        audit.processed_at = Some(Utc::now());

        if let Err(save_err) = self.event_store.save(&audit).await {
            tracing::error!(
                request_id = %ctx.request_id,
                provider = provider_id,
                error = %save_err,
                "failed to persist webhook audit row"
            );
            return Err(PaymentError::Persistence(save_err));
        }

        match &outcome {
            Ok(()) => tracing::info!(
                request_id = %ctx.request_id,
                provider = provider_id,
                event_type = audit.event_type.as_deref().unwrap_or("unknown"),
                verified = audit.is_verified,
                processed = audit.is_processed,
                "webhook reconciled"
            ),
            Err(e) => tracing::warn!(
                request_id = %ctx.request_id,
                provider = provider_id,
                event_type = audit.event_type.as_deref().unwrap_or("unknown"),
                verified = audit.is_verified,
                error = %e,
                "webhook processing failed"
            ),
        }

        outcome
    }

    async fn reconcile(
        &self,
        ctx: &RequestContext,
        adapter: &dyn ProviderAdapter,
        webhook: &WebhookContext,
        audit: &mut WebhookEvent,
    ) -> Result<(), PaymentError> {
        // An unverified payload is never trusted; the failed attempt still
        // ends up in the audit log for forensics.
        adapter
            .verify_webhook(webhook)
            .await
            .map_err(|e| PaymentError::Verification(e.to_string()))?;
        audit.is_verified = true;

        let event = adapter
            .parse_webhook(&webhook.payload)
            .map_err(PaymentError::Provider)?;
        audit.provider_payment_id = Some(event.provider_payment_id.clone());
        audit.event_type = Some(event.event_type.clone());

        // Unrecognized event types are deliberate no-ops, not failures.
        let new_status = match event.status {
            Some(status) => status,
            None => {
                audit.is_processed = true;
                return Ok(());
            }
        };

        let payment = self
            .payment_store
            .get_by_provider_payment_id(&event.provider_payment_id, &audit.provider_id)
            .await
            .map_err(|e| match e {
                StoreError::PaymentNotFound => PaymentError::NotFound(format!(
                    "provider_payment_id={} provider={}",
                    event.provider_payment_id, audit.provider_id
                )),
                other => PaymentError::Persistence(other),
            })?;

        // Stale deliveries (at or before the watermark) and moves the state
        // machine forbids are ignored, never applied.
        if payment
            .last_event_at
            .is_some_and(|last| event.occurred_at <= last)
        {
            tracing::info!(
                request_id = %ctx.request_id,
                payment_id = %payment.id,
                event_type = %event.event_type,
                "stale webhook event ignored"
            );
            audit.is_processed = true;
            return Ok(());
        }

        if new_status != payment.status {
            if let Err(e) = validate_transition(payment.status, new_status) {
                tracing::info!(
                    request_id = %ctx.request_id,
                    payment_id = %payment.id,
                    event_type = %event.event_type,
                    "webhook event ignored: {e}"
                );
                audit.is_processed = true;
                return Ok(());
            }
        }

        let completed_at = (new_status == PaymentStatus::Succeeded).then(Utc::now);
        let applied = self
            .payment_store
            .apply_event(payment.id, new_status, event.occurred_at, completed_at)
            .await
            .map_err(PaymentError::Persistence)?;

        if !applied {
            // A concurrent delivery advanced the watermark first.
            tracing::info!(
                request_id = %ctx.request_id,
                payment_id = %payment.id,
                event_type = %event.event_type,
                "webhook event lost the watermark race, ignored"
            );
        }

        audit.is_processed = true;
        Ok(())
    }
}
