use crate::domain::context::RequestContext;
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::webhook::{CanonicalWebhookEvent, WebhookContext};
use crate::error::ProviderError;
use crate::providers::{CreatePaymentResult, ProviderAdapter};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    AlwaysSucceed,
    AlwaysFail,
    AlwaysTimeout,
    RejectWebhooks,
}

impl MockBehavior {
    pub fn from_str(s: &str) -> Self {
        match s {
            "ALWAYS_FAIL" => MockBehavior::AlwaysFail,
            "ALWAYS_TIMEOUT" => MockBehavior::AlwaysTimeout,
            "REJECT_WEBHOOKS" => MockBehavior::RejectWebhooks,
            _ => MockBehavior::AlwaysSucceed,
        }
    }
}

pub struct MockProvider {
    pub behavior: MockBehavior,
}

impl MockProvider {
    pub fn new(behavior: MockBehavior) -> Self {
        Self { behavior }
    }
}

#[derive(Deserialize)]
struct MockWebhookPayload {
    provider_payment_id: String,
    event_type: String,
    #[serde(default)]
    amount_minor: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    occurred_at: DateTime<Utc>,
}

#[async_trait::async_trait]
impl ProviderAdapter for MockProvider {
    fn id(&self) -> &'static str {
        "mock"
    }

    async fn create_payment(
        &self,
        _ctx: &RequestContext,
        payment: &Payment,
    ) -> Result<CreatePaymentResult, ProviderError> {
        match self.behavior {
            MockBehavior::AlwaysFail => {
                Err(ProviderError::Permanent("mock decline".to_string()))
            }
            MockBehavior::AlwaysTimeout => {
                Err(ProviderError::Transient("mock timeout".to_string()))
            }
            _ => Ok(CreatePaymentResult {
                provider_payment_id: format!("mock_txn_{}", Uuid::new_v4()),
                status: PaymentStatus::Succeeded,
                amount_minor: payment.amount_minor,
                currency: payment.currency.clone(),
                payment_url: None,
                metadata: HashMap::new(),
            }),
        }
    }

    async fn verify_webhook(&self, webhook: &WebhookContext) -> Result<(), ProviderError> {
        if self.behavior == MockBehavior::RejectWebhooks {
            return Err(ProviderError::Verification(
                "mock signature rejected".to_string(),
            ));
        }
        if webhook.signature.is_empty() {
            return Err(ProviderError::Verification("missing signature".to_string()));
        }
        Ok(())
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<CanonicalWebhookEvent, ProviderError> {
        let parsed: MockWebhookPayload = serde_json::from_slice(payload)
            .map_err(|e| ProviderError::Malformed(format!("mock webhook: {e}")))?;

        let status = match parsed.event_type.as_str() {
            "payment.processing" => Some(PaymentStatus::Processing),
            "payment.succeeded" => Some(PaymentStatus::Succeeded),
            "payment.failed" => Some(PaymentStatus::Failed),
            "payment.cancelled" => Some(PaymentStatus::Cancelled),
            "payment.refunded" => Some(PaymentStatus::Refunded),
            "payment.partially_refunded" => Some(PaymentStatus::PartialRefund),
            _ => None,
        };

        Ok(CanonicalWebhookEvent {
            provider_id: "mock".to_string(),
            event_type: parsed.event_type,
            provider_payment_id: parsed.provider_payment_id,
            status,
            amount_minor: parsed.amount_minor,
            currency: parsed.currency,
            occurred_at: parsed.occurred_at,
        })
    }
}
