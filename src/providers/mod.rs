use crate::domain::context::RequestContext;
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::webhook::{CanonicalWebhookEvent, WebhookContext};
use crate::error::{PaymentError, ProviderError};
use std::collections::HashMap;
use std::sync::Arc;

pub mod mock;
pub mod paypal;

#[derive(Debug, Clone)]
pub struct CreatePaymentResult {
    pub provider_payment_id: String,
    pub status: PaymentStatus,
    pub amount_minor: i64,
    pub currency: String,
    pub payment_url: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// The capability set the core consumes. Token handling, endpoint paths and
/// wire shapes stay adapter-private.
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> &'static str;

    async fn create_payment(
        &self,
        ctx: &RequestContext,
        payment: &Payment,
    ) -> Result<CreatePaymentResult, ProviderError>;

    async fn verify_webhook(&self, webhook: &WebhookContext) -> Result<(), ProviderError>;

    fn parse_webhook(&self, payload: &[u8]) -> Result<CanonicalWebhookEvent, ProviderError>;
}

/// Built once at startup and never mutated afterwards, so lookups need no
/// locking.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    pub fn register(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.providers.insert(adapter.id().to_string(), adapter);
        self
    }

    pub fn get(&self, provider_id: &str) -> Result<Arc<dyn ProviderAdapter>, PaymentError> {
        self.providers
            .get(provider_id)
            .cloned()
            .ok_or_else(|| PaymentError::ProviderNotFound(provider_id.to_string()))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
