#![allow(dead_code)]

use chrono::{DateTime, Utc};
use payment_reconciler::domain::context::RequestContext;
use payment_reconciler::domain::payment::{Payment, PaymentStatus};
use payment_reconciler::domain::webhook::{CanonicalWebhookEvent, WebhookContext, WebhookEvent};
use payment_reconciler::error::{ProviderError, StoreError};
use payment_reconciler::idempotency::IdempotencyCache;
use payment_reconciler::providers::mock::{MockBehavior, MockProvider};
use payment_reconciler::providers::{CreatePaymentResult, ProviderAdapter};
use payment_reconciler::repo::{PaymentStore, WebhookEventStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryPaymentStore {
    pub payments: Mutex<HashMap<Uuid, Payment>>,
    pub create_calls: AtomicUsize,
    pub fail_updates: AtomicBool,
    pub create_delay_ms: AtomicU64,
}

impl MemoryPaymentStore {
    pub fn seed(&self, payment: Payment) {
        self.payments.lock().unwrap().insert(payment.id, payment);
    }

    pub fn get(&self, id: Uuid) -> Option<Payment> {
        self.payments.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.payments.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn create_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let mut payments = self.payments.lock().unwrap();
        if payments
            .values()
            .any(|p| p.idempotency_key == payment.idempotency_key)
        {
            return Err(StoreError::DuplicateIdempotencyKey);
        }
        payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get_by_provider_payment_id(
        &self,
        provider_payment_id: &str,
        provider_id: &str,
    ) -> Result<Payment, StoreError> {
        self.payments
            .lock()
            .unwrap()
            .values()
            .find(|p| {
                p.provider_payment_id.as_deref() == Some(provider_payment_id)
                    && p.provider_id == provider_id
            })
            .cloned()
            .ok_or(StoreError::PaymentNotFound)
    }

    async fn update_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow::anyhow!("simulated write failure")));
        }
        let mut payments = self.payments.lock().unwrap();
        if !payments.contains_key(&payment.id) {
            return Err(StoreError::PaymentNotFound);
        }
        payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn apply_event(
        &self,
        id: Uuid,
        status: PaymentStatus,
        event_time: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow::anyhow!("simulated write failure")));
        }
        let mut payments = self.payments.lock().unwrap();
        let payment = payments.get_mut(&id).ok_or(StoreError::PaymentNotFound)?;
        if payment.last_event_at.is_some_and(|last| last >= event_time) {
            return Ok(false);
        }
        payment.status = status;
        payment.updated_at = Utc::now();
        if completed_at.is_some() {
            payment.completed_at = completed_at;
        }
        payment.last_event_at = Some(event_time);
        Ok(true)
    }
}

#[derive(Default)]
pub struct MemoryWebhookEventStore {
    pub events: Mutex<Vec<WebhookEvent>>,
}

impl MemoryWebhookEventStore {
    pub fn all(&self) -> Vec<WebhookEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl WebhookEventStore for MemoryWebhookEventStore {
    async fn save(&self, event: &WebhookEvent) -> Result<(), StoreError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCache {
    pub entries: Mutex<HashMap<String, String>>,
}

#[async_trait::async_trait]
impl IdempotencyCache for MemoryCache {
    async fn put_if_absent(&self, key: &str, value: &str, _ttl: Duration) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(key) {
            Ok(false)
        } else {
            entries.insert(key.to_string(), value.to_string());
            Ok(true)
        }
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str, _ttl: Duration) -> anyhow::Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

pub enum CreateOutcome {
    Succeed {
        provider_payment_id: String,
        status: PaymentStatus,
        metadata: HashMap<String, String>,
    },
    Reject,
    Delay(Duration),
}

/// Deterministic adapter for creation-flow tests: scripted outcome, call
/// counting, mock-format webhook parsing.
pub struct ScriptedProvider {
    pub outcome: CreateOutcome,
    pub create_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn succeeding(provider_payment_id: &str, status: PaymentStatus) -> Self {
        Self {
            outcome: CreateOutcome::Succeed {
                provider_payment_id: provider_payment_id.to_string(),
                status,
                metadata: HashMap::new(),
            },
            create_calls: AtomicUsize::new(0),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            outcome: CreateOutcome::Reject,
            create_calls: AtomicUsize::new(0),
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            outcome: CreateOutcome::Delay(delay),
            create_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn id(&self) -> &'static str {
        "mock"
    }

    async fn create_payment(
        &self,
        _ctx: &RequestContext,
        payment: &Payment,
    ) -> Result<CreatePaymentResult, ProviderError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            CreateOutcome::Succeed {
                provider_payment_id,
                status,
                metadata,
            } => Ok(CreatePaymentResult {
                provider_payment_id: provider_payment_id.clone(),
                status: *status,
                amount_minor: payment.amount_minor,
                currency: payment.currency.clone(),
                payment_url: None,
                metadata: metadata.clone(),
            }),
            CreateOutcome::Reject => Err(ProviderError::Permanent("card declined".to_string())),
            CreateOutcome::Delay(delay) => {
                tokio::time::sleep(*delay).await;
                Err(ProviderError::Transient("too late anyway".to_string()))
            }
        }
    }

    async fn verify_webhook(&self, webhook: &WebhookContext) -> Result<(), ProviderError> {
        MockProvider::new(MockBehavior::AlwaysSucceed)
            .verify_webhook(webhook)
            .await
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<CanonicalWebhookEvent, ProviderError> {
        MockProvider::new(MockBehavior::AlwaysSucceed).parse_webhook(payload)
    }
}

pub fn pending_payment(provider_id: &str, provider_payment_id: Option<&str>) -> Payment {
    let now = Utc::now();
    Payment {
        id: Uuid::new_v4(),
        amount_minor: 10_000,
        currency: "USD".to_string(),
        idempotency_key: Uuid::new_v4().to_string(),
        provider_id: provider_id.to_string(),
        provider_payment_id: provider_payment_id.map(str::to_string),
        status: PaymentStatus::Pending,
        created_at: now,
        updated_at: now,
        completed_at: None,
        expires_at: None,
        last_event_at: None,
        metadata: None,
    }
}

pub fn webhook_context(payload: serde_json::Value, signature: &str) -> WebhookContext {
    WebhookContext {
        payload: payload.to_string().into_bytes(),
        signature: signature.to_string(),
        headers: HashMap::new(),
    }
}
