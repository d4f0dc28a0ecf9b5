use crate::domain::payment::PaymentStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Append-only audit record. One row per inbound delivery, verified or not,
/// written exactly once and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub provider_id: String,
    pub provider_payment_id: Option<String>,
    pub event_type: Option<String>,
    pub signature: String,
    pub payload: String,
    pub is_verified: bool,
    pub is_processed: bool,
    pub processing_error: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WebhookEvent {
    pub fn received(provider_id: &str, webhook: &WebhookContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider_id: provider_id.to_string(),
            provider_payment_id: None,
            event_type: None,
            signature: webhook.signature.clone(),
            payload: String::from_utf8_lossy(&webhook.payload).into_owned(),
            is_verified: false,
            is_processed: false,
            processing_error: None,
            received_at: Utc::now(),
            processed_at: None,
        }
    }
}

/// Raw inbound delivery as seen at the HTTP boundary. Header names are
/// lowercased so adapters can look them up without caring about casing.
#[derive(Debug, Clone)]
pub struct WebhookContext {
    pub payload: Vec<u8>,
    pub signature: String,
    pub headers: HashMap<String, String>,
}

impl WebhookContext {
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Provider-agnostic form of an inbound notification. `status == None`
/// means the event type is recognized as a no-op: no status change.
#[derive(Debug, Clone)]
pub struct CanonicalWebhookEvent {
    pub provider_id: String,
    pub event_type: String,
    pub provider_payment_id: String,
    pub status: Option<PaymentStatus>,
    pub amount_minor: Option<i64>,
    pub currency: Option<String>,
    pub occurred_at: DateTime<Utc>,
}
