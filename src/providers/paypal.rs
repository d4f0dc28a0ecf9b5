use crate::domain::context::RequestContext;
use crate::domain::payment::{format_amount, parse_amount, Payment, PaymentStatus};
use crate::domain::webhook::{CanonicalWebhookEvent, WebhookContext};
use crate::error::ProviderError;
use crate::providers::{CreatePaymentResult, ProviderAdapter};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

const PATH_CREATE_ORDER: &str = "/v2/checkout/orders";
const PATH_OAUTH_TOKEN: &str = "/v1/oauth2/token";
const PATH_VERIFY_SIGNATURE: &str = "/v1/notifications/verify-webhook-signature";

pub struct PaypalProvider {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub webhook_id: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

impl PaypalProvider {
    pub fn new(
        base_url: String,
        client_id: String,
        client_secret: String,
        webhook_id: String,
        timeout_ms: u64,
    ) -> Self {
        Self {
            base_url,
            client_id,
            client_secret,
            webhook_id,
            timeout_ms,
            client: reqwest::Client::new(),
        }
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, PATH_OAUTH_TOKEN))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header("Accept", "application/json")
            .form(&[("grant_type", "client_credentials")])
            .timeout(Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(|e| ProviderError::Auth(format!("token request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(ProviderError::Auth(format!(
                "token request returned HTTP {}",
                resp.status().as_u16()
            )));
        }

        let token: AccessTokenResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Auth(format!("bad token response: {e}")))?;
        Ok(token.access_token)
    }

    fn classify_http(status: reqwest::StatusCode, body: &str) -> ProviderError {
        let detail = format!("HTTP {}: {}", status.as_u16(), body.chars().take(200).collect::<String>());
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            ProviderError::Auth(detail)
        } else if status.is_server_error() || status == reqwest::StatusCode::REQUEST_TIMEOUT {
            ProviderError::Transient(detail)
        } else {
            ProviderError::Permanent(detail)
        }
    }

    fn classify_network(e: reqwest::Error) -> ProviderError {
        if e.is_timeout() || e.is_connect() {
            ProviderError::Transient(e.to_string())
        } else {
            ProviderError::Permanent(e.to_string())
        }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for PaypalProvider {
    fn id(&self) -> &'static str {
        "paypal"
    }

    async fn create_payment(
        &self,
        ctx: &RequestContext,
        payment: &Payment,
    ) -> Result<CreatePaymentResult, ProviderError> {
        let token = self.access_token().await?;

        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "amount": {
                    "currency_code": payment.currency,
                    "value": format_amount(payment.amount_minor),
                }
            }]
        });

        let resp = self
            .client
            .post(format!("{}{}", self.base_url, PATH_CREATE_ORDER))
            .bearer_auth(&token)
            .header("PayPal-Request-Id", &ctx.request_id)
            .json(&body)
            .timeout(Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(Self::classify_network)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify_http(status, &body));
        }

        let order: OrderResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("order response: {e}")))?;

        let unit = order
            .purchase_units
            .first()
            .ok_or_else(|| ProviderError::Malformed("order response missing purchase units".to_string()))?;
        let amount_minor = parse_amount(&unit.amount.value)
            .ok_or_else(|| ProviderError::Malformed(format!("bad order amount {}", unit.amount.value)))?;
        let payment_url = order
            .links
            .iter()
            .find(|l| l.rel == "approve")
            .map(|l| l.href.clone());

        Ok(CreatePaymentResult {
            provider_payment_id: order.id,
            status: map_order_status(&order.status),
            amount_minor,
            currency: unit.amount.currency_code.clone(),
            payment_url,
            metadata: HashMap::new(),
        })
    }

    async fn verify_webhook(&self, webhook: &WebhookContext) -> Result<(), ProviderError> {
        let event: serde_json::Value = serde_json::from_slice(&webhook.payload)
            .map_err(|e| ProviderError::Malformed(format!("webhook payload: {e}")))?;

        let body = json!({
            "webhook_id": self.webhook_id,
            "transmission_id": webhook.header("paypal-transmission-id"),
            "transmission_time": webhook.header("paypal-transmission-time"),
            "cert_url": webhook.header("paypal-cert-url"),
            "auth_algo": webhook.header("paypal-auth-algo"),
            "transmission_sig": webhook.signature,
            "webhook_event": event,
        });

        let token = self.access_token().await?;
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, PATH_VERIFY_SIGNATURE))
            .bearer_auth(&token)
            .json(&body)
            .timeout(Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(Self::classify_network)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify_http(status, &body));
        }

        let verification: VerifySignatureResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("verification response: {e}")))?;

        if verification.verification_status == "SUCCESS" {
            Ok(())
        } else {
            Err(ProviderError::Verification(format!(
                "paypal verification_status={}",
                verification.verification_status
            )))
        }
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<CanonicalWebhookEvent, ProviderError> {
        let event: PaypalWebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| ProviderError::Malformed(format!("paypal webhook: {e}")))?;

        let amount_minor = event
            .resource
            .amount
            .as_ref()
            .and_then(|a| parse_amount(&a.total));
        let currency = event.resource.amount.as_ref().map(|a| a.currency.clone());

        Ok(CanonicalWebhookEvent {
            provider_id: "paypal".to_string(),
            status: map_event_type(&event.event_type),
            event_type: event.event_type,
            provider_payment_id: event.resource.id,
            amount_minor,
            currency,
            occurred_at: event.create_time,
        })
    }
}

fn map_order_status(status: &str) -> PaymentStatus {
    match status {
        "COMPLETED" => PaymentStatus::Succeeded,
        "VOIDED" => PaymentStatus::Cancelled,
        // CREATED, SAVED, APPROVED, PAYER_ACTION_REQUIRED: order is alive
        // but money has not moved yet.
        _ => PaymentStatus::Processing,
    }
}

fn map_event_type(event_type: &str) -> Option<PaymentStatus> {
    match event_type {
        "CHECKOUT.ORDER.APPROVED" => Some(PaymentStatus::Processing),
        "CHECKOUT.ORDER.COMPLETED" | "PAYMENT.CAPTURE.COMPLETED" => Some(PaymentStatus::Succeeded),
        "CHECKOUT.PAYMENT-APPROVAL.REVERSED" | "PAYMENT.CAPTURE.DENIED" => {
            Some(PaymentStatus::Failed)
        }
        "PAYMENT.CAPTURE.REFUNDED" => Some(PaymentStatus::Refunded),
        _ => None,
    }
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Deserialize)]
struct PurchaseUnit {
    amount: OrderAmount,
}

#[derive(Deserialize)]
struct OrderAmount {
    currency_code: String,
    value: String,
}

#[derive(Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Deserialize)]
struct VerifySignatureResponse {
    verification_status: String,
}

#[derive(Deserialize)]
struct PaypalWebhookEvent {
    event_type: String,
    create_time: DateTime<Utc>,
    resource: PaypalResource,
}

#[derive(Deserialize)]
struct PaypalResource {
    id: String,
    #[serde(default)]
    amount: Option<PaypalAmount>,
}

#[derive(Deserialize)]
struct PaypalAmount {
    total: String,
    currency: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_event_types() {
        assert_eq!(
            map_event_type("CHECKOUT.ORDER.COMPLETED"),
            Some(PaymentStatus::Succeeded)
        );
        assert_eq!(
            map_event_type("CHECKOUT.ORDER.APPROVED"),
            Some(PaymentStatus::Processing)
        );
        assert_eq!(
            map_event_type("PAYMENT.CAPTURE.REFUNDED"),
            Some(PaymentStatus::Refunded)
        );
    }

    #[test]
    fn unknown_event_type_is_a_no_op() {
        assert_eq!(map_event_type("BILLING.PLAN.CREATED"), None);
    }

    #[test]
    fn parses_webhook_payload() {
        let provider = PaypalProvider::new(
            "https://api.sandbox.paypal.com".to_string(),
            "id".to_string(),
            "secret".to_string(),
            "wh1".to_string(),
            5000,
        );

        let payload = serde_json::json!({
            "event_type": "CHECKOUT.ORDER.COMPLETED",
            "create_time": "2024-05-01T10:00:00Z",
            "resource": {
                "id": "PPID1",
                "amount": { "total": "100.00", "currency": "USD" }
            }
        });

        let event = provider
            .parse_webhook(payload.to_string().as_bytes())
            .unwrap();
        assert_eq!(event.provider_payment_id, "PPID1");
        assert_eq!(event.status, Some(PaymentStatus::Succeeded));
        assert_eq!(event.amount_minor, Some(10_000));
        assert_eq!(event.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn rejects_garbage_payload() {
        let provider = PaypalProvider::new(
            "https://api.sandbox.paypal.com".to_string(),
            "id".to_string(),
            "secret".to_string(),
            "wh1".to_string(),
            5000,
        );
        assert!(matches!(
            provider.parse_webhook(b"not json"),
            Err(ProviderError::Malformed(_))
        ));
    }
}
