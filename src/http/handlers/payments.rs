use crate::domain::context::RequestContext;
use crate::domain::payment::{format_amount, parse_amount, valid_currency, Payment};
use crate::error::{ErrorEnvelope, PaymentError};
use crate::idempotency::{CachedResponse, IdempotencyCheck};
use crate::service::payment_service::CreatePaymentInput;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Amounts arrive either as a decimal string (`"10.50"`) or a bare JSON
/// number (`10.50`); both funnel into the same decimal-text parser.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Text(String),
    Number(serde_json::Number),
}

impl Amount {
    fn decimal_text(&self) -> String {
        match self {
            Amount::Text(s) => s.clone(),
            Amount::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount: Amount,
    pub currency: String,
    pub provider_id: String,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    pub id: Uuid,
    pub status: String,
    pub amount: String,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl CreatePaymentResponse {
    fn from_payment(payment: &Payment) -> Self {
        Self {
            id: payment.id,
            status: payment.status.as_str().to_string(),
            amount: format_amount(payment.amount_minor),
            currency: payment.currency.clone(),
            created_at: payment.created_at,
        }
    }
}

pub async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ctx = request_context(&headers);
    let explicit_key = headers
        .get("Idempotency-Key")
        .and_then(|h| h.to_str().ok());

    let claim = match state.idempotency.check(explicit_key, &body).await {
        Ok(IdempotencyCheck::Claimed(key)) => key,
        Ok(IdempotencyCheck::Replay(cached)) => {
            let status =
                StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
            return (status, Json(cached.body)).into_response();
        }
        Ok(IdempotencyCheck::InFlight) => {
            return error_response(
                StatusCode::CONFLICT,
                "REQUEST_IN_FLIGHT",
                "a request with this idempotency key is already executing",
            );
        }
        Err(e) => {
            tracing::error!(request_id = %ctx.request_id, error = %e, "idempotency cache unavailable");
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "IDEMPOTENCY_UNAVAILABLE",
                "unable to deduplicate request",
            );
        }
    };

    let result = handle_create(&state, &ctx, &claim, &body).await;

    match result {
        Ok(payment) => {
            let response = CreatePaymentResponse::from_payment(&payment);
            let body = serde_json::to_value(&response).unwrap_or_default();
            let cached = CachedResponse {
                status: StatusCode::CREATED.as_u16(),
                body: body.clone(),
            };
            if let Err(e) = state.idempotency.record(&claim, &cached).await {
                tracing::warn!(request_id = %ctx.request_id, error = %e, "failed to cache idempotent response");
            }
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(err) => {
            if let Err(e) = state.idempotency.release(&claim).await {
                tracing::warn!(request_id = %ctx.request_id, error = %e, "failed to release idempotency claim");
            }
            map_error(&ctx, err)
        }
    }
}

async fn handle_create(
    state: &AppState,
    ctx: &RequestContext,
    idempotency_key: &str,
    body: &[u8],
) -> Result<Payment, PaymentError> {
    let request: CreatePaymentRequest = serde_json::from_slice(body)
        .map_err(|e| PaymentError::Client(format!("invalid request body: {e}")))?;

    let amount_minor = parse_amount(&request.amount.decimal_text())
        .ok_or_else(|| PaymentError::Client("amount must be a positive decimal".to_string()))?;
    if !valid_currency(&request.currency) {
        return Err(PaymentError::Client(
            "currency must be a 3-letter ISO-4217 code".to_string(),
        ));
    }

    state
        .payment_service
        .execute(
            ctx,
            CreatePaymentInput {
                idempotency_key: idempotency_key.to_string(),
                amount_minor,
                currency: request.currency,
                provider_id: request.provider_id,
                metadata: request.metadata,
            },
        )
        .await
}

pub(crate) fn request_context(headers: &HeaderMap) -> RequestContext {
    match headers.get("X-Request-Id").and_then(|h| h.to_str().ok()) {
        Some(id) if !id.is_empty() => RequestContext::with_request_id(id),
        _ => RequestContext::new(),
    }
}

/// Detail stays in the logs; the client sees a coarse code and message.
fn map_error(ctx: &RequestContext, err: PaymentError) -> Response {
    tracing::error!(request_id = %ctx.request_id, error = %err, "create payment failed");

    match err {
        PaymentError::Client(message) => {
            error_response(StatusCode::BAD_REQUEST, "INVALID_REQUEST", &message)
        }
        PaymentError::ProviderNotFound(provider) => error_response(
            StatusCode::BAD_REQUEST,
            "UNKNOWN_PROVIDER",
            &format!("provider {provider} is not configured"),
        ),
        PaymentError::Conflict => error_response(
            StatusCode::CONFLICT,
            "DUPLICATE_IDEMPOTENCY_KEY",
            "a payment with this idempotency key already exists",
        ),
        PaymentError::Provider(_) => error_response(
            StatusCode::BAD_GATEWAY,
            "PROVIDER_ERROR",
            "the payment could not be completed",
        ),
        _ => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "failed to create payment",
        ),
    }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(ErrorEnvelope::new(code, message))).into_response()
}
