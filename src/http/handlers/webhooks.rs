use crate::domain::webhook::WebhookContext;
use crate::http::handlers::payments::request_context;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use std::collections::HashMap;

const SIGNATURE_HEADERS: &[&str] = &["paypal-transmission-sig", "x-webhook-signature"];

/// Providers retry on anything but a clean acknowledgement, so the reply is
/// a receipt, not a processing verdict: failures are durably recorded in the
/// audit log and diagnosed from there.
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let ctx = request_context(&headers);

    let mut header_map = HashMap::new();
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            header_map.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }

    let signature = SIGNATURE_HEADERS
        .iter()
        .find_map(|name| header_map.get(*name).cloned())
        .unwrap_or_default();

    let webhook = WebhookContext {
        payload: body.to_vec(),
        signature,
        headers: header_map,
    };

    if let Err(e) = state
        .webhook_service
        .execute(&ctx, &provider_id, webhook)
        .await
    {
        tracing::warn!(
            request_id = %ctx.request_id,
            provider = %provider_id,
            error = %e,
            "webhook acknowledged despite processing failure"
        );
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({"status": "received"})),
    )
}
