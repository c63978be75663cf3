//! Inbound provider webhook handlers.
//!
//! The provider is always acknowledged with `200 {"status": "Success"}`
//! once the request is accepted - unknown identifiers, failed
//! authentication and unparseable bodies are logged and dropped, never
//! surfaced, so upstream retry storms cannot start. Authentication and
//! parsing complete before the acknowledgment; only the merchant forward
//! happens afterwards, on the forwarder task.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};
use serde_json::{Value, json};

use crate::AppState;
use crate::providers::{ProviderKind, WebhookOptions, create_provider};

/// The header each provider delivers its signature in.
fn signature_header(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Flutterwave => "verif-hash",
        ProviderKind::Paystack => "x-paystack-signature",
        ProviderKind::Stripe => "stripe-signature",
    }
}

/// `POST /webhook` - Flutterwave deliveries.
///
/// Flutterwave sends the configuration identifier as its verification
/// hash, so the header value doubles as the lookup key.
pub async fn receive(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Json<Value> {
    match headers.get("verif-hash").and_then(|value| value.to_str().ok()) {
        Some(identifier) => process(&state, identifier, &headers, &body).await,
        None => tracing::debug!("Webhook delivery without a verif-hash header, dropping"),
    }
    acknowledge()
}

/// `POST /webhook/{identifier}` - deliveries from providers whose
/// signatures are MACs rather than identifiers.
pub async fn receive_for(State(state): State<AppState>, Path(identifier): Path<String>, headers: HeaderMap, body: Bytes) -> Json<Value> {
    process(&state, &identifier, &headers, &body).await;
    acknowledge()
}

fn acknowledge() -> Json<Value> {
    Json(json!({ "status": "Success" }))
}

/// Resolve, authenticate, normalize and dispatch one delivery.
async fn process(state: &AppState, identifier: &str, headers: &HeaderMap, body: &[u8]) {
    let config = match state.store.fetch(identifier).await {
        Ok(Some(config)) => config,
        Ok(None) => {
            tracing::debug!(identifier, "Webhook for unknown identifier, dropping");
            return;
        }
        Err(e) => {
            tracing::warn!(identifier, "Credential lookup failed for webhook: {}", e);
            return;
        }
    };

    let signature = headers
        .get(signature_header(config.kind))
        .and_then(|value| value.to_str().ok());

    let provider = create_provider(config.clone(), state.http.clone(), &state.config.providers);
    match provider.handle_webhook(signature, body, &WebhookOptions::default()).await {
        Ok(Some(event)) => state.events.dispatch(&config, &event, false),
        Ok(None) => tracing::debug!(identifier, "Webhook did not authenticate, no event produced"),
        Err(e) => tracing::warn!(identifier, "Failed to normalize webhook: {}", e),
    }
}
