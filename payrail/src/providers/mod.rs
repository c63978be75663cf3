//! Payment provider abstraction layer
//!
//! This module defines the `PaymentProvider` trait which abstracts payment
//! processing functionality across the supported processors (Flutterwave,
//! Paystack, Stripe).

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ProviderEndpoints;
use crate::webhooks::events::CanonicalEvent;

pub mod flutterwave;
pub mod http;
pub mod paystack;
pub mod stripe;

pub use http::ProviderClient;

/// Create a payment provider from a resolved configuration record.
///
/// This is the single point where we convert config into provider instances.
/// Adding a new provider requires adding a match arm here.
pub fn create_provider(config: ProviderConfig, http: reqwest::Client, endpoints: &ProviderEndpoints) -> Box<dyn PaymentProvider> {
    match config.kind {
        ProviderKind::Flutterwave => Box::new(flutterwave::FlutterwaveAdapter::new(config, http, &endpoints.flutterwave_url)),
        ProviderKind::Paystack => Box::new(paystack::PaystackAdapter::new(config, http, &endpoints.paystack_url)),
        ProviderKind::Stripe => Box::new(stripe::StripeAdapter::new(config, http, &endpoints.stripe_url)),
    }
}

/// Result type for payment provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur while talking to a payment processor
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider actively rejected the request (non-2xx with a message)
    #[error("provider rejected the request: {0}")]
    Rejected(String),

    /// A 2xx response was missing fields the provider contractually sends
    #[error("provider response violated its contract: {0}")]
    Contract(String),

    /// The caller supplied data the provider cannot accept
    #[error("invalid request: {0}")]
    Request(String),

    #[error("{0} is not supported by this provider")]
    Unsupported(&'static str),

    /// A payload could not be decoded or encoded as JSON
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Which processor a configuration record points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Flutterwave,
    Paystack,
    Stripe,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flutterwave => write!(f, "flutterwave"),
            Self::Paystack => write!(f, "paystack"),
            Self::Stripe => write!(f, "stripe"),
        }
    }
}

/// Credentials and routing for one merchant's provider account.
///
/// Constructed fresh for every inbound request from the remote credential
/// store; never cached, never mutated.
#[derive(Clone, Serialize)]
pub struct ProviderConfig {
    /// Opaque externally-assigned key for the record
    pub identifier: String,
    pub kind: ProviderKind,
    pub public_key: String,
    pub secret_key: String,
    /// Shared secret used to authenticate inbound webhooks. For Flutterwave
    /// this equals `identifier` - the provider is configured to send the
    /// record id as its `verif-hash`.
    pub webhook_secret: String,
    pub test_mode: bool,
    /// Merchant URL notified after successful webhook normalization
    pub callback_url: Option<String>,
}

// Credentials must never reach the logs.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("identifier", &self.identifier)
            .field("kind", &self.kind)
            .field("public_key", &"[redacted]")
            .field("secret_key", &"[redacted]")
            .field("webhook_secret", &"[redacted]")
            .field("test_mode", &self.test_mode)
            .field("callback_url", &self.callback_url)
            .finish()
    }
}

/// Caller-supplied inputs for building a checkout payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckoutRequest {
    pub order: String,
    pub amount: Decimal,
    pub currency: Option<String>,
    /// Explicit transaction reference; defaults to `order`
    pub reference: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub logo: Option<String>,
    /// Caller-supplied payment method list, used when the provider has no
    /// menu for the requested currency
    pub payment_options: Option<String>,
    pub meta: Option<Value>,
    /// URL the provider redirects to (or calls back) after payment
    pub callback_url: Option<String>,
    /// Return target for embedded/session flows
    pub return_url: Option<String>,
}

/// Outcome of a transaction-verification query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    pub ok: bool,
    pub message: String,
    /// Provider-reported detail; present only for successful verifications
    /// that were not restricted to an amount check
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl VerificationResult {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            data: None,
        }
    }

    /// The uniform outcome for a non-2xx verification response. Transport
    /// errors never propagate out of `verify_transaction`.
    pub fn unverifiable() -> Self {
        Self::failed("Could not verify transaction")
    }
}

/// The minimal bundle a client needs to render a payment button or widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientRenderInfo {
    /// Display amount, two-decimal precision
    pub amount: Decimal,
    /// Provider checkout JS asset
    pub js_script: String,
    /// Provider public key
    pub key: String,
    pub redirect_url: Option<String>,
    /// Session secret for embedded flows (Stripe)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_secret: Option<String>,
    /// Minor-unit amount for processors that charge in subunits (Paystack)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_amount: Option<Decimal>,
}

/// Per-call options for webhook handling.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebhookOptions {
    /// Pass the provider's entire raw payload through instead of the
    /// trimmed canonical subset
    pub full: bool,
}

/// Inputs for provisioning a dedicated payment account number.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountRequest {
    pub account_name: String,
    pub client_email: String,
    #[serde(default)]
    pub permanent: bool,
    pub order: Option<String>,
}

/// A provisioned account number, as reported by the provider.
#[derive(Debug, Clone, Serialize)]
pub struct AccountDetails {
    pub message: String,
    pub data: Value,
}

/// Abstract payment provider interface
///
/// Implementors provide payment processing capabilities for one processor's
/// wire format, behind a uniform capability set.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Construct the provider-specific request body (or session object) the
    /// front end needs to initiate payment. Applies provider defaults:
    /// per-currency payment-method menus, unit conversion, empty-string
    /// fallbacks for optional customer fields.
    async fn build_checkout(&self, request: &CheckoutRequest) -> Result<Value>;

    /// Issue a server-side verification call for `reference` and, when
    /// `expected_amount` is supplied, compare it against the provider-reported
    /// amount at the adapter's precision. Mismatches return `ok == false`
    /// with the reported amount as the message - never an error. A non-2xx
    /// verification response yields [`VerificationResult::unverifiable`].
    async fn verify_transaction(&self, reference: &str, expected_amount: Option<Decimal>) -> Result<VerificationResult>;

    /// The bundle a client needs to render this provider's payment widget.
    fn processor_info(&self, amount: Decimal, redirect_url: Option<&str>, session_secret: Option<&str>) -> ClientRenderInfo;

    /// Authenticate, parse and normalize an inbound webhook delivery.
    ///
    /// Returns `Ok(None)` when the signature does not authenticate - no
    /// event, no side effect. Returns `Err` only for unparseable or
    /// contract-violating payloads.
    async fn handle_webhook(&self, signature: Option<&str>, body: &[u8], options: &WebhookOptions) -> Result<Option<CanonicalEvent>>;

    /// Provision a dedicated account number for bank-transfer collection.
    async fn create_payment_account(&self, _request: &AccountRequest) -> Result<AccountDetails> {
        Err(ProviderError::Unsupported("account number generation"))
    }
}

/// Extract a required field from a provider response body.
pub(crate) fn require<'a>(value: &'a Value, key: &str) -> Result<&'a Value> {
    value
        .get(key)
        .ok_or_else(|| ProviderError::Contract(format!("missing `{key}` in provider response")))
}

/// Interpret a JSON value as a decimal amount. Providers disagree on whether
/// amounts arrive as numbers or strings.
pub(crate) fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.as_f64().and_then(Decimal::from_f64),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_credentials() {
        let config = test_support::config(ProviderKind::Paystack);
        let rendered = format!("{config:?}");
        assert!(rendered.contains("acct_test"));
        assert!(!rendered.contains("sk_test"));
        assert!(!rendered.contains("pk_test"));
        assert!(rendered.contains("[redacted]"));
    }

    #[test]
    fn test_decimal_from_json_variants() {
        assert_eq!(decimal_from_json(&serde_json::json!(4000)), Some(Decimal::new(4000, 0)));
        assert_eq!(decimal_from_json(&serde_json::json!("4000.40")), Some(Decimal::new(400040, 2)));
        assert_eq!(decimal_from_json(&serde_json::json!(null)), None);
        assert_eq!(decimal_from_json(&serde_json::json!({"amount": 1})), None);
    }

    #[test]
    fn test_provider_kind_wire_names() {
        assert_eq!(ProviderKind::Flutterwave.to_string(), "flutterwave");
        assert_eq!(serde_json::to_value(ProviderKind::Stripe).unwrap(), serde_json::json!("stripe"));
    }
}
