//! Paystack adapter.
//!
//! Paystack transacts in the smallest currency unit: the checkout amount
//! and every amount it reports back are in kobo/cents. Checkout builds
//! multiply by 100, and verification compares whole subunits. Callers that
//! build redirect URLs embed the minor-unit amount, so both sides of the
//! verification comparison arrive in the same unit.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use serde_json::{Value, json};

use crate::providers::{
    AccountDetails, AccountRequest, CheckoutRequest, ClientRenderInfo, PaymentProvider, ProviderClient, ProviderConfig, ProviderError,
    ProviderKind, Result, VerificationResult, WebhookOptions, decimal_from_json, require,
};
use crate::webhooks::events::{CanonicalEvent, EventKind};
use crate::webhooks::signing;

const JS_SCRIPT: &str = "https://js.paystack.co/v1/inline.js";

/// The inline-payment payload handed to the Paystack JS widget.
#[derive(Debug, Serialize)]
struct CheckoutPayload {
    key: String,
    email: String,
    /// Minor units
    amount: i64,
    currency: String,
    #[serde(rename = "ref")]
    reference: String,
    callback_url: Option<String>,
    metadata: Value,
}

pub struct PaystackAdapter {
    config: ProviderConfig,
    client: ProviderClient,
}

impl PaystackAdapter {
    pub fn new(config: ProviderConfig, http: reqwest::Client, base_url: &str) -> Self {
        let client = ProviderClient::new(http, base_url, &config.secret_key);
        Self { config, client }
    }
}

#[async_trait]
impl PaymentProvider for PaystackAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Paystack
    }

    async fn build_checkout(&self, request: &CheckoutRequest) -> Result<Value> {
        let minor = (request.amount * Decimal::ONE_HUNDRED)
            .trunc()
            .to_i64()
            .ok_or_else(|| ProviderError::Request(format!("amount {} out of range", request.amount)))?;

        let payload = CheckoutPayload {
            key: self.config.public_key.clone(),
            email: request.email.clone().unwrap_or_default(),
            amount: minor,
            currency: request.currency.as_deref().unwrap_or("NGN").to_ascii_uppercase(),
            reference: request.reference.clone().unwrap_or_else(|| request.order.clone()),
            callback_url: request.callback_url.clone(),
            metadata: request.meta.clone().unwrap_or_else(|| json!({})),
        };

        Ok(serde_json::to_value(payload)?)
    }

    async fn verify_transaction(&self, reference: &str, expected_amount: Option<Decimal>) -> Result<VerificationResult> {
        let response = self.client.get(&format!("/transaction/verify/{reference}")).await?;

        if !response.is_success() {
            return Ok(VerificationResult::unverifiable());
        }

        let message = require(&response.body, "message")?
            .as_str()
            .unwrap_or_default()
            .to_string();
        let data = require(&response.body, "data")?;

        match expected_amount {
            Some(expected) => {
                let reported_raw = require(data, "amount")?;
                let reported = decimal_from_json(reported_raw)
                    .ok_or_else(|| ProviderError::Contract("unreadable `amount` in provider response".to_string()))?;

                // Whole-subunit rounding on both sides.
                if reported.round_dp(0) == expected.round_dp(0) {
                    Ok(VerificationResult {
                        ok: true,
                        message,
                        data: None,
                    })
                } else {
                    Ok(VerificationResult::failed(reported_raw.to_string()))
                }
            }
            None => Ok(VerificationResult {
                ok: true,
                message,
                data: Some(data.clone()),
            }),
        }
    }

    fn processor_info(&self, amount: Decimal, redirect_url: Option<&str>, _session_secret: Option<&str>) -> ClientRenderInfo {
        let display = amount.round_dp(2);
        ClientRenderInfo {
            amount: display,
            js_script: JS_SCRIPT.to_string(),
            key: self.config.public_key.clone(),
            redirect_url: redirect_url.map(str::to_string),
            session_secret: None,
            p_amount: Some(display * Decimal::ONE_HUNDRED),
        }
    }

    async fn handle_webhook(&self, signature: Option<&str>, body: &[u8], options: &WebhookOptions) -> Result<Option<CanonicalEvent>> {
        let authenticated = signature
            .map(|sig| signing::verify_paystack_signature(sig, body, &self.config.webhook_secret))
            .unwrap_or(false);
        if !authenticated {
            tracing::debug!(identifier = %self.config.identifier, "Webhook signature mismatch, dropping delivery");
            return Ok(None);
        }

        let payload: Value = serde_json::from_slice(body)?;
        let event = require(&payload, "event")?
            .as_str()
            .ok_or_else(|| ProviderError::Contract("`event` is not a string".to_string()))?
            .to_string();
        let data = require(&payload, "data")?.clone();

        let canonical = match event.as_str() {
            "charge.success" => {
                let trimmed = if options.full { data } else { charge_data(&data)? };
                CanonicalEvent::new(EventKind::ChargeCompleted, event, trimmed)
            }
            "transfer.success" => {
                let trimmed = if options.full { data } else { transfer_data(&data)? };
                CanonicalEvent::new(EventKind::TransferCompleted, event, trimmed)
            }
            _ => CanonicalEvent::unrecognized(event, data),
        };

        Ok(Some(canonical))
    }

    async fn create_payment_account(&self, request: &AccountRequest) -> Result<AccountDetails> {
        let body = json!({
            "customer": request.client_email,
            "preferred_bank": if self.config.test_mode { "test-bank" } else { "wema-bank" },
        });

        let response = self.client.post_json("/dedicated_account", &body).await?;
        if !response.is_success() {
            return Err(ProviderError::from_response(&response));
        }

        let message = require(&response.body, "message")?
            .as_str()
            .unwrap_or_default()
            .to_string();
        let data = require(&response.body, "data")?.clone();

        Ok(AccountDetails { message, data })
    }
}

/// Canonical subset of a successful-charge payload. Paystack calls the
/// card object `authorization`.
fn charge_data(raw: &Value) -> Result<Value> {
    Ok(json!({
        "amount": require(raw, "amount")?,
        "currency": require(raw, "currency")?,
        "status": require(raw, "status")?,
        "reference": require(raw, "reference")?,
        "customer": require(raw, "customer")?,
        "card": raw.get("authorization"),
    }))
}

/// Canonical subset of a successful-transfer payload. The account details
/// live under the recipient object.
fn transfer_data(raw: &Value) -> Result<Value> {
    let account_number = raw
        .pointer("/recipient/details/account_number")
        .ok_or_else(|| ProviderError::Contract("missing `recipient.details.account_number` in provider response".to_string()))?;
    let bank_name = raw
        .pointer("/recipient/details/bank_name")
        .ok_or_else(|| ProviderError::Contract("missing `recipient.details.bank_name` in provider response".to_string()))?;

    Ok(json!({
        "amount": require(raw, "amount")?,
        "account_number": account_number,
        "bank_name": bank_name,
        "currency": require(raw, "currency")?,
        "status": require(raw, "status")?,
        "created_at": require(raw, "created_at")?,
        "transfer_code": require(raw, "transfer_code")?,
    }))
}
