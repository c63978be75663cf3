//! Flutterwave adapter.
//!
//! Amounts are in major currency units. Inbound webhooks authenticate by
//! direct equality of the `verif-hash` header against the stored webhook
//! secret, which by construction equals the configuration identifier.

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

const JS_SCRIPT: &str = "https://checkout.flutterwave.com/v3.js";

/// Payment method menus keyed by lowercase currency code. A currency
/// missing from this table falls back to the caller-supplied method list.
const PAYMENT_OPTIONS: &[(&str, &str)] = &[
    ("ngn", "card, banktransfer, account"),
    ("usd", "card, account, googlepay, applepay"),
    ("eur", "card, account, googlepay, applepay"),
    ("gbp", "card, account, googlepay, applepay"),
    ("ghs", "card, ghanamobilemoney"),
    ("xaf", "card, mobilemoneyfranco"),
    ("xof", "card, mobilemoneyfranco"),
    ("zar", "card, account, lvoucher, googlepay, applepay"),
    ("mwk", "card, mobilemoneymalawi"),
    ("kes", "card, mpesa"),
    ("ugx", "card, mobilemoneyuganda"),
    ("rwf", "card, mobilemoneyrwanda"),
    ("tzs", "card, mobilemoneytanzania"),
];

fn payment_options_for(currency: &str) -> Option<&'static str> {
    let lower = currency.to_ascii_lowercase();
    PAYMENT_OPTIONS.iter().find(|(code, _)| *code == lower).map(|(_, menu)| *menu)
}

#[derive(Debug, Serialize)]
struct Customer {
    email: String,
    phone_number: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct Customizations {
    title: String,
    description: String,
    logo: String,
}

/// The inline-checkout payload handed to the Flutterwave JS widget.
#[derive(Debug, Serialize)]
struct CheckoutPayload {
    public_key: String,
    tx_ref: String,
    amount: i64,
    currency: String,
    payment_options: Option<String>,
    meta: Value,
    customer: Customer,
    customizations: Customizations,
}

pub struct FlutterwaveAdapter {
    config: ProviderConfig,
    client: ProviderClient,
}

impl FlutterwaveAdapter {
    pub fn new(config: ProviderConfig, http: reqwest::Client, base_url: &str) -> Self {
        let client = ProviderClient::new(http, base_url, &config.secret_key);
        Self { config, client }
    }
}

#[async_trait]
impl PaymentProvider for FlutterwaveAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Flutterwave
    }

    async fn build_checkout(&self, request: &CheckoutRequest) -> Result<Value> {
        let currency = request.currency.as_deref().unwrap_or("ngn");

        // `usd` is special-cased to the provider's alternate currency code.
        let provider_currency = if currency.eq_ignore_ascii_case("usd") { "us" } else { currency };

        let amount = request
            .amount
            .trunc()
            .to_i64()
            .ok_or_else(|| ProviderError::Request(format!("amount {} out of range", request.amount)))?;

        // Both first and last name beat a bare `name`.
        let name = match (&request.first_name, &request.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            _ => request.name.clone().unwrap_or_default(),
        };

        let payload = CheckoutPayload {
            public_key: self.config.public_key.clone(),
            tx_ref: request.reference.clone().unwrap_or_else(|| request.order.clone()),
            amount,
            currency: provider_currency.to_ascii_uppercase(),
            payment_options: payment_options_for(currency)
                .map(str::to_string)
                .or_else(|| request.payment_options.clone()),
            meta: request.meta.clone().unwrap_or_else(|| json!({})),
            customer: Customer {
                email: request.email.clone().unwrap_or_default(),
                phone_number: request.phone_number.clone().unwrap_or_default(),
                name,
            },
            customizations: Customizations {
                title: request.title.clone().unwrap_or_default(),
                description: request.description.clone().unwrap_or_default(),
                logo: request.logo.clone().unwrap_or_default(),
            },
        };

        Ok(serde_json::to_value(payload)?)
    }

    async fn verify_transaction(&self, reference: &str, expected_amount: Option<Decimal>) -> Result<VerificationResult> {
        let response = self.client.get(&format!("/transactions/{reference}/verify")).await?;

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

                if reported.round_dp(2) == expected.round_dp(2) {
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
        ClientRenderInfo {
            amount: amount.round_dp(2),
            js_script: JS_SCRIPT.to_string(),
            key: self.config.public_key.clone(),
            redirect_url: redirect_url.map(str::to_string),
            session_secret: None,
            p_amount: None,
        }
    }

    async fn handle_webhook(&self, signature: Option<&str>, body: &[u8], options: &WebhookOptions) -> Result<Option<CanonicalEvent>> {
        // Plain shared-secret equality; the hash doubles as the config
        // identifier on the provider side.
        if signature != Some(self.config.webhook_secret.as_str()) {
            tracing::debug!(identifier = %self.config.identifier, "Webhook hash mismatch, dropping delivery");
            return Ok(None);
        }

        let payload: Value = serde_json::from_slice(body)?;
        let event = require(&payload, "event")?
            .as_str()
            .ok_or_else(|| ProviderError::Contract("`event` is not a string".to_string()))?
            .to_string();
        let data = require(&payload, "data")?.clone();

        let canonical = match event.as_str() {
            "charge.completed" => {
                let trimmed = if options.full { data } else { charge_data(&data)? };
                CanonicalEvent::new(EventKind::ChargeCompleted, event, trimmed)
            }
            "transfer.completed" => {
                let trimmed = if options.full { data } else { transfer_data(&data)? };
                CanonicalEvent::new(EventKind::TransferCompleted, event, trimmed)
            }
            _ => CanonicalEvent::unrecognized(event, data),
        };

        Ok(Some(canonical))
    }

    async fn create_payment_account(&self, request: &AccountRequest) -> Result<AccountDetails> {
        let mut body = json!({
            "email": request.client_email,
            "is_permanent": request.permanent,
            "narration": request.account_name,
        });
        if let Some(order) = &request.order {
            body["tx_ref"] = json!(order);
        }

        let response = self.client.post_json("/virtual-account-numbers", &body).await?;
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

/// Canonical subset of a completed-charge payload.
fn charge_data(raw: &Value) -> Result<Value> {
    Ok(json!({
        "amount": require(raw, "amount")?,
        "currency": require(raw, "currency")?,
        "status": require(raw, "status")?,
        "reference": require(raw, "tx_ref")?,
        "customer": require(raw, "customer")?,
        "card": raw.get("card"),
    }))
}

/// Canonical subset of a completed-transfer payload.
fn transfer_data(raw: &Value) -> Result<Value> {
    Ok(json!({
        "amount": require(raw, "amount")?,
        "account_number": require(raw, "account_number")?,
        "bank_name": require(raw, "bank_name")?,
        "currency": require(raw, "currency")?,
        "status": require(raw, "status")?,
        "created_at": require(raw, "created_at")?,
        "transfer_code": require(raw, "transfer_code")?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::test_support;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(base_url: &str) -> FlutterwaveAdapter {
        FlutterwaveAdapter::new(test_support::config(ProviderKind::Flutterwave), test_support::test_client(), base_url)
    }

    fn checkout_request() -> CheckoutRequest {
        CheckoutRequest {
            order: "ORD-1".to_string(),
            amount: Decimal::new(4000, 0),
            currency: Some("NGN".to_string()),
            email: Some("buyer@example.com".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_checkout_selects_documented_method_menu() {
        let adapter = adapter("http://unused.invalid");

        for (currency, menu) in PAYMENT_OPTIONS {
            let mut request = checkout_request();
            request.currency = Some(currency.to_ascii_uppercase());
            let payload = adapter.build_checkout(&request).await.unwrap();
            assert_eq!(payload["payment_options"], json!(menu), "menu for {currency}");
        }
    }

    #[tokio::test]
    async fn test_checkout_usd_uses_alternate_currency_code() {
        let adapter = adapter("http://unused.invalid");
        let mut request = checkout_request();
        request.currency = Some("usd".to_string());

        let payload = adapter.build_checkout(&request).await.unwrap();
        assert_eq!(payload["currency"], json!("US"));
        // The method menu is still looked up under the original code.
        assert_eq!(payload["payment_options"], json!("card, account, googlepay, applepay"));
    }

    #[tokio::test]
    async fn test_checkout_unknown_currency_falls_back_to_caller_list() {
        let adapter = adapter("http://unused.invalid");
        let mut request = checkout_request();
        request.currency = Some("JPY".to_string());
        request.payment_options = Some("card".to_string());

        let payload = adapter.build_checkout(&request).await.unwrap();
        assert_eq!(payload["currency"], json!("JPY"));
        assert_eq!(payload["payment_options"], json!("card"));
    }

    #[tokio::test]
    async fn test_checkout_defaults_and_name_composition() {
        let adapter = adapter("http://unused.invalid");
        let mut request = checkout_request();
        request.first_name = Some("Ada".to_string());
        request.last_name = Some("Obi".to_string());
        request.amount = Decimal::new(40005, 1); // 4000.5 truncates to 4000

        let payload = adapter.build_checkout(&request).await.unwrap();
        assert_eq!(payload["amount"], json!(4000));
        assert_eq!(payload["tx_ref"], json!("ORD-1"));
        assert_eq!(payload["customer"]["name"], json!("Ada Obi"));
        assert_eq!(payload["customer"]["phone_number"], json!(""));
        assert_eq!(payload["customizations"]["title"], json!(""));
        assert_eq!(payload["meta"], json!({}));
    }

    #[tokio::test]
    async fn test_checkout_is_deterministic() {
        let adapter = adapter("http://unused.invalid");
        let request = checkout_request();

        let first = adapter.build_checkout(&request).await.unwrap();
        let second = adapter.build_checkout(&request).await.unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_verify_matching_amount() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transactions/REF1/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "message": "Successful",
                "data": {"amount": 4000, "currency": "NGN"}
            })))
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let result = adapter
            .verify_transaction("REF1", Some(Decimal::new(4000, 0)))
            .await
            .unwrap();

        assert!(result.ok);
        assert_eq!(result.message, "Successful");
        assert_eq!(result.data, None);
    }

    #[tokio::test]
    async fn test_verify_tolerates_sub_cent_noise() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "Successful",
                "data": {"amount": 4000.004}
            })))
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let result = adapter
            .verify_transaction("REF1", Some(Decimal::new(4000, 0)))
            .await
            .unwrap();
        assert!(result.ok, "two-decimal rounding should absorb representation noise");
    }

    #[tokio::test]
    async fn test_verify_mismatch_reports_provider_amount() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "Successful",
                "data": {"amount": 3500.5}
            })))
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let result = adapter
            .verify_transaction("REF1", Some(Decimal::new(4000, 0)))
            .await
            .unwrap();

        assert!(!result.ok);
        assert_eq!(result.message, "3500.5");
    }

    #[tokio::test]
    async fn test_verify_without_expected_amount_returns_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "Successful",
                "data": {"amount": 4000, "currency": "NGN"}
            })))
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let result = adapter.verify_transaction("REF1", None).await.unwrap();

        assert!(result.ok);
        assert_eq!(result.data, Some(json!({"amount": 4000, "currency": "NGN"})));
    }

    #[tokio::test]
    async fn test_verify_non_2xx_never_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "No transaction"})))
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let result = adapter
            .verify_transaction("NOPE", Some(Decimal::new(4000, 0)))
            .await
            .unwrap();

        assert!(!result.ok);
        assert_eq!(result.message, "Could not verify transaction");
    }

    fn charge_payload() -> Value {
        json!({
            "event": "charge.completed",
            "data": {
                "id": 285959875,
                "tx_ref": "ORD-1",
                "amount": 4000,
                "currency": "NGN",
                "status": "successful",
                "customer": {"id": 215604089, "email": "buyer@example.com"},
                "card": {"first_6digits": "123456", "last_4digits": "7889"}
            }
        })
    }

    #[tokio::test]
    async fn test_webhook_charge_completed() {
        let adapter = adapter("http://unused.invalid");
        let body = serde_json::to_vec(&charge_payload()).unwrap();

        let event = adapter
            .handle_webhook(Some("acct_test"), &body, &WebhookOptions::default())
            .await
            .unwrap()
            .expect("valid hash should produce an event");

        assert_eq!(event.kind, EventKind::ChargeCompleted);
        assert_eq!(event.data["amount"], json!(4000));
        assert_eq!(event.data["currency"], json!("NGN"));
        assert_eq!(event.data["status"], json!("successful"));
        assert_eq!(event.data["reference"], json!("ORD-1"));
        assert_eq!(event.data["customer"]["email"], json!("buyer@example.com"));
        assert_eq!(event.data["card"]["last_4digits"], json!("7889"));
    }

    #[tokio::test]
    async fn test_webhook_bad_hash_produces_nothing() {
        let adapter = adapter("http://unused.invalid");
        let body = serde_json::to_vec(&charge_payload()).unwrap();

        assert_eq!(
            adapter
                .handle_webhook(Some("not-the-secret"), &body, &WebhookOptions::default())
                .await
                .unwrap(),
            None
        );
        assert_eq!(adapter.handle_webhook(None, &body, &WebhookOptions::default()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_webhook_transfer_completed() {
        let adapter = adapter("http://unused.invalid");
        let body = serde_json::to_vec(&json!({
            "event": "transfer.completed",
            "data": {
                "amount": 5000,
                "account_number": "0690000040",
                "bank_name": "ACCESS BANK NIGERIA",
                "currency": "NGN",
                "status": "SUCCESSFUL",
                "created_at": "2024-01-05T11:48:25.000Z",
                "transfer_code": "TRF-9381",
                "fee": 10.75
            }
        }))
        .unwrap();

        let event = adapter
            .handle_webhook(Some("acct_test"), &body, &WebhookOptions::default())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(event.kind, EventKind::TransferCompleted);
        assert_eq!(event.data["transfer_code"], json!("TRF-9381"));
        assert_eq!(event.data["bank_name"], json!("ACCESS BANK NIGERIA"));
        // Trimmed to the canonical subset.
        assert!(event.data.get("fee").is_none());
    }

    #[tokio::test]
    async fn test_webhook_full_fidelity_passthrough() {
        let adapter = adapter("http://unused.invalid");
        let payload = charge_payload();
        let body = serde_json::to_vec(&payload).unwrap();

        let event = adapter
            .handle_webhook(Some("acct_test"), &body, &WebhookOptions { full: true })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(event.data, payload["data"]);
    }

    #[tokio::test]
    async fn test_webhook_unrecognized_event_preserved() {
        let adapter = adapter("http://unused.invalid");
        let body = serde_json::to_vec(&json!({
            "event": "charge.dispute.create",
            "data": {"id": "dsp_1"}
        }))
        .unwrap();

        let event = adapter
            .handle_webhook(Some("acct_test"), &body, &WebhookOptions::default())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(event.kind, EventKind::Unrecognized);
        assert_eq!(event.provider_event, "charge.dispute.create");
        assert_eq!(event.data, json!({"id": "dsp_1"}));
    }

    #[tokio::test]
    async fn test_create_payment_account() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/virtual-account-numbers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "message": "Virtual account created",
                "data": {"account_number": "7824822527", "bank_name": "WEMA BANK"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let details = adapter
            .create_payment_account(&AccountRequest {
                account_name: "Ada Obi".to_string(),
                client_email: "ada@example.com".to_string(),
                permanent: true,
                order: None,
            })
            .await
            .unwrap();

        assert_eq!(details.message, "Virtual account created");
        assert_eq!(details.data["account_number"], json!("7824822527"));
    }

    #[tokio::test]
    async fn test_create_payment_account_rejection_surfaces_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "email is required"})))
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let err = adapter
            .create_payment_account(&AccountRequest {
                account_name: "Ada Obi".to_string(),
                client_email: String::new(),
                permanent: false,
                order: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Rejected(ref m) if m == "email is required"));
    }
}
