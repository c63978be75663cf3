//! Stripe adapter.
//!
//! Checkout uses embedded sessions; verification retrieves the session and
//! checks its status. Webhooks carry the richest event set of the three
//! providers: invoice and subscription lifecycle events in addition to
//! completed checkouts.
//!
//! The adapter also owns subscription plan management (products and
//! recurring prices). These are administrative operations: they fail loudly
//! instead of degrading, and their product/plan cache lives only as long as
//! one adapter instance.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::providers::{
    CheckoutRequest, ClientRenderInfo, PaymentProvider, ProviderClient, ProviderConfig, ProviderError, ProviderKind, Result,
    VerificationResult, WebhookOptions, require,
};
use crate::webhooks::events::{CanonicalEvent, EventKind};
use crate::webhooks::signing;

const JS_SCRIPT: &str = "https://js.stripe.com/v3/";

/// A catalog product as cached for one adapter instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Product {
    pub id: String,
    pub name: String,
}

/// A recurring price joined with its product name.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    /// Minor units
    pub amount: i64,
    /// Days; derived from the provider's interval vocabulary
    pub duration: i64,
    pub currency: String,
}

/// Requested plan shape for create-or-update.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanSpec {
    pub name: String,
    /// Major units
    pub amount: Decimal,
    /// Days
    pub duration: i64,
    pub currency: String,
}

/// Map a duration in days onto Stripe's recurring-interval vocabulary.
/// month is approximated as 30 days and year as 365; this is not a
/// calendar-accurate conversion.
fn recurring_for_days(days: i64) -> (&'static str, i64) {
    if days > 0 && days % 365 == 0 {
        ("year", days / 365)
    } else if days > 0 && days % 30 == 0 {
        ("month", days / 30)
    } else {
        ("day", days)
    }
}

/// The reverse mapping, for durations reported by the provider.
fn days_for_recurring(interval: &str, interval_count: i64) -> i64 {
    match interval {
        "day" => interval_count,
        "month" => interval_count * 30,
        "year" => interval_count * 365,
        _ => 0,
    }
}

fn iso_from_unix(seconds: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(seconds, 0).map(|ts| ts.to_rfc3339())
}

pub struct StripeAdapter {
    config: ProviderConfig,
    client: ProviderClient,
    /// Lazily fetched catalog caches; instance-scoped, never shared
    products: Option<Vec<Product>>,
    plans: Option<Vec<Plan>>,
}

impl StripeAdapter {
    pub fn new(config: ProviderConfig, http: reqwest::Client, base_url: &str) -> Self {
        let client = ProviderClient::new(http, base_url, &config.secret_key);
        Self {
            config,
            client,
            products: None,
            plans: None,
        }
    }

    /// Fetch and cache the product and recurring-price catalogs.
    ///
    /// Only active recurring prices with a whole-major-unit amount are
    /// listed as plans.
    pub async fn get_prices(&mut self) -> Result<Vec<Plan>> {
        let products_response = self.client.get("/products?limit=100").await?;
        if !products_response.is_success() {
            return Err(ProviderError::from_response(&products_response));
        }
        let prices_response = self.client.get("/prices?limit=100").await?;
        if !prices_response.is_success() {
            return Err(ProviderError::from_response(&prices_response));
        }

        let products: Vec<Product> = require(&products_response.body, "data")?
            .as_array()
            .ok_or_else(|| ProviderError::Contract("`data` is not an array".to_string()))?
            .iter()
            .filter_map(|product| {
                Some(Product {
                    id: product.get("id")?.as_str()?.to_string(),
                    name: product.get("name")?.as_str()?.to_string(),
                })
            })
            .collect();

        let mut plans = Vec::new();
        for price in require(&prices_response.body, "data")?
            .as_array()
            .ok_or_else(|| ProviderError::Contract("`data` is not an array".to_string()))?
        {
            let active = price.get("active").and_then(Value::as_bool).unwrap_or(false);
            let Some(recurring) = price.get("recurring").filter(|r| !r.is_null()) else {
                continue;
            };
            let amount = price.get("unit_amount").and_then(Value::as_i64).unwrap_or(0);
            if !active || amount == 0 || amount % 100 != 0 {
                continue;
            }

            let product_id = require(price, "product")?
                .as_str()
                .ok_or_else(|| ProviderError::Contract("`product` is not a string".to_string()))?;
            let Some(product) = products.iter().find(|p| p.id == product_id) else {
                tracing::debug!(price = ?price.get("id"), "Price references an unlisted product, skipping");
                continue;
            };

            let interval = recurring.get("interval").and_then(Value::as_str).unwrap_or("day");
            let interval_count = recurring.get("interval_count").and_then(Value::as_i64).unwrap_or(1);

            plans.push(Plan {
                id: require(price, "id")?
                    .as_str()
                    .ok_or_else(|| ProviderError::Contract("`id` is not a string".to_string()))?
                    .to_string(),
                name: product.name.clone(),
                amount,
                duration: days_for_recurring(interval, interval_count),
                currency: price.get("currency").and_then(Value::as_str).unwrap_or_default().to_string(),
            });
        }

        self.products = Some(products);
        self.plans = Some(plans.clone());
        Ok(plans)
    }

    fn get_plan(&self, name: &str) -> Option<&Plan> {
        self.plans
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|plan| plan.name.eq_ignore_ascii_case(name))
    }

    /// Create a product, idempotent by case-insensitive name against the
    /// cached catalog.
    pub async fn create_product(&mut self, name: &str) -> Result<Product> {
        if self.products.is_none() {
            self.get_prices().await?;
        }

        if let Some(existing) = self
            .products
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|product| product.name.eq_ignore_ascii_case(name))
        {
            return Ok(existing.clone());
        }

        let response = self.client.post_form("/products", &[("name".to_string(), name.to_string())]).await?;
        if !response.is_success() {
            return Err(ProviderError::from_response(&response));
        }

        let product = Product {
            id: require(&response.body, "id")?
                .as_str()
                .ok_or_else(|| ProviderError::Contract("`id` is not a string".to_string()))?
                .to_string(),
            name: require(&response.body, "name")?
                .as_str()
                .ok_or_else(|| ProviderError::Contract("`name` is not a string".to_string()))?
                .to_string(),
        };

        if let Some(products) = &mut self.products {
            products.push(product.clone());
        }
        Ok(product)
    }

    /// Create-or-update-by-diff: a new price object is created only when
    /// the requested minor-unit amount differs from the cached plan's and
    /// `update` is set; otherwise the cached plan is returned unchanged.
    pub async fn create_price(&mut self, spec: &PlanSpec, update: bool) -> Result<Plan> {
        let product = self.create_product(&spec.name).await?;
        let requested_minor = (spec.amount * Decimal::ONE_HUNDRED)
            .trunc()
            .to_i64()
            .ok_or_else(|| ProviderError::Request(format!("amount {} out of range", spec.amount)))?;

        match self.get_plan(&spec.name).cloned() {
            Some(existing) if !(update && existing.amount != requested_minor) => Ok(existing),
            Some(_) => self.create_price_object(&product, spec, requested_minor, true).await,
            None => self.create_price_object(&product, spec, requested_minor, false).await,
        }
    }

    /// Fetch-then-create over a whole plan catalog.
    pub async fn create_prices(&mut self, specs: &[PlanSpec], update: bool) -> Result<Vec<Plan>> {
        self.get_prices().await?;
        let mut plans = Vec::with_capacity(specs.len());
        for spec in specs {
            plans.push(self.create_price(spec, update).await?);
        }
        Ok(plans)
    }

    async fn create_price_object(&mut self, product: &Product, spec: &PlanSpec, minor: i64, set_default: bool) -> Result<Plan> {
        let (interval, interval_count) = recurring_for_days(spec.duration);
        let params = vec![
            ("currency".to_string(), spec.currency.to_ascii_lowercase()),
            ("unit_amount".to_string(), minor.to_string()),
            ("recurring[interval]".to_string(), interval.to_string()),
            ("recurring[interval_count]".to_string(), interval_count.to_string()),
            ("product".to_string(), product.id.clone()),
        ];

        let response = self.client.post_form("/prices", &params).await?;
        if !response.is_success() {
            return Err(ProviderError::from_response(&response));
        }

        let price_id = require(&response.body, "id")?
            .as_str()
            .ok_or_else(|| ProviderError::Contract("`id` is not a string".to_string()))?
            .to_string();

        if set_default {
            let update = self
                .client
                .post_form(&format!("/products/{}", product.id), &[("default_price".to_string(), price_id.clone())])
                .await?;
            if !update.is_success() {
                return Err(ProviderError::from_response(&update));
            }
        }

        let recurring = require(&response.body, "recurring")?;
        let plan = Plan {
            id: price_id,
            name: product.name.clone(),
            amount: require(&response.body, "unit_amount")?
                .as_i64()
                .ok_or_else(|| ProviderError::Contract("`unit_amount` is not an integer".to_string()))?,
            duration: days_for_recurring(
                recurring.get("interval").and_then(Value::as_str).unwrap_or("day"),
                recurring.get("interval_count").and_then(Value::as_i64).unwrap_or(1),
            ),
            currency: require(&response.body, "currency")?
                .as_str()
                .unwrap_or_default()
                .to_string(),
        };

        if let Some(plans) = &mut self.plans {
            plans.retain(|cached| !cached.name.eq_ignore_ascii_case(&plan.name));
            plans.push(plan.clone());
        }
        Ok(plan)
    }

    /// Fetch a subscription and summarize its billing period.
    async fn subscription_summary(&self, subscription_id: &str) -> Result<Value> {
        let response = self.client.get(&format!("/subscriptions/{subscription_id}")).await?;
        if !response.is_success() {
            return Err(ProviderError::from_response(&response));
        }

        let body = &response.body;
        let period_end = require(body, "current_period_end")?
            .as_i64()
            .ok_or_else(|| ProviderError::Contract("`current_period_end` is not an integer".to_string()))?;
        let period_start = require(body, "current_period_start")?
            .as_i64()
            .ok_or_else(|| ProviderError::Contract("`current_period_start` is not an integer".to_string()))?;

        Ok(json!({
            "subscription_code": subscription_id,
            "next_payment_date": iso_from_unix(period_end),
            "start_date": iso_from_unix(period_start),
            "status": body.get("status"),
        }))
    }
}

#[async_trait]
impl PaymentProvider for StripeAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Stripe
    }

    async fn build_checkout(&self, request: &CheckoutRequest) -> Result<Value> {
        let return_url = request
            .return_url
            .as_deref()
            .ok_or_else(|| ProviderError::Request("`return_url` is required for embedded checkout".to_string()))?;

        let minor = (request.amount * Decimal::ONE_HUNDRED)
            .trunc()
            .to_i64()
            .ok_or_else(|| ProviderError::Request(format!("amount {} out of range", request.amount)))?;

        let product_name = request
            .title
            .as_deref()
            .or(request.description.as_deref())
            .unwrap_or(&request.order);

        let currency = request.currency.as_deref().unwrap_or("usd").to_ascii_lowercase();

        let params = vec![
            ("ui_mode".to_string(), "embedded".to_string()),
            ("mode".to_string(), "payment".to_string()),
            ("line_items[0][price_data][currency]".to_string(), currency),
            ("line_items[0][price_data][unit_amount]".to_string(), minor.to_string()),
            ("line_items[0][price_data][product_data][name]".to_string(), product_name.to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("return_url".to_string(), format!("{return_url}?session_id={{CHECKOUT_SESSION_ID}}")),
        ];

        let response = self.client.post_form("/checkout/sessions", &params).await?;
        if !response.is_success() {
            return Err(ProviderError::from_response(&response));
        }

        Ok(json!({
            "session_secret": require(&response.body, "client_secret")?,
            "session_id": require(&response.body, "id")?,
            "key": self.config.public_key,
        }))
    }

    async fn verify_transaction(&self, reference: &str, _expected_amount: Option<Decimal>) -> Result<VerificationResult> {
        // Sessions are verified by completion status; the session amount is
        // fixed server-side at creation so there is no separate amount check.
        let response = self.client.get(&format!("/checkout/sessions/{reference}")).await?;

        if !response.is_success() {
            return Ok(VerificationResult::unverifiable());
        }

        let session = &response.body;
        let complete = require(session, "status")?.as_str() == Some("complete");

        let mut data = json!({
            "status": if complete { "success" } else { "failed" },
            "customer": session.get("customer"),
        });
        if let Some(subscription_id) = session.get("subscription").and_then(Value::as_str) {
            let summary = self.subscription_summary(subscription_id).await?;
            data["subscription"] = summary;
        }

        if complete {
            Ok(VerificationResult {
                ok: true,
                message: "Successful".to_string(),
                data: Some(data),
            })
        } else {
            Ok(VerificationResult::failed("Failed"))
        }
    }

    fn processor_info(&self, amount: Decimal, redirect_url: Option<&str>, session_secret: Option<&str>) -> ClientRenderInfo {
        ClientRenderInfo {
            amount: amount.round_dp(2),
            js_script: JS_SCRIPT.to_string(),
            key: self.config.public_key.clone(),
            redirect_url: redirect_url.map(str::to_string),
            session_secret: session_secret.map(str::to_string),
            p_amount: None,
        }
    }

    async fn handle_webhook(&self, signature: Option<&str>, body: &[u8], options: &WebhookOptions) -> Result<Option<CanonicalEvent>> {
        let authenticated = signature
            .map(|sig| signing::verify_stripe_signature(sig, body, &self.config.webhook_secret))
            .unwrap_or(false);
        if !authenticated {
            tracing::debug!(identifier = %self.config.identifier, "Webhook signature mismatch, dropping delivery");
            return Ok(None);
        }

        let payload: Value = serde_json::from_slice(body)?;
        let event = require(&payload, "type")?
            .as_str()
            .ok_or_else(|| ProviderError::Contract("`type` is not a string".to_string()))?
            .to_string();
        let object = require(require(&payload, "data")?, "object")?.clone();

        let canonical = match event.as_str() {
            "checkout.session.completed" => {
                let trimmed = if options.full { object } else { session_data(&object)? };
                CanonicalEvent::new(EventKind::ChargeCompleted, event, trimmed)
            }
            "invoice.paid" => {
                let trimmed = if options.full {
                    object
                } else {
                    self.invoice_data(&object, true).await?
                };
                CanonicalEvent::new(EventKind::InvoiceUpdated, event, trimmed)
            }
            "customer.subscription.deleted" => {
                let trimmed = if options.full {
                    object.clone()
                } else {
                    json!({
                        "subscription_code": require(&object, "id")?,
                        "customer": {"id": require(&object, "customer")?},
                    })
                };
                CanonicalEvent::new(EventKind::SubscriptionDisabled, event, trimmed)
            }
            "invoice.payment_failed" => {
                let trimmed = if options.full {
                    object
                } else {
                    self.invoice_data(&object, false).await?
                };
                CanonicalEvent::new(EventKind::PaymentFailed, event, trimmed)
            }
            _ => CanonicalEvent::unrecognized(event, object),
        };

        Ok(Some(canonical))
    }
}

impl StripeAdapter {
    /// Canonical subset of an invoice event. `paid` selects the
    /// InvoiceUpdated shape; the payment-failed shape swaps the transaction
    /// block for the next payment date.
    async fn invoice_data(&self, invoice: &Value, paid: bool) -> Result<Value> {
        let subscription_id = invoice.get("subscription").and_then(Value::as_str);

        let subscription = match subscription_id {
            Some(id) => self.subscription_summary(id).await?,
            None => Value::Null,
        };

        let customer = json!({
            "id": require(invoice, "customer")?,
            "email": invoice.get("customer_email"),
            "name": invoice.get("customer_name"),
            "phone": invoice.get("customer_phone"),
        });

        if paid {
            let status = require(invoice, "status")?.as_str();
            Ok(json!({
                "id": require(invoice, "id")?,
                "subscription_code": invoice.get("subscription"),
                "customer": customer,
                "transaction": {
                    "reference": invoice.get("subscription"),
                    "status": if status == Some("paid") { "success" } else { "failed" },
                },
                "subscription": subscription,
                "currency": require(invoice, "currency")?,
                "amount": require(invoice, "amount_paid")?,
            }))
        } else {
            let period_end = require(invoice, "period_end")?
                .as_i64()
                .ok_or_else(|| ProviderError::Contract("`period_end` is not an integer".to_string()))?;
            Ok(json!({
                "id": require(invoice, "id")?,
                "subscription_code": invoice.get("subscription"),
                "customer": customer,
                "subscription": subscription,
                "currency": require(invoice, "currency")?,
                "next_payment_date": iso_from_unix(period_end),
            }))
        }
    }
}

/// Canonical subset of a completed checkout session.
fn session_data(session: &Value) -> Result<Value> {
    let customer = match session.get("customer").filter(|c| !c.is_null()) {
        Some(id) => {
            let mut details = session
                .get("customer_details")
                .cloned()
                .unwrap_or_else(|| json!({}));
            details["id"] = id.clone();
            details
        }
        None => json!({}),
    };

    let amount_minor = require(session, "amount_total")?
        .as_i64()
        .ok_or_else(|| ProviderError::Contract("`amount_total` is not an integer".to_string()))?;

    Ok(json!({
        "amount": amount_minor as f64 / 100.0,
        "currency": require(session, "currency")?,
        "status": require(session, "payment_status")?,
        "reference": session.get("client_reference_id"),
        "customer": customer,
        "subscription_code": session.get("subscription"),
    }))
}
