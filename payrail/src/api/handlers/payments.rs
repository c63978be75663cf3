//! HTTP handlers for payment verification, checkout building and account
//! provisioning.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::AppState;
use crate::errors::{Error, Result};
use crate::providers::{AccountRequest, CheckoutRequest, ProviderConfig, ProviderKind, create_provider};

/// Resolve an identifier or fail the request with the uniform message.
async fn resolve(state: &AppState, identifier: &str) -> Result<ProviderConfig> {
    state
        .store
        .fetch(identifier)
        .await?
        .ok_or_else(|| Error::bad_request("Invalid identifier"))
}

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    amount: Option<String>,
    txref: Option<String>,
    /// Some providers redirect back with their own reference parameter
    /// name; it wins over `txref` when present.
    trxref: Option<String>,
    amount_only: Option<String>,
}

pub async fn verify_payment(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    Query(params): Query<VerifyParams>,
) -> Result<Json<Value>> {
    let (Some(amount), Some(txref)) = (params.amount.as_deref(), params.txref.as_deref()) else {
        return Err(Error::bad_request("missing `amount` or `txref` query parameters"));
    };
    let expected: Decimal = amount
        .parse()
        .map_err(|_| Error::bad_request("invalid `amount` query parameter"))?;
    let reference = params.trxref.as_deref().unwrap_or(txref);
    let amount_only = params
        .amount_only
        .as_deref()
        .map(|flag| flag.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let config = resolve(&state, &identifier).await?;
    let provider = create_provider(config, state.http.clone(), &state.config.providers);
    let result = provider.verify_transaction(reference, Some(expected)).await?;

    if !result.ok {
        // A mismatch is a normal outcome; the message carries the
        // provider-reported amount for caller inspection.
        return Ok(Json(json!({ "status": false, "msg": result.message })));
    }
    if amount_only {
        Ok(Json(json!({ "status": true, "msg": result.message })))
    } else {
        Ok(Json(json!({
            "status": true,
            "msg": result.message,
            "data": result.data.unwrap_or_else(|| json!({})),
        })))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UserInfo {
    email: Option<String>,
    name: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    phone_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProcessorExtras {
    title: Option<String>,
    description: Option<String>,
    logo: Option<String>,
    payment_options: Option<String>,
    meta: Option<Value>,
    reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BuildPaymentInfoRequest {
    amount: Option<Decimal>,
    currency: Option<String>,
    order: Option<String>,
    user: Option<UserInfo>,
    return_url: Option<String>,
    processor_info: Option<ProcessorExtras>,
}

pub async fn build_payment_info(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    Json(body): Json<BuildPaymentInfoRequest>,
) -> Result<Json<Value>> {
    let (Some(amount), Some(order)) = (body.amount, body.order) else {
        return Err(Error::bad_request("missing `amount` or `order`"));
    };

    let config = resolve(&state, &identifier).await?;
    let redirect_url = build_redirect_url(&state.config.host_url, &config, amount, &order);

    let user = body.user.unwrap_or_default();
    let extras = body.processor_info.unwrap_or_default();
    let request = CheckoutRequest {
        order,
        amount,
        currency: body.currency,
        reference: extras.reference,
        email: user.email,
        name: user.name,
        first_name: user.first_name,
        last_name: user.last_name,
        phone_number: user.phone_number,
        title: extras.title,
        description: extras.description,
        logo: extras.logo,
        payment_options: extras.payment_options,
        meta: extras.meta,
        callback_url: Some(redirect_url.clone()),
        return_url: body.return_url,
    };

    let kind = config.kind;
    let provider = create_provider(config, state.http.clone(), &state.config.providers);
    let button_info = provider.build_checkout(&request).await?;
    let session_secret = button_info
        .get("session_secret")
        .and_then(Value::as_str)
        .map(str::to_string);
    let payment_obj = provider.processor_info(amount, Some(&redirect_url), session_secret.as_deref());

    Ok(Json(json!({
        "status": true,
        "data": {
            "processor_button_info": button_info,
            "payment_obj": payment_obj,
            "kind": kind,
        }
    })))
}

/// Where the provider sends the payer after checkout; doubles as the
/// verification entry point. Paystack redirects embed the minor-unit
/// amount, which keeps the later verification comparison in one unit.
fn build_redirect_url(host_url: &str, config: &ProviderConfig, amount: Decimal, order: &str) -> String {
    let amount = match config.kind {
        ProviderKind::Paystack => amount * Decimal::ONE_HUNDRED,
        _ => amount,
    };
    format!(
        "{}/verify-payment/{}?amount={}&txref={}&amount_only=true",
        host_url.trim_end_matches('/'),
        config.identifier,
        amount.normalize(),
        order
    )
}

#[derive(Debug, Deserialize)]
pub struct GenerateAccountBody {
    account_name: Option<String>,
    client_email: Option<String>,
    #[serde(default)]
    permanent: bool,
    order: Option<String>,
}

pub async fn generate_account_number(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    Json(body): Json<GenerateAccountBody>,
) -> Result<Json<Value>> {
    let (Some(account_name), Some(client_email)) = (body.account_name, body.client_email) else {
        return Err(Error::bad_request("Missing account name or client email"));
    };

    let config = resolve(&state, &identifier).await?;
    let provider = create_provider(config, state.http.clone(), &state.config.providers);
    let details = provider
        .create_payment_account(&AccountRequest {
            account_name,
            client_email,
            permanent: body.permanent,
            order: body.order,
        })
        .await?;

    Ok(Json(json!({ "status": true, "msg": details.message, "data": details.data })))
}

#[derive(Debug, Deserialize)]
pub struct CredentialsParams {
    identifier: Option<String>,
}

/// Raw provider record lookup for internal callers.
pub async fn credentials(State(state): State<AppState>, Query(params): Query<CredentialsParams>) -> Result<Json<Value>> {
    let Some(identifier) = params.identifier else {
        return Err(Error::bad_request("Missing `identifier` as query params"));
    };

    let config = state
        .store
        .fetch(&identifier)
        .await?
        .ok_or_else(|| Error::bad_request("Error fetching credentials"))?;

    Ok(Json(json!({ "status": true, "data": config })))
}
