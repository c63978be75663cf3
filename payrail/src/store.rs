//! Remote provider-credential lookup.
//!
//! Merchant provider accounts live as rows in a spreadsheet exposed through
//! a sheet-backed key-value service. Each inbound request resolves its
//! identifier to a row, validates it, and builds a [`ProviderConfig`] -
//! fresh every time, no caching.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::providers::{ProviderConfig, ProviderKind};

/// Where the credential sheet lives.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Base URL of the sheet service
    pub url: String,
    /// Sheet link passed through to the service
    pub sheet: String,
    /// Worksheet name within the sheet
    pub worksheet: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            sheet: String::new(),
            worksheet: "Sheet1".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("credential store transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The record exists but cannot be used (missing credential, unknown
    /// provider type)
    #[error("invalid provider record: {0}")]
    Invalid(String),
}

/// One raw sheet row, as the service returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// The sheet stores booleans as "TRUE"/"FALSE" strings
    #[serde(default)]
    pub test: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl ProviderRecord {
    /// Validate the row into a typed configuration. Fails fast on a missing
    /// credential rather than letting a half-configured adapter limp along.
    pub fn into_config(self) -> Result<ProviderConfig, StoreError> {
        let kind = match self.kind.to_ascii_lowercase().as_str() {
            // Legacy rows predate the provider's rename.
            "flutterwave" | "ravepay" => ProviderKind::Flutterwave,
            "paystack" => ProviderKind::Paystack,
            "stripe" => ProviderKind::Stripe,
            other => return Err(StoreError::Invalid(format!("unknown provider type `{other}` for record `{}`", self.id))),
        };

        let public_key = self
            .public_key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| StoreError::Invalid(format!("record `{}` is missing `public_key`", self.id)))?;
        let secret_key = self
            .secret_key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| StoreError::Invalid(format!("record `{}` is missing `secret_key`", self.id)))?;

        let stored_secret = self.webhook_secret.filter(|secret| !secret.is_empty());
        let webhook_secret = match kind {
            // Flutterwave is configured to send the record id as its hash.
            ProviderKind::Flutterwave => self.id.clone(),
            ProviderKind::Paystack => stored_secret.unwrap_or_else(|| secret_key.clone()),
            ProviderKind::Stripe => stored_secret.unwrap_or_else(|| self.id.clone()),
        };

        Ok(ProviderConfig {
            identifier: self.id,
            kind,
            public_key,
            secret_key,
            webhook_secret,
            test_mode: self.test.as_deref().is_some_and(|flag| flag.eq_ignore_ascii_case("true")),
            callback_url: self.webhook_url.filter(|url| !url.is_empty()),
        })
    }
}

/// Client for the sheet-backed credential service.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    http: reqwest::Client,
    config: StoreConfig,
}

impl ConfigStore {
    pub fn new(http: reqwest::Client, config: StoreConfig) -> Self {
        Self { http, config }
    }

    /// Resolve an identifier to a validated provider configuration.
    ///
    /// Returns `Ok(None)` when the service has no row for the identifier.
    pub async fn fetch(&self, identifier: &str) -> Result<Option<ProviderConfig>, StoreError> {
        let response = self
            .http
            .post(format!("{}/read-single", self.config.url))
            .json(&json!({
                "link": self.config.sheet,
                "key": "id",
                "sheet": self.config.worksheet,
                "value": identifier,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::debug!(identifier, status = response.status().as_u16(), "Credential lookup returned no record");
            return Ok(None);
        }

        let body: serde_json::Value = response.json().await?;
        let Some(data) = body.get("data").filter(|data| !data.is_null()) else {
            return Ok(None);
        };

        let record: ProviderRecord = serde_json::from_value(data.clone())
            .map_err(|e| StoreError::Invalid(format!("unreadable record for `{identifier}`: {e}")))?;

        record.into_config().map(Some)
    }
}
