//! Shared authenticated HTTP client for provider APIs.
//!
//! Every adapter talks to its processor through the same primitive: a
//! bearer-authenticated request against the provider's base URL, returning
//! the status code and decoded JSON body. Retry and connection behavior are
//! whatever `reqwest` provides; adapters decide what the status means.

use reqwest::StatusCode;
use serde_json::Value;

use super::{ProviderError, Result};

/// One provider account's API client: base URL plus secret key.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

/// A decoded provider response. `body` is `Value::Null` when the response
/// carried no parseable JSON (error pages, empty bodies).
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Best-effort human-readable message from a provider error body.
    pub fn error_message(&self) -> String {
        self.body
            .get("message")
            .or_else(|| self.body.pointer("/error/message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("provider returned HTTP {}", self.status))
    }
}

impl ProviderClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, secret_key: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http,
            base_url,
            secret_key: secret_key.into(),
        }
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.secret_key)
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Form-encoded POST (the Stripe API speaks `x-www-form-urlencoded`).
    pub async fn post_form(&self, path: &str, params: &[(String, String)]) -> Result<ApiResponse> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.secret_key)
            .form(params)
            .send()
            .await?;
        Self::decode(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode(response: reqwest::Response) -> Result<ApiResponse> {
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok(ApiResponse { status, body })
    }
}

impl ProviderError {
    /// Promote a non-2xx provider response into a rejection error.
    pub(crate) fn from_response(response: &ApiResponse) -> Self {
        ProviderError::Rejected(response.error_message())
    }
}
