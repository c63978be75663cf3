//! Shared test fixtures: a fully wired test server backed by mock HTTP
//! doubles for the credential store and the provider APIs.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::store::ConfigStore;
use crate::webhooks::{EventRouter, Forwarder};
use crate::{AppState, Config, build_router};

/// One test application: a `TestServer` over the real router, with every
/// outbound dependency pointed at a mock server.
pub(crate) struct TestApp {
    pub server: axum_test::TestServer,
    /// Credential store double
    pub store: MockServer,
    /// Shared double for all three provider APIs
    pub provider: MockServer,
    token: CancellationToken,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let store = MockServer::start().await;
        let provider = MockServer::start().await;

        let mut config = Config::default();
        config.store.url = store.uri();
        config.store.sheet = "https://docs.google.com/spreadsheets/d/test".to_string();
        config.providers.flutterwave_url = provider.uri();
        config.providers.paystack_url = provider.uri();
        config.providers.stripe_url = provider.uri();

        let token = CancellationToken::new();
        let http = crate::providers::test_support::test_client();
        let forwarder = Forwarder::spawn(&config.forwarder, token.child_token());
        let events = Arc::new(EventRouter::forwarding(&forwarder));
        let config_store = ConfigStore::new(http.clone(), config.store.clone());

        let state = AppState::builder()
            .config(config)
            .http(http)
            .store(config_store)
            .events(events)
            .build();

        let server = axum_test::TestServer::new(build_router(state)).expect("Failed to create test server");

        Self {
            server,
            store,
            provider,
            token,
        }
    }

    /// Serve `record` for lookups of `identifier`.
    pub async fn mount_record(&self, identifier: &str, record: Value) {
        Mock::given(method("POST"))
            .and(path("/read-single"))
            .and(body_partial_json(json!({ "value": identifier })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": record })))
            .mount(&self.store)
            .await;
    }

    /// Serve "no such record" for lookups of `identifier`.
    pub async fn mount_record_missing(&self, identifier: &str) {
        Mock::given(method("POST"))
            .and(path("/read-single"))
            .and(body_partial_json(json!({ "value": identifier })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": null })))
            .mount(&self.store)
            .await;
    }

    /// Cancel the background forwarder.
    pub fn stop(self) {
        self.token.cancel();
    }
}

pub(crate) fn flutterwave_record(id: &str, callback_url: Option<&str>) -> Value {
    json!({
        "id": id,
        "type": "flutterwave",
        "public_key": "pk_live",
        "secret_key": "sk_live",
        "test": "FALSE",
        "webhook_url": callback_url,
    })
}

pub(crate) fn paystack_record(id: &str, callback_url: Option<&str>) -> Value {
    json!({
        "id": id,
        "type": "paystack",
        "public_key": "pk_live",
        "secret_key": "sk_live",
        "test": "FALSE",
        "webhook_url": callback_url,
    })
}

pub(crate) fn stripe_record(id: &str, callback_url: Option<&str>) -> Value {
    json!({
        "id": id,
        "type": "stripe",
        "public_key": "pk_live",
        "secret_key": "sk_live",
        "webhook_secret": "whsec_live",
        "test": "FALSE",
        "webhook_url": callback_url,
    })
}

/// Wait until the mock server has seen `count` requests, or panic.
pub(crate) async fn wait_for_requests(server: &MockServer, count: usize) {
    for _ in 0..100 {
        let received = server.received_requests().await.unwrap_or_default();
        if received.len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("mock server never received {count} request(s)");
}
