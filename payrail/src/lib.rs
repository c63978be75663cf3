//! # payrail: a payment-provider abstraction layer
//!
//! `payrail` exposes a uniform interface - build a checkout payload, verify
//! a transaction, handle a provider webhook - over several heterogeneous
//! payment processors (Flutterwave, Paystack, Stripe). Callers select a
//! provider at runtime via a stored configuration record and invoke the
//! same operations regardless of which processor is active.
//!
//! ## Architecture
//!
//! The **provider layer** ([`providers`]) defines the `PaymentProvider`
//! trait and one adapter per processor, selected by a closed enum at
//! construction time. Each adapter owns its processor's wire format:
//! per-currency payment-method menus and major-unit amounts for
//! Flutterwave, minor-unit amounts for Paystack, embedded checkout
//! sessions and subscription plan management for Stripe.
//!
//! The **webhook layer** ([`webhooks`]) is the decision-heavy core: it
//! authenticates each provider's signature scheme, parses the native event
//! envelope, and maps it onto one canonical event vocabulary. A dispatch
//! router with explicitly injected handlers hands normalized events to a
//! background forwarder, which POSTs them to the merchant's callback URL
//! best-effort - the inbound webhook is acknowledged as soon as
//! authentication and parsing complete.
//!
//! The **credential store** ([`store`]) resolves an opaque identifier to a
//! validated provider configuration on every request; nothing is cached
//! across requests.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use payrail::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = payrail::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     payrail::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config)?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod errors;
pub mod providers;
pub mod store;
pub mod telemetry;
pub mod webhooks;

#[cfg(test)]
pub(crate) mod test_utils;

use std::sync::Arc;

use axum::{
    Json,
    Router,
    routing::{get, post},
};
use bon::Builder;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info};

pub use config::Config;
use store::ConfigStore;
use webhooks::{EventRouter, Forwarder};

/// Application state shared across all request handlers.
///
/// Everything here is immutable per-process: configuration, the shared
/// outbound HTTP connection pool, the credential store client and the
/// event router (whose forwarder owns the only background task).
/// Request-scoped state - provider configs and adapters - is built fresh
/// inside each handler.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub http: reqwest::Client,
    pub store: ConfigStore,
    pub events: Arc<EventRouter>,
}

async fn home() -> Json<serde_json::Value> {
    Json(json!({ "hello": "world" }))
}

/// Build the application router with all endpoints and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/", get(home))
        .route("/healthz", get(|| async { "OK" }))
        .route("/webhook", post(api::handlers::webhooks::receive))
        .route("/webhook/{identifier}", post(api::handlers::webhooks::receive_for))
        .route("/verify-payment/{identifier}", get(api::handlers::payments::verify_payment))
        .route("/generate-account-no/{identifier}", post(api::handlers::payments::generate_account_number))
        .route("/build-payment-info/{identifier}", post(api::handlers::payments::build_payment_info))
        .route("/credentials", get(api::handlers::payments::credentials))
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// The assembled service: router plus the forwarder's shutdown handle.
pub struct Application {
    router: Router,
    config: Config,
    shutdown_token: tokio_util::sync::CancellationToken,
}

impl Application {
    /// Wire up state, the event router and the background forwarder.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.provider_timeout_secs))
            .build()?;

        let shutdown_token = tokio_util::sync::CancellationToken::new();
        let forwarder = Forwarder::spawn(&config.forwarder, shutdown_token.child_token());
        let events = Arc::new(EventRouter::forwarding(&forwarder));
        let store = ConfigStore::new(http.clone(), config.store.clone());

        let state = AppState::builder()
            .config(config.clone())
            .http(http)
            .store(store)
            .events(events)
            .build();

        let router = build_router(state);

        Ok(Self {
            router,
            config,
            shutdown_token,
        })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("payrail listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        // Stop the merchant-callback forwarder; queued sends are abandoned
        // (delivery is best effort by contract).
        self.shutdown_token.cancel();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_home_route() {
        let app = test_utils::TestApp::spawn().await;
        let response = app.server.get("/").await;
        response.assert_status(StatusCode::OK);
        response.assert_json(&json!({"hello": "world"}));
        app.stop();
    }

    #[tokio::test]
    async fn test_healthz() {
        let app = test_utils::TestApp::spawn().await;
        let response = app.server.get("/healthz").await;
        response.assert_status(StatusCode::OK);
        response.assert_text("OK");
        app.stop();
    }
}
