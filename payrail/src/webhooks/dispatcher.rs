//! Canonical event dispatch: route, then forward.
//!
//! ```text
//! webhook handler
//!   └─ EventRouter::dispatch(config, event)
//!        ├─ pick handler: named channel for the event kind,
//!        │                or the generic channel
//!        └─ handler(config, event)
//!             └─ Forwarder::submit(callback_url, payload) ──┐
//!                                                           │
//!                  ┌────────────────────────────────────────┘
//!                  ▼
//!             run_sender (spawned task):
//!                  ├─ recv from channel
//!                  ├─ acquire semaphore permit (caps concurrency)
//!                  └─ spawn HTTP POST, log outcome
//! ```
//!
//! The merchant forward is fire-and-forget: failures are logged and never
//! retried, and never reach the inbound webhook response. The sender task
//! has no secrets - just HTTP out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use crate::providers::ProviderConfig;
use crate::webhooks::events::{CanonicalEvent, EventKind};

/// A subscriber for one channel: receives the normalized event and the
/// originating provider configuration.
pub type EventHandler = Arc<dyn Fn(&ProviderConfig, &CanonicalEvent) + Send + Sync>;

/// Routes canonical events to explicitly registered handlers.
///
/// Handlers are injected at construction time; there is no ambient
/// registry. Each event kind may have a named channel; everything else
/// lands on the generic channel.
pub struct EventRouter {
    named: HashMap<EventKind, EventHandler>,
    generic: EventHandler,
}

impl EventRouter {
    pub fn new(generic: EventHandler) -> Self {
        Self {
            named: HashMap::new(),
            generic,
        }
    }

    /// Register a named channel for one event kind.
    pub fn on(mut self, kind: EventKind, handler: EventHandler) -> Self {
        self.named.insert(kind, handler);
        self
    }

    /// The default wiring: named channels for completed charges and
    /// transfers, the generic channel for everything else - all of them
    /// forwarding the event to the merchant callback URL.
    pub fn forwarding(forwarder: &Forwarder) -> Self {
        let forward: EventHandler = {
            let forwarder = forwarder.clone();
            Arc::new(move |config: &ProviderConfig, event: &CanonicalEvent| {
                let Some(url) = config.callback_url.as_deref() else {
                    tracing::debug!(identifier = %config.identifier, "No callback URL configured, dropping event");
                    return;
                };
                forwarder.submit(url, event.payload());
            })
        };

        Self::new(forward.clone())
            .on(EventKind::ChargeCompleted, forward.clone())
            .on(EventKind::TransferCompleted, forward)
    }

    /// Hand an event to its channel. `use_generic` bypasses the named
    /// channels when the caller explicitly asks for the generic one.
    pub fn dispatch(&self, config: &ProviderConfig, event: &CanonicalEvent, use_generic: bool) {
        let handler = if use_generic {
            &self.generic
        } else {
            self.named.get(&event.kind).unwrap_or(&self.generic)
        };

        tracing::debug!(
            identifier = %config.identifier,
            event = %event.kind,
            provider_event = %event.provider_event,
            "Dispatching canonical event"
        );
        handler(config, event);
    }
}

/// Merchant callback delivery tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForwarderConfig {
    /// Per-request timeout for the outbound POST, in seconds
    pub timeout_secs: u64,
    /// Bounded queue between the request path and the sender task
    pub channel_capacity: usize,
    /// Concurrent outbound POST cap
    pub max_concurrent_sends: usize,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            channel_capacity: 256,
            max_concurrent_sends: 20,
        }
    }
}

/// A queued merchant notification.
#[derive(Debug)]
struct ForwardRequest {
    url: String,
    body: Value,
}

/// Submits merchant callback POSTs to a background sender task.
///
/// `submit` never blocks the request path: the channel is bounded and a
/// full queue drops the forward with a warning. Delivery is best effort,
/// no retry.
#[derive(Clone)]
pub struct Forwarder {
    tx: mpsc::Sender<ForwardRequest>,
}

impl Forwarder {
    /// Create a forwarder and spawn its background sender task.
    pub fn spawn(config: &ForwarderConfig, shutdown: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel::<ForwardRequest>(config.channel_capacity);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create forwarder HTTP client");

        tokio::spawn(run_sender(rx, http_client, config.max_concurrent_sends, shutdown));

        Self { tx }
    }

    /// Queue a forward. Returns immediately; the POST happens on the
    /// sender task.
    pub fn submit(&self, url: impl Into<String>, body: Value) {
        let request = ForwardRequest { url: url.into(), body };
        if let Err(e) = self.tx.try_send(request) {
            tracing::warn!("Failed to queue merchant callback (dropping, no retry): {}", e);
        }
    }
}

/// Long-lived task that receives queued notifications and performs the
/// HTTP delivery.
async fn run_sender(mut rx: mpsc::Receiver<ForwardRequest>, http_client: reqwest::Client, max_concurrent_sends: usize, shutdown: CancellationToken) {
    let semaphore = Arc::new(Semaphore::new(max_concurrent_sends));

    loop {
        let request = tokio::select! {
            req = rx.recv() => {
                match req {
                    Some(r) => r,
                    None => {
                        tracing::debug!("Forwarder channel closed, shutting down");
                        break;
                    }
                }
            }
            _ = shutdown.cancelled() => {
                tracing::debug!("Forwarder received shutdown signal");
                break;
            }
        };

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!("Forwarder semaphore closed");
                break;
            }
        };

        let client = http_client.clone();

        tokio::spawn(async move {
            let _permit = permit;

            tracing::debug!(url = %request.url, "Forwarding event to merchant callback");

            match client.post(&request.url).json(&request.body).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(url = %request.url, status = response.status().as_u16(), "Merchant callback delivered");
                }
                Ok(response) => {
                    tracing::warn!(
                        url = %request.url,
                        status = response.status().as_u16(),
                        "Merchant callback rejected (no retry)"
                    );
                }
                Err(e) => {
                    tracing::warn!(url = %request.url, "Merchant callback failed (no retry): {}", e);
                }
            }
        });
    }

    tracing::debug!("Forwarder sender task exited");
}
