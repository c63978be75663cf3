//! Tracing initialization.
//!
//! Sets up `tracing-subscriber` with an `EnvFilter` (defaulting to `info`)
//! and a console fmt layer. Filtering is controlled with the standard
//! `RUST_LOG` environment variable, e.g. `RUST_LOG=payrail=debug`.

use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize tracing for the process.
///
/// Safe to call once per process; returns an error if a global subscriber
/// was already installed.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    info!("Telemetry initialized");

    Ok(())
}
