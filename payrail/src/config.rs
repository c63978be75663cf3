//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides.
//! The configuration file path defaults to `config.yaml` but can be specified via
//! the `-f` flag or the `PAYRAIL_CONFIG` environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override
//! earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `PAYRAIL_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For
//! example, `PAYRAIL_STORE__URL=https://sheets.internal` sets the `store.url` field.
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port` - HTTP server binding
//! - **Public URL**: `host_url` - base URL embedded in provider redirect links
//! - **Credential store**: `store.url`, `store.sheet`, `store.worksheet`
//! - **Provider endpoints**: `providers.*_url` - override outbound API base URLs
//! - **Forwarder**: `forwarder.*` - merchant callback delivery tuning

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::Error;
use crate::store::StoreConfig;
use crate::webhooks::dispatcher::ForwarderConfig;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "PAYRAIL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment
/// variables. All fields have defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Base URL where this service is publicly reachable. Embedded into the
    /// redirect URLs handed to payment providers.
    pub host_url: String,
    /// Remote credential store (sheet-backed key-value service)
    pub store: StoreConfig,
    /// Outbound payment-provider API base URLs
    pub providers: ProviderEndpoints,
    /// Merchant callback forwarder tuning
    pub forwarder: ForwarderConfig,
    /// Timeout for outbound provider API calls, in seconds
    pub provider_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            host_url: "http://localhost:8000".to_string(),
            store: StoreConfig::default(),
            providers: ProviderEndpoints::default(),
            forwarder: ForwarderConfig::default(),
            provider_timeout_secs: 30,
        }
    }
}

/// Base URLs for the outbound provider APIs.
///
/// Overridable so that staging deployments and tests can point the adapters
/// at a different host.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderEndpoints {
    pub flutterwave_url: String,
    pub paystack_url: String,
    pub stripe_url: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            flutterwave_url: "https://api.flutterwave.com/v3".to_string(),
            paystack_url: "https://api.paystack.co".to_string(),
            stripe_url: "https://api.stripe.com/v1".to_string(),
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("PAYRAIL_").split("__"))
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.store.url.is_empty() {
            return Err(Error::bad_request(
                "Config validation: store.url is not configured. \
                 Set PAYRAIL_STORE__URL or add store.url to the config file.",
            ));
        }
        if self.store.sheet.is_empty() {
            return Err(Error::bad_request(
                "Config validation: store.sheet is not configured. \
                 Set PAYRAIL_STORE__SHEET or add store.sheet to the config file.",
            ));
        }
        Url::parse(&self.host_url)
            .map_err(|e| Error::bad_request(format!("Config validation: host_url is not a valid URL: {e}")))?;
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
