//! API layer for HTTP request handling.
//!
//! Thin translation between the JSON surface and the provider core: every
//! handler resolves a provider configuration, invokes one uniform operation
//! and shapes the `{status, msg, data}` envelope.

pub mod handlers;
