//! HMAC signature verification for inbound provider webhooks.
//!
//! Two schemes are in play:
//!
//! - **Stripe**: the `stripe-signature` header carries `t=<unix>,v1=<hex>`
//!   where `v1` is hex-encoded HMAC-SHA256 over `"{t}.{body}"`. Deliveries
//!   older than the replay tolerance are rejected.
//! - **Paystack**: the `x-paystack-signature` header is hex-encoded
//!   HMAC-SHA512 of the raw body.
//!
//! Flutterwave's `verif-hash` is a plain shared-secret equality check and
//! lives in its adapter; no MAC is involved.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Maximum accepted age of a signed Stripe delivery, in seconds.
const STRIPE_TOLERANCE_SECS: i64 = 300;

/// Compute the hex HMAC-SHA256 Stripe signs `"{timestamp}.{payload}"` with.
pub fn stripe_signature(timestamp: i64, payload: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a Stripe-style `t=...,v1=...` signature header.
///
/// Accepts the delivery if any `v1` entry matches and the timestamp is
/// within the replay tolerance.
pub fn verify_stripe_signature(header: &str, payload: &[u8], secret: &str) -> bool {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let (Some(timestamp), false) = (timestamp, candidates.is_empty()) else {
        return false;
    };

    let now = chrono::Utc::now().timestamp();
    if (now - timestamp).abs() > STRIPE_TOLERANCE_SECS {
        return false;
    }

    let expected = stripe_signature(timestamp, payload, secret);
    candidates
        .iter()
        .any(|candidate| constant_time_eq(candidate.as_bytes(), expected.as_bytes()))
}

/// Compute the hex HMAC-SHA512 Paystack signs the raw body with.
pub fn paystack_signature(payload: &[u8], secret: &str) -> String {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify an `x-paystack-signature` header against the raw body.
pub fn verify_paystack_signature(header: &str, payload: &[u8], secret: &str) -> bool {
    let expected = paystack_signature(payload, secret);
    constant_time_eq(header.as_bytes(), expected.as_bytes())
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
