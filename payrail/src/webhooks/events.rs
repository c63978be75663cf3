//! Canonical webhook event types.
//!
//! Every provider delivers payment events in its own JSON envelope; the
//! adapters map them all onto this one vocabulary before dispatch.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical event vocabulary.
///
/// Unknown provider event names map to `Unrecognized` with the original
/// name preserved - never dropped silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "charge.completed")]
    ChargeCompleted,
    #[serde(rename = "transfer.completed")]
    TransferCompleted,
    #[serde(rename = "invoice.updated")]
    InvoiceUpdated,
    #[serde(rename = "subscription.disabled")]
    SubscriptionDisabled,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
    #[serde(rename = "unrecognized")]
    Unrecognized,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChargeCompleted => write!(f, "charge.completed"),
            Self::TransferCompleted => write!(f, "transfer.completed"),
            Self::InvoiceUpdated => write!(f, "invoice.updated"),
            Self::SubscriptionDisabled => write!(f, "subscription.disabled"),
            Self::PaymentFailed => write!(f, "payment.failed"),
            Self::Unrecognized => write!(f, "unrecognized"),
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "charge.completed" => Ok(Self::ChargeCompleted),
            "transfer.completed" => Ok(Self::TransferCompleted),
            "invoice.updated" => Ok(Self::InvoiceUpdated),
            "subscription.disabled" => Ok(Self::SubscriptionDisabled),
            "payment.failed" => Ok(Self::PaymentFailed),
            "unrecognized" => Ok(Self::Unrecognized),
            _ => Err(format!("Unknown event type: {s}")),
        }
    }
}

/// The normalized output of webhook processing.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalEvent {
    pub kind: EventKind,
    /// The event name exactly as the provider sent it
    pub provider_event: String,
    /// Canonical sub-fields for `kind`, or the provider's raw payload when
    /// full fidelity was requested
    pub data: Value,
}

impl CanonicalEvent {
    pub fn new(kind: EventKind, provider_event: impl Into<String>, data: Value) -> Self {
        Self {
            kind,
            provider_event: provider_event.into(),
            data,
        }
    }

    /// An event the provider sent but this layer does not recognize. The
    /// raw event name and data ride along verbatim.
    pub fn unrecognized(provider_event: impl Into<String>, data: Value) -> Self {
        Self::new(EventKind::Unrecognized, provider_event, data)
    }

    /// The JSON body forwarded to the merchant callback. Unrecognized
    /// events carry the provider's own event name so nothing is lost.
    pub fn payload(&self) -> Value {
        let event = match self.kind {
            EventKind::Unrecognized => self.provider_event.clone(),
            kind => kind.to_string(),
        };
        serde_json::json!({ "event": event, "data": self.data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_kind_from_str() {
        assert_eq!("charge.completed".parse::<EventKind>().unwrap(), EventKind::ChargeCompleted);
        assert_eq!("transfer.completed".parse::<EventKind>().unwrap(), EventKind::TransferCompleted);
        assert!("invalid".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_display_round_trips_serde_names() {
        for kind in [
            EventKind::ChargeCompleted,
            EventKind::TransferCompleted,
            EventKind::InvoiceUpdated,
            EventKind::SubscriptionDisabled,
            EventKind::PaymentFailed,
            EventKind::Unrecognized,
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.to_string()));
            assert_eq!(kind.to_string().parse::<EventKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_payload_uses_canonical_name() {
        let event = CanonicalEvent::new(EventKind::ChargeCompleted, "charge.success", json!({"amount": 4000}));
        assert_eq!(
            event.payload(),
            json!({"event": "charge.completed", "data": {"amount": 4000}})
        );
    }

    #[test]
    fn test_payload_preserves_unrecognized_name() {
        let event = CanonicalEvent::unrecognized("charge.dispute.create", json!({"id": "dsp_1"}));
        assert_eq!(
            event.payload(),
            json!({"event": "charge.dispute.create", "data": {"id": "dsp_1"}})
        );
    }
}
