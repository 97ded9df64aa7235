//! Webhook event records.
//!
//! Every delivered provider event is recorded under (provider, event_id)
//! before any side effect runs, so redelivery is detected and
//! short-circuited, and a crash between persisting and applying is safely
//! retried by the provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing status of a recorded webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    /// Recorded, side effects not yet applied.
    Received,
    /// Side effects applied successfully.
    Processed,
    /// Event type does not drive settlement state; acknowledged as ignored.
    Ignored,
    /// Processing failed; the error stays visible here for operators while
    /// the provider still gets an acknowledgement.
    Failed,
}

impl std::fmt::Display for WebhookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Received => write!(f, "RECEIVED"),
            Self::Processed => write!(f, "PROCESSED"),
            Self::Ignored => write!(f, "IGNORED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// One recorded provider event. (provider, event_id) is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub provider: String,
    /// Provider-side event id; the dedupe key together with `provider`.
    pub event_id: String,
    /// The provider's name for what happened (e.g. `charge.success`).
    pub event_type: String,
    /// The payment reference the event points at, when present.
    pub reference: Option<String>,
    pub status: WebhookStatus,
    /// SHA-256 of the raw delivered body.
    pub payload_hash: [u8; 32],
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    /// Stable error code when processing failed.
    pub error: Option<String>,
}

impl WebhookEvent {
    /// Hash a raw webhook body for storage.
    #[must_use]
    pub fn hash_payload(raw: &[u8]) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(raw);
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_hash_deterministic() {
        let a = WebhookEvent::hash_payload(b"{\"event\":\"charge.success\"}");
        let b = WebhookEvent::hash_payload(b"{\"event\":\"charge.success\"}");
        assert_eq!(a, b);
        assert_ne!(a, WebhookEvent::hash_payload(b"{}"));
    }

    #[test]
    fn status_display() {
        assert_eq!(format!("{}", WebhookStatus::Processed), "PROCESSED");
        assert_eq!(format!("{}", WebhookStatus::Ignored), "IGNORED");
    }
}
