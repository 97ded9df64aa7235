//! Webhook ingestion plumbing: signature verification, payload parsing,
//! and the (provider, event_id) event log.
//!
//! The log is written before any side effect runs. A redelivered event is
//! answered from the log; a crash between recording and applying leaves a
//! RECEIVED row behind for operators, and the provider's retry is absorbed
//! as a duplicate.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha512;

use soko_types::{Minor, Result, SokoError, WebhookEvent, WebhookStatus};

type HmacSha512 = Hmac<Sha512>;

/// Verify a provider's HMAC-SHA512 hex signature over the raw body.
pub fn verify_signature(secret: &str, raw: &[u8], signature: &str) -> Result<bool> {
    let Ok(provided) = hex::decode(signature) else {
        return Ok(false);
    };
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| SokoError::Internal(format!("hmac key: {e}")))?;
    mac.update(raw);
    Ok(mac.verify_slice(&provided).is_ok())
}

/// Sign a body the way providers do. Test and demo helper.
pub fn sign_payload(secret: &str, raw: &[u8]) -> Result<String> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| SokoError::Internal(format!("hmac key: {e}")))?;
    mac.update(raw);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// The fields the core cares about, pulled out of a provider payload.
#[derive(Debug, Clone)]
pub struct ParsedEvent {
    pub event_id: String,
    pub event_type: String,
    pub reference: Option<String>,
    pub amount: Option<Minor>,
}

#[derive(Deserialize)]
struct RawEvent {
    event: String,
    #[serde(default)]
    data: RawData,
}

#[derive(Deserialize, Default)]
struct RawData {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    amount: Option<u64>,
}

/// Parse a raw webhook body.
///
/// Events without a provider-side id fall back to the payload hash, so
/// redelivery of the identical body still dedupes.
pub fn parse(raw: &[u8]) -> Result<ParsedEvent> {
    let event: RawEvent =
        serde_json::from_slice(raw).map_err(|e| SokoError::MalformedPayload {
            reason: e.to_string(),
        })?;
    let event_id = match event.data.id {
        Some(id) => id.to_string(),
        None => hex::encode(&WebhookEvent::hash_payload(raw)[..16]),
    };
    Ok(ParsedEvent {
        event_id,
        event_type: event.event,
        reference: event.data.reference,
        amount: event.data.amount.map(Minor),
    })
}

/// Append-style store of every delivered event, keyed by (provider, event_id).
#[derive(Debug, Default)]
pub struct WebhookLog {
    events: HashMap<(String, String), WebhookEvent>,
}

impl WebhookLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, provider: &str, event_id: &str) -> Option<&WebhookEvent> {
        self.events
            .get(&(provider.to_string(), event_id.to_string()))
    }

    /// Record a freshly delivered event as RECEIVED.
    pub fn record(&mut self, provider: &str, parsed: &ParsedEvent, raw: &[u8], now: DateTime<Utc>) {
        self.events.insert(
            (provider.to_string(), parsed.event_id.clone()),
            WebhookEvent {
                provider: provider.to_string(),
                event_id: parsed.event_id.clone(),
                event_type: parsed.event_type.clone(),
                reference: parsed.reference.clone(),
                status: WebhookStatus::Received,
                payload_hash: WebhookEvent::hash_payload(raw),
                received_at: now,
                processed_at: None,
                error: None,
            },
        );
    }

    /// Mark a recorded event's final status.
    pub fn mark(
        &mut self,
        provider: &str,
        event_id: &str,
        status: WebhookStatus,
        error: Option<String>,
        now: DateTime<Utc>,
    ) {
        if let Some(event) = self
            .events
            .get_mut(&(provider.to_string(), event_id.to_string()))
        {
            event.status = status;
            event.processed_at = Some(now);
            event.error = error;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
