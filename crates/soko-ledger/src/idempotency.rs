//! Request idempotency store.
//!
//! Callers that retry a mutating request present the same idempotency key;
//! the store replays the captured response instead of re-running the
//! handler. A key reused with a different payload is a client bug and is
//! rejected with a conflict. Records expire after a TTL so keys can be
//! reused across unrelated sessions.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use soko_types::{Result, SokoError, UserId};

/// Response captured for replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

/// Outcome of an idempotency check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// No live record for this key — run the handler, then [`IdempotencyStore::store`].
    Miss,
    /// Same key, same payload — return the captured response without
    /// re-running the handler.
    Replay(StoredResponse),
}

#[derive(Debug, Clone)]
struct Record {
    payload_hash: [u8; 32],
    response: Option<StoredResponse>,
    stored_at: DateTime<Utc>,
}

/// In-memory (actor, endpoint, key) idempotency record store.
pub struct IdempotencyStore {
    records: HashMap<(UserId, String, String), Record>,
    ttl_secs: i64,
}

impl IdempotencyStore {
    #[must_use]
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            records: HashMap::new(),
            ttl_secs: i64::try_from(ttl_secs).unwrap_or(i64::MAX),
        }
    }

    /// Look up a key before running a mutating handler.
    ///
    /// # Errors
    /// [`SokoError::IdempotencyConflict`] when the key exists with a
    /// different payload hash.
    pub fn check(
        &mut self,
        actor: UserId,
        endpoint: &str,
        key: &str,
        payload_hash: [u8; 32],
        now: DateTime<Utc>,
    ) -> Result<CheckOutcome> {
        let record_key = (actor, endpoint.to_string(), key.to_string());

        if let Some(record) = self.records.get(&record_key) {
            if self.is_expired(record, now) {
                self.records.remove(&record_key);
                return Ok(CheckOutcome::Miss);
            }
            if record.payload_hash != payload_hash {
                return Err(SokoError::IdempotencyConflict);
            }
            if let Some(response) = &record.response {
                return Ok(CheckOutcome::Replay(response.clone()));
            }
            // Key seen but no response captured yet (handler in flight or
            // crashed before store). Treat as a miss and let the handler's
            // own idempotency absorb the rerun.
            return Ok(CheckOutcome::Miss);
        }

        self.records.insert(
            record_key,
            Record {
                payload_hash,
                response: None,
                stored_at: now,
            },
        );
        Ok(CheckOutcome::Miss)
    }

    /// Capture the handler's response for later replay.
    pub fn store(
        &mut self,
        actor: UserId,
        endpoint: &str,
        key: &str,
        payload_hash: [u8; 32],
        response: StoredResponse,
        now: DateTime<Utc>,
    ) {
        self.records.insert(
            (actor, endpoint.to_string(), key.to_string()),
            Record {
                payload_hash,
                response: Some(response),
                stored_at: now,
            },
        );
    }

    /// Drop expired records. Call periodically from the automation runner.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        let ttl = self.ttl_secs;
        self.records
            .retain(|_, r| now - r.stored_at <= Duration::seconds(ttl));
        before - self.records.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn is_expired(&self, record: &Record, now: DateTime<Utc>) -> bool {
        now - record.stored_at > Duration::seconds(self.ttl_secs)
    }
}

/// Hash a raw request payload for conflict detection.
#[must_use]
pub fn payload_hash(raw: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(raw);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_response() -> StoredResponse {
        StoredResponse {
            status: 200,
            body: serde_json::json!({"ok": true}),
        }
    }

    #[test]
    fn first_check_is_miss() {
        let mut store = IdempotencyStore::new(3600);
        let actor = UserId::new();
        let hash = payload_hash(b"{\"amount\":100}");
        let outcome = store
            .check(actor, "orders.create", "key-1", hash, Utc::now())
            .unwrap();
        assert!(matches!(outcome, CheckOutcome::Miss));
    }

    #[test]
    fn stored_response_replays() {
        let mut store = IdempotencyStore::new(3600);
        let actor = UserId::new();
        let hash = payload_hash(b"{\"amount\":100}");
        let now = Utc::now();

        store.check(actor, "orders.create", "key-1", hash, now).unwrap();
        store.store(actor, "orders.create", "key-1", hash, ok_response(), now);

        let outcome = store
            .check(actor, "orders.create", "key-1", hash, now)
            .unwrap();
        match outcome {
            CheckOutcome::Replay(response) => {
                assert_eq!(response.status, 200);
                assert_eq!(response.body["ok"], true);
            }
            CheckOutcome::Miss => panic!("expected replay"),
        }
    }

    #[test]
    fn different_payload_same_key_conflicts() {
        let mut store = IdempotencyStore::new(3600);
        let actor = UserId::new();
        let now = Utc::now();
        store
            .check(actor, "orders.create", "key-1", payload_hash(b"a"), now)
            .unwrap();
        let err = store
            .check(actor, "orders.create", "key-1", payload_hash(b"b"), now)
            .unwrap_err();
        assert!(matches!(err, SokoError::IdempotencyConflict));
    }

    #[test]
    fn expired_record_is_miss_again() {
        let mut store = IdempotencyStore::new(60);
        let actor = UserId::new();
        let hash = payload_hash(b"a");
        let start = Utc::now();

        store.check(actor, "orders.create", "key-1", hash, start).unwrap();
        store.store(actor, "orders.create", "key-1", hash, ok_response(), start);

        let later = start + Duration::seconds(61);
        let outcome = store
            .check(actor, "orders.create", "key-1", hash, later)
            .unwrap();
        assert!(matches!(outcome, CheckOutcome::Miss));
    }

    #[test]
    fn keys_scoped_by_actor_and_endpoint() {
        let mut store = IdempotencyStore::new(3600);
        let a = UserId::new();
        let b = UserId::new();
        let now = Utc::now();
        let hash = payload_hash(b"a");

        store.check(a, "orders.create", "key-1", hash, now).unwrap();
        store.store(a, "orders.create", "key-1", hash, ok_response(), now);

        // Same key, different actor: independent record.
        let outcome = store.check(b, "orders.create", "key-1", hash, now).unwrap();
        assert!(matches!(outcome, CheckOutcome::Miss));

        // Same actor, different endpoint: independent record.
        let outcome = store.check(a, "wallet.withdraw", "key-1", hash, now).unwrap();
        assert!(matches!(outcome, CheckOutcome::Miss));
    }

    #[test]
    fn prune_drops_only_expired() {
        let mut store = IdempotencyStore::new(60);
        let actor = UserId::new();
        let start = Utc::now();
        let hash = payload_hash(b"a");

        store.check(actor, "orders.create", "old", hash, start).unwrap();
        store
            .check(actor, "orders.create", "new", hash, start + Duration::seconds(50))
            .unwrap();

        let dropped = store.prune(start + Duration::seconds(70));
        assert_eq!(dropped, 1);
        assert_eq!(store.len(), 1);
    }
}
