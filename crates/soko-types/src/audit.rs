//! Audit trail records: per-order lifecycle events and runner job runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{OrderId, UserId};

/// One append-only order lifecycle event.
///
/// The trail deduplicates on (order, event, actor), so a duplicate trigger
/// produces exactly one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: OrderId,
    /// Stable event name (e.g. `escrow_released`, `availability_denied`).
    pub event: String,
    pub actor: UserId,
    /// Free-shape structured context for operators.
    pub detail: serde_json::Value,
    pub at: DateTime<Utc>,
}

/// Summary record of one automation sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub processed: usize,
    pub released: usize,
    pub refunded: usize,
    pub disputed: usize,
    pub skipped: usize,
    pub errors: usize,
    /// False when any row errored during the sweep.
    pub ok: bool,
}
