//! Append-only audit trail for order lifecycle events and runner job runs.
//!
//! Deduplicates on (order, event, actor): escrow release fired twice still
//! produces exactly one `escrow_released` record.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use soko_types::{JobRun, OrderEvent, OrderId, UserId};

#[derive(Debug, Default)]
pub struct AuditTrail {
    events: Vec<OrderEvent>,
    seen: HashSet<(OrderId, String, UserId)>,
    job_runs: Vec<JobRun>,
}

impl AuditTrail {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event. Returns false (and records nothing) when this
    /// (order, event, actor) was already recorded.
    pub fn record(
        &mut self,
        order_id: OrderId,
        event: &str,
        actor: UserId,
        detail: serde_json::Value,
        at: DateTime<Utc>,
    ) -> bool {
        if !self.seen.insert((order_id, event.to_string(), actor)) {
            return false;
        }
        self.events.push(OrderEvent {
            order_id,
            event: event.to_string(),
            actor,
            detail,
            at,
        });
        true
    }

    /// All events for one order, in recording order.
    pub fn events_for(&self, order_id: OrderId) -> impl Iterator<Item = &OrderEvent> {
        self.events.iter().filter(move |e| e.order_id == order_id)
    }

    #[must_use]
    pub fn events(&self) -> &[OrderEvent] {
        &self.events
    }

    pub fn record_job_run(&mut self, run: JobRun) {
        self.job_runs.push(run);
    }

    #[must_use]
    pub fn job_runs(&self) -> &[JobRun] {
        &self.job_runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_event_recorded_once() {
        let mut trail = AuditTrail::new();
        let order = OrderId::new();
        let actor = UserId::new();
        assert!(trail.record(order, "escrow_released", actor, serde_json::json!({}), Utc::now()));
        assert!(!trail.record(order, "escrow_released", actor, serde_json::json!({}), Utc::now()));
        assert_eq!(trail.events_for(order).count(), 1);
    }

    #[test]
    fn same_event_different_actor_both_recorded() {
        let mut trail = AuditTrail::new();
        let order = OrderId::new();
        assert!(trail.record(order, "order_disputed", UserId::new(), serde_json::json!({}), Utc::now()));
        assert!(trail.record(order, "order_disputed", UserId::new(), serde_json::json!({}), Utc::now()));
        assert_eq!(trail.events_for(order).count(), 2);
    }

    #[test]
    fn events_scoped_per_order() {
        let mut trail = AuditTrail::new();
        let a = OrderId::new();
        let b = OrderId::new();
        let actor = UserId::new();
        trail.record(a, "order_paid", actor, serde_json::json!({}), Utc::now());
        trail.record(b, "order_paid", actor, serde_json::json!({}), Utc::now());
        assert_eq!(trail.events_for(a).count(), 1);
        assert_eq!(trail.events().len(), 2);
    }
}
