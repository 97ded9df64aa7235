//! Payment intent manager.
//!
//! `transition` is the sole mutator of intent status. Every transition is
//! keyed by sha256(reference, target); replaying an applied key is a no-op,
//! which makes webhook redelivery and admin double-clicks harmless.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use soko_types::{
    IntentId, IntentPurpose, IntentStatus, IntentTransition, Minor, Order, OrderStatus,
    PaymentIntent, Result, SokoError, UserId,
};

use crate::providers::{PaymentProvider, ProviderDirective};

/// Whether a transition changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    AlreadyApplied,
}

/// Drift between an intent and the order it funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drift {
    /// The order is paid but the intent never reached PAID.
    OrderAheadOfIntent,
    /// The intent is PAID but the order was never marked paid.
    IntentAheadOfOrder,
}

/// Read-repair report for one (intent, order) pair.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileReport {
    pub intent_status: IntentStatus,
    pub order_status: OrderStatus,
    pub drift: Option<Drift>,
}

/// In-memory intent store, keyed by payment reference.
#[derive(Debug, Default)]
pub struct IntentManager {
    intents: HashMap<String, PaymentIntent>,
}

impl IntentManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new intent, or reuse the existing one under this reference
    /// when the terms match exactly.
    ///
    /// The provider's directive decides the first transition: a settled
    /// directive lands the intent in PAID, a redirect in AWAITING_PAYMENT,
    /// bank instructions in MANUAL_PENDING.
    pub fn initialize(
        &mut self,
        owner: UserId,
        provider: &dyn PaymentProvider,
        reference: &str,
        purpose: IntentPurpose,
        amount: Minor,
        now: DateTime<Utc>,
    ) -> Result<(PaymentIntent, ProviderDirective)> {
        if let Some(existing) = self.intents.get(reference) {
            if existing.owner != owner
                || existing.purpose != purpose
                || existing.amount != amount
                || existing.provider != provider.id()
            {
                return Err(SokoError::IntentTermsMismatch {
                    reference: reference.to_string(),
                });
            }
            tracing::debug!(reference, "reusing existing payment intent");
            let directive = provider.begin(existing)?;
            return Ok((existing.clone(), directive));
        }

        let intent = PaymentIntent {
            id: IntentId::new(),
            owner,
            provider: provider.id(),
            reference: reference.to_string(),
            purpose,
            amount,
            status: IntentStatus::Initialized,
            transitions: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let directive = provider.begin(&intent)?;
        self.intents.insert(reference.to_string(), intent);

        let first_target = match &directive {
            ProviderDirective::Settled => IntentStatus::Paid,
            ProviderDirective::RedirectTo { .. } => IntentStatus::AwaitingPayment,
            ProviderDirective::BankInstructions { .. } => IntentStatus::ManualPending,
        };
        self.transition(reference, first_target, owner, "provider directive", now)?;

        // The insert above guarantees presence.
        let intent = self
            .intents
            .get(reference)
            .cloned()
            .ok_or_else(|| SokoError::Internal("intent vanished after insert".to_string()))?;
        Ok((intent, directive))
    }

    /// Apply one status transition. The only mutator.
    pub fn transition(
        &mut self,
        reference: &str,
        target: IntentStatus,
        actor: UserId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome> {
        let intent = self
            .intents
            .get_mut(reference)
            .ok_or_else(|| SokoError::IntentNotFound {
                reference: reference.to_string(),
            })?;

        let key = PaymentIntent::transition_key(reference, target);
        if intent.has_transition(key.as_str()) {
            tracing::debug!(reference, target = %target, "intent transition already applied");
            return Ok(TransitionOutcome::AlreadyApplied);
        }
        if !intent.status.can_transition_to(target) {
            return Err(SokoError::InvalidIntentTransition {
                from: intent.status,
                to: target,
            });
        }

        intent.transitions.push(IntentTransition {
            key,
            from: intent.status,
            to: target,
            actor,
            reason: reason.to_string(),
            at: now,
        });
        tracing::info!(reference, from = %intent.status, to = %target, reason, "intent transition");
        intent.status = target;
        intent.updated_at = now;
        Ok(TransitionOutcome::Applied)
    }

    /// Admin confirmation of an out-of-band bank transfer.
    ///
    /// The declared amount must equal the intent's expected amount exactly;
    /// a mismatch is a security anomaly, never silently corrected.
    pub fn manual_mark_paid(
        &mut self,
        reference: &str,
        declared_amount: Minor,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome> {
        let intent = self
            .intents
            .get(reference)
            .ok_or_else(|| SokoError::IntentNotFound {
                reference: reference.to_string(),
            })?;
        if declared_amount != intent.amount {
            return Err(SokoError::AmountMismatch {
                expected: intent.amount,
                actual: declared_amount,
            });
        }
        self.transition(reference, IntentStatus::Paid, actor, "manual confirmation", now)
    }

    /// Compare intent and order progress without mutating either.
    pub fn reconcile(&self, reference: &str, order: &Order) -> Result<ReconcileReport> {
        let intent = self
            .intents
            .get(reference)
            .ok_or_else(|| SokoError::IntentNotFound {
                reference: reference.to_string(),
            })?;

        let order_paid = order.paid_at.is_some();
        let intent_paid = intent.status == IntentStatus::Paid;
        let drift = match (intent_paid, order_paid) {
            (false, true) if intent.status != IntentStatus::Failed => {
                Some(Drift::OrderAheadOfIntent)
            }
            (true, false) => Some(Drift::IntentAheadOfOrder),
            _ => None,
        };
        Ok(ReconcileReport {
            intent_status: intent.status,
            order_status: order.status,
            drift,
        })
    }

    #[must_use]
    pub fn get(&self, reference: &str) -> Option<&PaymentIntent> {
        self.intents.get(reference)
    }
}
