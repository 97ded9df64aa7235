//! The settlement core facade.
//!
//! [`SettlementCore`] owns every manager and wires them together; an HTTP
//! layer (out of scope here) calls these methods and maps [`SokoError`]
//! through its `http_status()` to a response. All methods take `&mut self`:
//! the exclusive borrow is the in-process equivalent of the per-order row
//! lock, so two confirms can never interleave inside one order.

use chrono::{DateTime, Utc};

use soko_ledger::{CheckOutcome, IdempotencyStore, StoredResponse, WalletLedger, payload_hash};
use soko_types::{
    EntryDirection, EntryKind, FulfillmentMode, HandoffRole, InspectionOutcome, IntentPurpose,
    JobRun, ListingId, Minor, Order, OrderId, OrderStatus, PaymentIntent, ProviderId, Result,
    SettlementConfig, SokoError, UnlockStep, UserId, WalletLedgerEntry, WebhookEvent, OrderEvent,
    WebhookStatus,
};

use soko_commission::RateCard;

use crate::audit::AuditTrail;
use crate::collab::{FeatureFlags, ListingDirectory, Notifier};
use crate::escrow::{Escrow, EscrowOutcome};
use crate::intent::{IntentManager, ReconcileReport, Drift};
use crate::lifecycle::OrderLifecycle;
use crate::providers::{ProviderDirective, ProviderRegistry};
use crate::runner::{EscrowRunner, SweepSummary};
use crate::unlock::{SettlementTrigger, UnlockManager};
use crate::webhook::{self, WebhookLog};

/// Result of one webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The event drove a settlement state change.
    Processed,
    /// The event type does not concern settlement; acknowledged.
    Ignored,
    /// Redelivery of an already-recorded event; the stored status answers.
    Duplicate { status: WebhookStatus },
    /// Processing failed; the error is recorded on the event row and the
    /// delivery is still acknowledged.
    Failed { error: String },
}

pub struct SettlementCore<L, N, F> {
    config: SettlementConfig,
    listings: L,
    notifier: N,
    flags: F,
    lifecycle: OrderLifecycle,
    escrow: Escrow,
    intents: IntentManager,
    providers: ProviderRegistry,
    unlocks: UnlockManager,
    ledger: WalletLedger,
    webhooks: WebhookLog,
    idempotency: IdempotencyStore,
    runner: EscrowRunner,
}

impl<L, N, F> SettlementCore<L, N, F>
where
    L: ListingDirectory,
    N: Notifier,
    F: FeatureFlags,
{
    #[must_use]
    pub fn new(
        config: SettlementConfig,
        listings: L,
        notifier: N,
        flags: F,
        providers: ProviderRegistry,
    ) -> Self {
        let ttl = u64::try_from(config.idempotency_ttl_secs).unwrap_or(0);
        let escrow = Escrow::new(config.platform_account, RateCard::default());
        Self {
            config,
            listings,
            notifier,
            flags,
            lifecycle: OrderLifecycle::new(),
            escrow,
            intents: IntentManager::new(),
            providers,
            unlocks: UnlockManager::new(),
            ledger: WalletLedger::new(),
            webhooks: WebhookLog::new(),
            idempotency: IdempotencyStore::new(ttl),
            runner: EscrowRunner::new(),
        }
    }

    // -----------------------------------------------------------------
    // order lifecycle
    // -----------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn create_order(
        &mut self,
        buyer: UserId,
        listing: ListingId,
        payment_reference: &str,
        delivery_fee: Minor,
        inspection_fee: Minor,
        inspection_required: bool,
        now: DateTime<Utc>,
    ) -> Result<OrderId> {
        self.lifecycle.create(
            buyer,
            listing,
            &self.listings,
            payment_reference,
            delivery_fee,
            inspection_fee,
            inspection_required,
            self.escrow.card(),
            now,
        )
    }

    pub fn mark_paid(&mut self, id: OrderId, reference: &str, now: DateTime<Utc>) -> Result<()> {
        self.lifecycle.mark_paid(
            id,
            reference,
            &self.escrow,
            &mut self.notifier,
            &self.config,
            now,
        )
    }

    pub fn confirm_availability(
        &mut self,
        id: OrderId,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.lifecycle.confirm_availability(id, actor, now)
    }

    pub fn deny_availability(
        &mut self,
        id: OrderId,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.lifecycle.deny_availability(
            id,
            actor,
            &self.escrow,
            &mut self.ledger,
            &mut self.notifier,
            now,
        )
    }

    pub fn set_fulfillment_mode(
        &mut self,
        id: OrderId,
        mode: FulfillmentMode,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.lifecycle.set_fulfillment_mode(id, mode, now)
    }

    pub fn merchant_accept(&mut self, id: OrderId, actor: UserId, now: DateTime<Utc>) -> Result<()> {
        self.lifecycle.merchant_accept(id, actor, now)
    }

    pub fn assign_courier(&mut self, id: OrderId, courier: UserId, now: DateTime<Utc>) -> Result<()> {
        self.lifecycle.assign_courier(id, courier, now)
    }

    pub fn assign_inspector(
        &mut self,
        id: OrderId,
        inspector: UserId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.lifecycle.assign_inspector(id, inspector, now)
    }

    pub fn driver_status(
        &mut self,
        id: OrderId,
        target: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.lifecycle.driver_status(id, target, &self.unlocks, now)
    }

    pub fn record_inspection(
        &mut self,
        id: OrderId,
        outcome: InspectionOutcome,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.lifecycle.record_inspection(id, outcome, actor, now)
    }

    pub fn buyer_confirm_release(
        &mut self,
        id: OrderId,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.lifecycle
            .buyer_confirm_release(id, actor, &self.escrow, &mut self.ledger, now)
    }

    pub fn cancel_order(
        &mut self,
        id: OrderId,
        actor: UserId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.lifecycle
            .cancel(id, actor, reason, &self.escrow, &mut self.ledger, now)
    }

    pub fn resolve_dispute(
        &mut self,
        id: OrderId,
        refund_buyer: bool,
        now: DateTime<Utc>,
    ) -> Result<EscrowOutcome> {
        self.lifecycle
            .resolve_dispute(id, refund_buyer, &self.escrow, &mut self.ledger, now)
    }

    // -----------------------------------------------------------------
    // unlock gates
    // -----------------------------------------------------------------

    pub fn issue_unlock_code(
        &mut self,
        id: OrderId,
        step: UnlockStep,
        qr_required: bool,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let order = self.lifecycle.get(id)?;
        self.unlocks
            .issue_code(order, step, qr_required, &self.config, &mut self.notifier, now)
    }

    pub fn issue_qr(&self, id: OrderId, step: UnlockStep, now: DateTime<Utc>) -> Result<String> {
        self.unlocks.issue_qr(id, step, &self.config, now)
    }

    pub fn scan_qr(
        &mut self,
        token: &str,
        presented_role: HandoffRole,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.unlocks.scan_qr(token, presented_role, &self.config, now)
    }

    /// Confirm a handoff code and apply the settlement it obligates.
    pub fn confirm_unlock(
        &mut self,
        id: OrderId,
        step: UnlockStep,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<SettlementTrigger> {
        let trigger = self
            .unlocks
            .confirm(id, step, code, self.config.max_unlock_attempts, now)?;
        match trigger {
            SettlementTrigger::SaleLeg => {
                self.lifecycle
                    .settle_sale_leg(id, &self.escrow, &mut self.ledger, now)?;
            }
            SettlementTrigger::FullRelease => {
                self.lifecycle
                    .release_escrow(id, &self.escrow, &mut self.ledger, now)?;
            }
            SettlementTrigger::InspectionGate => {}
        }
        Ok(trigger)
    }

    pub fn request_override(
        &mut self,
        id: OrderId,
        step: UnlockStep,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<String> {
        self.unlocks.request_override(id, step, code, &self.config, now)
    }

    pub fn admin_reopen(
        &mut self,
        id: OrderId,
        step: UnlockStep,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.unlocks.admin_reopen(id, step, token, now)
    }

    // -----------------------------------------------------------------
    // payments
    // -----------------------------------------------------------------

    /// Start (or resume) collection for an order or a wallet top-up.
    pub fn initialize_payment(
        &mut self,
        owner: UserId,
        provider_id: ProviderId,
        reference: &str,
        purpose: IntentPurpose,
        amount: Minor,
        now: DateTime<Utc>,
    ) -> Result<(PaymentIntent, ProviderDirective)> {
        if let Some(order_id) = purpose.order_id() {
            let order = self.lifecycle.get(order_id)?;
            if order.paid_at.is_some() {
                return Err(SokoError::OrderAlreadyPaid(order_id));
            }
            if order.payment_reference.as_deref() != Some(reference) {
                return Err(SokoError::Validation {
                    reason: "reference does not match the order".to_string(),
                });
            }
            if amount != order.total {
                return Err(SokoError::AmountMismatch {
                    expected: order.total,
                    actual: amount,
                });
            }
        }

        let provider = self.providers.get(provider_id)?;
        let (intent, directive) =
            self.intents
                .initialize(owner, provider, reference, purpose, amount, now)?;
        // The mock provider settles synchronously; apply the money now.
        if intent.status == soko_types::IntentStatus::Paid {
            self.apply_settlement(reference, now)?;
        }
        Ok((intent, directive))
    }

    /// Admin confirmation of an out-of-band bank transfer.
    pub fn manual_mark_paid(
        &mut self,
        reference: &str,
        declared_amount: Minor,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.intents
            .manual_mark_paid(reference, declared_amount, actor, now)?;
        self.apply_settlement(reference, now)
    }

    /// Read-repair drift between an intent and the order it funds.
    pub fn reconcile_payment(
        &mut self,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<ReconcileReport> {
        let order_id = self
            .intents
            .get(reference)
            .ok_or_else(|| SokoError::IntentNotFound {
                reference: reference.to_string(),
            })?
            .purpose
            .order_id()
            .ok_or_else(|| SokoError::Validation {
                reason: "intent funds no order".to_string(),
            })?;

        let report = {
            let order = self.lifecycle.get(order_id)?;
            self.intents.reconcile(reference, order)?
        };
        match report.drift {
            Some(Drift::OrderAheadOfIntent) => {
                let actor = self.config.platform_account;
                self.intents.transition(
                    reference,
                    soko_types::IntentStatus::Paid,
                    actor,
                    "reconcile: order already paid",
                    now,
                )?;
            }
            Some(Drift::IntentAheadOfOrder) => {
                self.mark_paid(order_id, reference, now)?;
            }
            None => {}
        }
        Ok(report)
    }

    // -----------------------------------------------------------------
    // webhooks
    // -----------------------------------------------------------------

    /// Ingest one provider delivery.
    pub fn ingest_webhook(
        &mut self,
        provider: &str,
        raw: &[u8],
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome> {
        let secret = self.config.webhook_secrets.get(provider).ok_or_else(|| {
            SokoError::UnknownProvider {
                provider: provider.to_string(),
            }
        })?;
        if !webhook::verify_signature(secret, raw, signature)? {
            // Nothing is recorded for a forged delivery.
            return Err(SokoError::SignatureInvalid {
                provider: provider.to_string(),
            });
        }

        let parsed = webhook::parse(raw)?;
        if let Some(existing) = self.webhooks.get(provider, &parsed.event_id) {
            tracing::debug!(provider, event = %parsed.event_id, "webhook redelivery");
            return Ok(IngestOutcome::Duplicate {
                status: existing.status,
            });
        }
        self.webhooks.record(provider, &parsed, raw, now);

        if parsed.event_type != "charge.success" {
            self.webhooks
                .mark(provider, &parsed.event_id, WebhookStatus::Ignored, None, now);
            return Ok(IngestOutcome::Ignored);
        }

        match self.apply_charge_success(&parsed, now) {
            Ok(()) => {
                self.webhooks
                    .mark(provider, &parsed.event_id, WebhookStatus::Processed, None, now);
                Ok(IngestOutcome::Processed)
            }
            Err(err @ SokoError::AmountMismatch { .. }) => {
                // Security anomaly: recorded, surfaced, never retried into
                // acceptance.
                self.webhooks.mark(
                    provider,
                    &parsed.event_id,
                    WebhookStatus::Failed,
                    Some(err.code().to_string()),
                    now,
                );
                Err(err)
            }
            Err(err) => {
                tracing::error!(provider, event = %parsed.event_id, error = %err, "webhook processing failed");
                self.webhooks.mark(
                    provider,
                    &parsed.event_id,
                    WebhookStatus::Failed,
                    Some(err.code().to_string()),
                    now,
                );
                Ok(IngestOutcome::Failed {
                    error: err.code().to_string(),
                })
            }
        }
    }

    fn apply_charge_success(
        &mut self,
        parsed: &webhook::ParsedEvent,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let reference = parsed
            .reference
            .as_deref()
            .ok_or_else(|| SokoError::MalformedPayload {
                reason: "charge.success without reference".to_string(),
            })?;
        let amount = parsed.amount.ok_or_else(|| SokoError::MalformedPayload {
            reason: "charge.success without amount".to_string(),
        })?;
        let intent = self
            .intents
            .get(reference)
            .ok_or_else(|| SokoError::IntentNotFound {
                reference: reference.to_string(),
            })?;
        if amount != intent.amount {
            return Err(SokoError::AmountMismatch {
                expected: intent.amount,
                actual: amount,
            });
        }
        let owner = intent.owner;
        self.intents.transition(
            reference,
            soko_types::IntentStatus::Paid,
            owner,
            "provider webhook",
            now,
        )?;
        self.apply_settlement(reference, now)
    }

    /// Apply the money side of a PAID intent: mark the funded order paid,
    /// or credit a top-up wallet. Idempotent through the order's paid
    /// check and the ledger reference discipline.
    fn apply_settlement(&mut self, reference: &str, now: DateTime<Utc>) -> Result<()> {
        let intent = self
            .intents
            .get(reference)
            .ok_or_else(|| SokoError::IntentNotFound {
                reference: reference.to_string(),
            })?;
        let owner = intent.owner;
        let amount = intent.amount;
        match intent.purpose.order_id() {
            Some(order_id) => self.mark_paid(order_id, reference, now),
            None => {
                self.ledger.post(
                    owner,
                    EntryDirection::Credit,
                    amount,
                    EntryKind::Topup,
                    format!("topup:{reference}"),
                    "wallet top-up",
                    now,
                )?;
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------
    // automation
    // -----------------------------------------------------------------

    pub fn sweep(&mut self, now: DateTime<Utc>) -> Result<SweepSummary> {
        self.runner.sweep(
            &mut self.lifecycle,
            &self.unlocks,
            &self.escrow,
            &mut self.ledger,
            &self.flags,
            &self.config,
            now,
        )
    }

    // -----------------------------------------------------------------
    // request idempotency
    // -----------------------------------------------------------------

    /// Check an idempotency key before running a mutating handler.
    pub fn check_idempotency(
        &mut self,
        actor: UserId,
        endpoint: &str,
        key: &str,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<CheckOutcome> {
        self.idempotency
            .check(actor, endpoint, key, payload_hash(payload), now)
    }

    /// Capture the handler's response for replay.
    pub fn store_idempotent_response(
        &mut self,
        actor: UserId,
        endpoint: &str,
        key: &str,
        payload: &[u8],
        response: StoredResponse,
        now: DateTime<Utc>,
    ) {
        self.idempotency
            .store(actor, endpoint, key, payload_hash(payload), response, now);
    }

    // -----------------------------------------------------------------
    // read models
    // -----------------------------------------------------------------

    pub fn order(&self, id: OrderId) -> Result<&Order> {
        self.lifecycle.get(id)
    }

    #[must_use]
    pub fn order_by_reference(&self, reference: &str) -> Option<&Order> {
        self.lifecycle
            .by_reference(reference)
            .and_then(|id| self.lifecycle.get(id).ok())
    }

    #[must_use]
    pub fn intent(&self, reference: &str) -> Option<&PaymentIntent> {
        self.intents.get(reference)
    }

    #[must_use]
    pub fn wallet_balance(&self, user: UserId) -> Minor {
        self.ledger.balance(user)
    }

    pub fn ledger_entries_for(&self, user: UserId) -> impl Iterator<Item = &WalletLedgerEntry> {
        self.ledger.entries_for(user)
    }

    pub fn events_for(&self, id: OrderId) -> impl Iterator<Item = &OrderEvent> {
        self.lifecycle.audit.events_for(id)
    }

    #[must_use]
    pub fn job_runs(&self) -> &[JobRun] {
        self.lifecycle.audit.job_runs()
    }

    #[must_use]
    pub fn webhook_event(&self, provider: &str, event_id: &str) -> Option<&WebhookEvent> {
        self.webhooks.get(provider, event_id)
    }

    #[must_use]
    pub fn audit(&self) -> &AuditTrail {
        &self.lifecycle.audit
    }

    #[must_use]
    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }
}
