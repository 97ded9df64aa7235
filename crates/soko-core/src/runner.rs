//! Escrow automation runner.
//!
//! One sweep walks every held escrow (bounded) and applies the resolution
//! rules; a row failure is collected, never fatal to the sweep. Timeouts
//! are evaluated against the `now` passed in — the runner owns no clock
//! and no timers.

use chrono::{DateTime, Duration, Utc};

use soko_ledger::WalletLedger;
use soko_types::{
    InspectionOutcome, JobRun, OrderId, ReleaseCondition, Result, SettlementConfig, SokoError,
    UnlockStep,
};

use crate::collab::FeatureFlags;
use crate::escrow::Escrow;
use crate::lifecycle::OrderLifecycle;
use crate::unlock::UnlockManager;

/// Tally of one sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepSummary {
    pub processed: usize,
    pub released: usize,
    pub refunded: usize,
    pub disputed: usize,
    pub skipped: usize,
    pub errors: usize,
}

enum Action {
    Dispute(&'static str),
    SettleInspectionAndRefund,
    Release,
    Skip,
}

/// The runner. Holds only the run guard; all state is borrowed per sweep.
#[derive(Debug, Default)]
pub struct EscrowRunner {
    running: bool,
}

impl EscrowRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every held escrow that is due, up to the configured limit.
    #[allow(clippy::too_many_arguments)]
    pub fn sweep(
        &mut self,
        lifecycle: &mut OrderLifecycle,
        unlocks: &UnlockManager,
        escrow: &Escrow,
        ledger: &mut WalletLedger,
        flags: &dyn FeatureFlags,
        config: &SettlementConfig,
        now: DateTime<Utc>,
    ) -> Result<SweepSummary> {
        if !flags.automation_enabled() {
            return Err(SokoError::AutomationDisabled);
        }
        if self.running {
            return Err(SokoError::SweepAlreadyRunning);
        }
        self.running = true;
        let started_at = now;

        let mut summary = SweepSummary::default();
        for id in lifecycle.held_order_ids(config.sweep_limit) {
            summary.processed += 1;
            match Self::resolve_one(id, lifecycle, unlocks, escrow, ledger, config, now) {
                Ok(action) => match action {
                    Action::Release => summary.released += 1,
                    Action::SettleInspectionAndRefund => summary.refunded += 1,
                    Action::Dispute(_) => summary.disputed += 1,
                    Action::Skip => summary.skipped += 1,
                },
                Err(e) => {
                    summary.errors += 1;
                    tracing::error!(order = %id, error = %e, "sweep row failed");
                }
            }
        }

        lifecycle.audit.record_job_run(JobRun {
            started_at,
            finished_at: now,
            processed: summary.processed,
            released: summary.released,
            refunded: summary.refunded,
            disputed: summary.disputed,
            skipped: summary.skipped,
            errors: summary.errors,
            ok: summary.errors == 0,
        });
        tracing::info!(
            processed = summary.processed,
            released = summary.released,
            refunded = summary.refunded,
            disputed = summary.disputed,
            skipped = summary.skipped,
            errors = summary.errors,
            "escrow sweep finished"
        );
        self.running = false;
        Ok(summary)
    }

    fn resolve_one(
        id: OrderId,
        lifecycle: &mut OrderLifecycle,
        unlocks: &UnlockManager,
        escrow: &Escrow,
        ledger: &mut WalletLedger,
        config: &SettlementConfig,
        now: DateTime<Utc>,
    ) -> Result<Action> {
        let action = {
            let order = lifecycle.get(id)?;

            // Funds still held after handoff finished is an invariant
            // violation: the delivery confirmation should have released.
            if order.status.is_fulfillment_terminal() {
                Action::Dispute("fulfillment terminal while escrow held")
            } else if order.inspection_outcome.is_adverse() {
                Action::SettleInspectionAndRefund
            } else {
                match order.release_condition {
                    ReleaseCondition::InspectionPass => {
                        if order.inspection_outcome == InspectionOutcome::Pass
                            && unlocks.is_unlocked(id, UnlockStep::InspectionInspector)
                        {
                            Action::Release
                        } else {
                            Action::Skip
                        }
                    }
                    ReleaseCondition::Timeout => {
                        let due = order.held_at.is_some_and(|held| {
                            now >= held + Duration::hours(config.escrow_timeout_hours)
                        });
                        if due { Action::Release } else { Action::Skip }
                    }
                    // Explicit human action only.
                    ReleaseCondition::BuyerConfirm | ReleaseCondition::Admin => Action::Skip,
                }
            }
        };

        match action {
            Action::Dispute(reason) => {
                lifecycle.dispute_escrow(id, reason, escrow, now)?;
            }
            Action::SettleInspectionAndRefund => {
                lifecycle.refund_after_inspection(id, escrow, ledger, now)?;
            }
            Action::Release => {
                lifecycle.release_escrow(id, escrow, ledger, now)?;
            }
            Action::Skip => {}
        }
        Ok(action)
    }
}
