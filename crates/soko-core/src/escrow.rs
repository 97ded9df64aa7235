//! Escrow state machine.
//!
//! ```text
//!   NONE ──hold──▶ HELD ──┬─▶ RELEASED   (terminal)
//!                         ├─▶ REFUNDED   (terminal)
//!                         └─▶ DISPUTED ──▶ RELEASED | REFUNDED
//! ```
//!
//! Every transition is idempotent: re-triggering an operation whose end
//! state already holds is a no-op, and the ledger's (user, kind, reference)
//! discipline guarantees a re-run can never double-credit even if the
//! escrow status check were bypassed.
//!
//! The commission snapshot is frozen exactly once, when funds enter HELD.
//! Rate card changes after that point cannot alter a held order's split.

use chrono::{DateTime, Utc};

use soko_commission::{compute_snapshot, RateCard, SnapshotInputs};
use soko_ledger::WalletLedger;
use soko_types::{
    EntryDirection, EntryKind, EscrowStatus, Minor, Order, Result, SokoError, UserId,
};

use crate::audit::AuditTrail;

/// Whether an escrow operation changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowOutcome {
    Applied,
    /// The end state already held; nothing changed.
    AlreadyApplied,
}

/// The escrow engine. Holds the rate card and the platform treasury
/// account; all order and ledger state is passed in by the caller.
pub struct Escrow {
    platform_account: UserId,
    card: RateCard,
}

impl Escrow {
    #[must_use]
    pub fn new(platform_account: UserId, card: RateCard) -> Self {
        Self {
            platform_account,
            card,
        }
    }

    #[must_use]
    pub fn card(&self) -> &RateCard {
        &self.card
    }

    #[must_use]
    pub fn platform_account(&self) -> UserId {
        self.platform_account
    }

    /// Move funds into escrow and freeze the commission snapshot.
    pub fn hold(&self, order: &mut Order, now: DateTime<Utc>) -> Result<EscrowOutcome> {
        match order.escrow_status {
            EscrowStatus::Held => return Ok(EscrowOutcome::AlreadyApplied),
            EscrowStatus::None => {}
            status => return Err(SokoError::EscrowTerminal { status }),
        }

        if order.commission.is_none() {
            order.commission = Some(compute_snapshot(
                &SnapshotInputs {
                    sale_kind: order.sale_kind,
                    seller_tier: order.seller_tier,
                    top_tier_seller: order.top_tier_seller,
                    sale_charge: order.sale_charge,
                    delivery_fee: order.delivery_fee,
                    inspection_fee: order.inspection_fee,
                },
                &self.card,
            ));
        }

        order.hold_amount = order.escrowable_total();
        order.escrow_status = EscrowStatus::Held;
        order.held_at = Some(now);
        order.updated_at = now;
        tracing::info!(order = %order.id, amount = order.hold_amount.0, "escrow held");
        Ok(EscrowOutcome::Applied)
    }

    /// Credit the sale leg (seller, incentive, platform) without touching
    /// escrow status. Used when the pickup handoff unlocks before the
    /// courier leg completes; the later full release skips these entries
    /// through the ledger's reference discipline.
    pub fn settle_sale_leg(
        &self,
        order: &Order,
        ledger: &mut WalletLedger,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if order.escrow_status != EscrowStatus::Held {
            return Err(SokoError::EscrowNotHeld {
                status: order.escrow_status,
            });
        }
        self.post_sale_leg(order, ledger, now)
    }

    /// Release held funds to all parties per the frozen snapshot.
    pub fn release(
        &self,
        order: &mut Order,
        ledger: &mut WalletLedger,
        audit: &mut AuditTrail,
        now: DateTime<Utc>,
    ) -> Result<EscrowOutcome> {
        match order.escrow_status {
            EscrowStatus::Released => return Ok(EscrowOutcome::AlreadyApplied),
            EscrowStatus::Held => {}
            status => {
                return Err(SokoError::EscrowNotHeld { status });
            }
        }
        self.finalize_release(order, ledger, audit, now)?;
        Ok(EscrowOutcome::Applied)
    }

    /// Refund the full hold amount to the buyer.
    pub fn refund(
        &self,
        order: &mut Order,
        ledger: &mut WalletLedger,
        audit: &mut AuditTrail,
        now: DateTime<Utc>,
    ) -> Result<EscrowOutcome> {
        match order.escrow_status {
            EscrowStatus::Refunded => return Ok(EscrowOutcome::AlreadyApplied),
            EscrowStatus::Held => {}
            status => {
                return Err(SokoError::EscrowNotHeld { status });
            }
        }
        self.finalize_refund(order, order.hold_amount, ledger, audit, now)?;
        Ok(EscrowOutcome::Applied)
    }

    /// Adverse inspection path: the inspection leg settles (the inspection
    /// happened and is owed) and the buyer gets the remainder back.
    pub fn refund_after_inspection(
        &self,
        order: &mut Order,
        ledger: &mut WalletLedger,
        audit: &mut AuditTrail,
        now: DateTime<Utc>,
    ) -> Result<EscrowOutcome> {
        match order.escrow_status {
            EscrowStatus::Refunded => return Ok(EscrowOutcome::AlreadyApplied),
            EscrowStatus::Held => {}
            status => {
                return Err(SokoError::EscrowNotHeld { status });
            }
        }
        self.post_inspection_leg(order, ledger, now)?;
        let remainder = order.hold_amount.saturating_sub(order.inspection_fee);
        self.finalize_refund(order, remainder, ledger, audit, now)?;
        Ok(EscrowOutcome::Applied)
    }

    /// Freeze a held escrow for admin attention.
    pub fn dispute(
        &self,
        order: &mut Order,
        audit: &mut AuditTrail,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<EscrowOutcome> {
        match order.escrow_status {
            EscrowStatus::Disputed => return Ok(EscrowOutcome::AlreadyApplied),
            EscrowStatus::Held => {}
            status => {
                return Err(SokoError::EscrowNotHeld { status });
            }
        }
        order.escrow_status = EscrowStatus::Disputed;
        order.updated_at = now;
        tracing::warn!(order = %order.id, reason, "escrow disputed");
        audit.record(
            order.id,
            "escrow_disputed",
            self.platform_account,
            serde_json::json!({ "reason": reason }),
            now,
        );
        Ok(EscrowOutcome::Applied)
    }

    /// Admin resolution of a disputed escrow, either direction.
    pub fn resolve_dispute(
        &self,
        order: &mut Order,
        refund_buyer: bool,
        ledger: &mut WalletLedger,
        audit: &mut AuditTrail,
        now: DateTime<Utc>,
    ) -> Result<EscrowOutcome> {
        match order.escrow_status {
            EscrowStatus::Disputed => {}
            status if status.is_terminal() => return Ok(EscrowOutcome::AlreadyApplied),
            status => {
                return Err(SokoError::EscrowNotHeld { status });
            }
        }
        if refund_buyer {
            self.finalize_refund(order, order.hold_amount, ledger, audit, now)?;
        } else {
            self.finalize_release(order, ledger, audit, now)?;
        }
        Ok(EscrowOutcome::Applied)
    }

    // -----------------------------------------------------------------
    // internals
    // -----------------------------------------------------------------

    fn finalize_release(
        &self,
        order: &mut Order,
        ledger: &mut WalletLedger,
        audit: &mut AuditTrail,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.post_sale_leg(order, ledger, now)?;
        self.post_delivery_leg(order, ledger, now)?;
        self.post_inspection_leg(order, ledger, now)?;

        order.escrow_status = EscrowStatus::Released;
        order.updated_at = now;
        tracing::info!(order = %order.id, amount = order.hold_amount.0, "escrow released");
        audit.record(
            order.id,
            "escrow_released",
            self.platform_account,
            serde_json::json!({ "amount": order.hold_amount }),
            now,
        );
        Ok(())
    }

    fn finalize_refund(
        &self,
        order: &mut Order,
        amount: Minor,
        ledger: &mut WalletLedger,
        audit: &mut AuditTrail,
        now: DateTime<Utc>,
    ) -> Result<()> {
        ledger.post(
            order.buyer,
            EntryDirection::Credit,
            amount,
            EntryKind::EscrowRefund,
            format!("order:{}:refund", order.id),
            format!("escrow refund for order {}", order.id),
            now,
        )?;
        order.escrow_status = EscrowStatus::Refunded;
        order.updated_at = now;
        tracing::info!(order = %order.id, amount = amount.0, "escrow refunded");
        audit.record(
            order.id,
            "escrow_refunded",
            self.platform_account,
            serde_json::json!({ "amount": amount }),
            now,
        );
        Ok(())
    }

    fn post_sale_leg(
        &self,
        order: &Order,
        ledger: &mut WalletLedger,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let snapshot = order
            .commission
            .ok_or(SokoError::SnapshotMissing(order.id))?;
        let reference = format!("order:{}:sale", order.id);

        if snapshot.sale.seller > Minor::ZERO {
            ledger.post(
                order.seller,
                EntryDirection::Credit,
                snapshot.sale.seller,
                EntryKind::SalePayout,
                reference.clone(),
                format!("sale payout for order {}", order.id),
                now,
            )?;
        }
        if snapshot.sale.top_tier_incentive > Minor::ZERO {
            ledger.post(
                order.seller,
                EntryDirection::Credit,
                snapshot.sale.top_tier_incentive,
                EntryKind::TopTierIncentive,
                reference.clone(),
                format!("top-tier incentive for order {}", order.id),
                now,
            )?;
        }
        if snapshot.sale.platform > Minor::ZERO {
            ledger.post(
                self.platform_account,
                EntryDirection::Credit,
                snapshot.sale.platform,
                EntryKind::PlatformCommission,
                reference,
                format!("sale commission for order {}", order.id),
                now,
            )?;
        }
        Ok(())
    }

    fn post_delivery_leg(
        &self,
        order: &Order,
        ledger: &mut WalletLedger,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let snapshot = order
            .commission
            .ok_or(SokoError::SnapshotMissing(order.id))?;
        if order.delivery_fee == Minor::ZERO {
            return Ok(());
        }
        let reference = format!("order:{}:delivery", order.id);

        // No courier assigned means no one earned the actor share; the
        // whole fee goes to the platform.
        match order.courier {
            Some(courier) if snapshot.delivery.actor > Minor::ZERO => {
                ledger.post(
                    courier,
                    EntryDirection::Credit,
                    snapshot.delivery.actor,
                    EntryKind::DeliveryPayout,
                    reference.clone(),
                    format!("delivery payout for order {}", order.id),
                    now,
                )?;
                if snapshot.delivery.platform > Minor::ZERO {
                    ledger.post(
                        self.platform_account,
                        EntryDirection::Credit,
                        snapshot.delivery.platform,
                        EntryKind::PlatformCommission,
                        reference,
                        format!("delivery commission for order {}", order.id),
                        now,
                    )?;
                }
            }
            _ => {
                ledger.post(
                    self.platform_account,
                    EntryDirection::Credit,
                    order.delivery_fee,
                    EntryKind::PlatformCommission,
                    reference,
                    format!("unassigned delivery fee for order {}", order.id),
                    now,
                )?;
            }
        }
        Ok(())
    }

    fn post_inspection_leg(
        &self,
        order: &Order,
        ledger: &mut WalletLedger,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let snapshot = order
            .commission
            .ok_or(SokoError::SnapshotMissing(order.id))?;
        if order.inspection_fee == Minor::ZERO {
            return Ok(());
        }
        let reference = format!("order:{}:inspection", order.id);

        match order.inspector {
            Some(inspector) if snapshot.inspection.actor > Minor::ZERO => {
                ledger.post(
                    inspector,
                    EntryDirection::Credit,
                    snapshot.inspection.actor,
                    EntryKind::InspectionPayout,
                    reference.clone(),
                    format!("inspection payout for order {}", order.id),
                    now,
                )?;
                if snapshot.inspection.platform > Minor::ZERO {
                    ledger.post(
                        self.platform_account,
                        EntryDirection::Credit,
                        snapshot.inspection.platform,
                        EntryKind::PlatformCommission,
                        reference,
                        format!("inspection commission for order {}", order.id),
                        now,
                    )?;
                }
            }
            _ => {
                ledger.post(
                    self.platform_account,
                    EntryDirection::Credit,
                    order.inspection_fee,
                    EntryKind::PlatformCommission,
                    reference,
                    format!("unassigned inspection fee for order {}", order.id),
                    now,
                )?;
            }
        }
        Ok(())
    }
}
