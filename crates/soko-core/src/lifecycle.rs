//! Order lifecycle controller: the single authority for legal order
//! transitions.
//!
//! Owns the order store and the audit trail, and drives the escrow engine
//! and ledger through explicit preconditions. Nothing else mutates an
//! order's status.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use soko_commission::{classify_seller, merchant_sale_charge, RateCard};
use soko_ledger::WalletLedger;
use soko_types::{
    Availability, FulfillmentMode, InspectionOutcome, ListingId, Minor, Order, OrderId,
    OrderStatus, ReleaseCondition, Result, SaleKind, SettlementConfig, SokoError, UnlockStep,
    UserId,
};

use crate::audit::AuditTrail;
use crate::collab::{ListingDirectory, Notifier, NotifyChannel};
use crate::escrow::{Escrow, EscrowOutcome};
use crate::unlock::UnlockManager;

pub struct OrderLifecycle {
    orders: HashMap<OrderId, Order>,
    by_reference: HashMap<String, OrderId>,
    pub audit: AuditTrail,
}

impl Default for OrderLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderLifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            orders: HashMap::new(),
            by_reference: HashMap::new(),
            audit: AuditTrail::new(),
        }
    }

    /// Create an order against an active listing.
    ///
    /// Merchant sellers get the platform markup added on top of the base
    /// price; individual sellers list at base price.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &mut self,
        buyer: UserId,
        listing_id: ListingId,
        listings: &dyn ListingDirectory,
        payment_reference: &str,
        delivery_fee: Minor,
        inspection_fee: Minor,
        inspection_required: bool,
        card: &RateCard,
        now: DateTime<Utc>,
    ) -> Result<OrderId> {
        let info = listings
            .listing(listing_id)
            .ok_or(SokoError::ListingUnavailable(listing_id))?;
        if !info.active {
            return Err(SokoError::ListingUnavailable(listing_id));
        }
        if info.owner == buyer {
            return Err(SokoError::SellerCannotBuyOwnListing);
        }
        if payment_reference.is_empty() {
            return Err(SokoError::InvalidOrder {
                reason: "payment reference required".to_string(),
            });
        }
        if self.by_reference.contains_key(payment_reference) {
            return Err(SokoError::PaymentReferenceInUse {
                reference: payment_reference.to_string(),
            });
        }

        let seller_tier = classify_seller(info.seller_role);
        let sale_charge = merchant_sale_charge(info.price, info.sale_kind, seller_tier, card);
        let total = sale_charge
            .checked_add(delivery_fee)
            .and_then(|t| t.checked_add(inspection_fee))
            .ok_or(SokoError::InvalidAmount {
                reason: "order total overflows minor units".to_string(),
            })?;

        let order = Order {
            id: OrderId::new(),
            buyer,
            seller: info.owner,
            courier: None,
            inspector: None,
            listing: listing_id,
            sale_kind: info.sale_kind,
            seller_tier,
            top_tier_seller: info.top_tier_seller,
            base_amount: info.price,
            sale_charge,
            delivery_fee,
            inspection_fee,
            total,
            payment_reference: Some(payment_reference.to_string()),
            status: OrderStatus::Created,
            escrow_status: soko_types::EscrowStatus::None,
            hold_amount: Minor::ZERO,
            held_at: None,
            release_condition: if inspection_required {
                ReleaseCondition::InspectionPass
            } else {
                ReleaseCondition::Timeout
            },
            inspection_outcome: InspectionOutcome::None,
            inspection_required,
            fulfillment_mode: FulfillmentMode::Unselected,
            availability: Availability::NotRequested,
            commission: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
        };
        let id = order.id;
        self.by_reference.insert(payment_reference.to_string(), id);
        self.orders.insert(id, order);
        self.audit.record(
            id,
            "order_created",
            buyer,
            serde_json::json!({ "listing": listing_id, "total": total }),
            now,
        );
        tracing::info!(order = %id, total = total.0, "order created");
        Ok(id)
    }

    pub fn get(&self, id: OrderId) -> Result<&Order> {
        self.orders.get(&id).ok_or(SokoError::OrderNotFound(id))
    }

    #[must_use]
    pub fn by_reference(&self, reference: &str) -> Option<OrderId> {
        self.by_reference.get(reference).copied()
    }

    /// Mark an order paid, hold its funds, and open the seller's
    /// availability challenge. Idempotent for the bound reference.
    pub fn mark_paid(
        &mut self,
        id: OrderId,
        reference: &str,
        escrow: &Escrow,
        notifier: &mut dyn Notifier,
        config: &SettlementConfig,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let order = self.orders.get_mut(&id).ok_or(SokoError::OrderNotFound(id))?;

        if order.payment_reference.as_deref() != Some(reference) {
            return Err(SokoError::Validation {
                reason: "payment reference does not match order".to_string(),
            });
        }
        if order.paid_at.is_some() {
            tracing::debug!(order = %id, "mark_paid replay ignored");
            return Ok(());
        }
        if !order.status.can_transition_to(OrderStatus::Paid) {
            return Err(SokoError::InvalidOrderTransition {
                from: order.status,
                to: OrderStatus::Paid,
            });
        }

        order.status = OrderStatus::Paid;
        order.paid_at = Some(now);
        // Shortlet stays release on the guest's explicit confirmation;
        // goods release on inspection or timeout.
        order.release_condition = if order.inspection_required {
            ReleaseCondition::InspectionPass
        } else if order.sale_kind == SaleKind::Shortlet {
            ReleaseCondition::BuyerConfirm
        } else {
            ReleaseCondition::Timeout
        };
        escrow.hold(order, now)?;
        order.availability = Availability::Pending {
            deadline: now + Duration::hours(config.availability_window_hours),
        };
        order.updated_at = now;

        notifier.notify(
            order.seller,
            NotifyChannel::Push,
            "Order paid",
            &format!(
                "Order {id} is paid. Confirm availability within {} hours.",
                config.availability_window_hours
            ),
        );
        self.audit.record(
            id,
            "order_paid",
            order.buyer,
            serde_json::json!({ "reference": reference, "hold": order.hold_amount }),
            now,
        );
        Ok(())
    }

    /// Seller confirms the item is available.
    pub fn confirm_availability(
        &mut self,
        id: OrderId,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let order = self.orders.get_mut(&id).ok_or(SokoError::OrderNotFound(id))?;
        if actor != order.seller {
            return Err(SokoError::Forbidden {
                reason: "only the seller answers the availability challenge".to_string(),
            });
        }
        match order.availability {
            Availability::Confirmed => Ok(()),
            Availability::Pending { .. } if order.availability.is_expired(now) => {
                Err(SokoError::AvailabilityChallengeExpired)
            }
            Availability::Pending { .. } => {
                order.availability = Availability::Confirmed;
                order.updated_at = now;
                self.audit.record(
                    id,
                    "availability_confirmed",
                    actor,
                    serde_json::json!({}),
                    now,
                );
                Ok(())
            }
            Availability::NotRequested | Availability::Denied => {
                Err(SokoError::OrderPreconditionFailed {
                    reason: "no availability challenge is open".to_string(),
                })
            }
        }
    }

    /// Seller denies availability: the order cancels and escrow refunds.
    pub fn deny_availability(
        &mut self,
        id: OrderId,
        actor: UserId,
        escrow: &Escrow,
        ledger: &mut WalletLedger,
        notifier: &mut dyn Notifier,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let order = self.orders.get_mut(&id).ok_or(SokoError::OrderNotFound(id))?;
        if actor != order.seller {
            return Err(SokoError::Forbidden {
                reason: "only the seller answers the availability challenge".to_string(),
            });
        }
        match order.availability {
            Availability::Denied => return Ok(()),
            Availability::Pending { .. } => {}
            Availability::NotRequested | Availability::Confirmed => {
                return Err(SokoError::OrderPreconditionFailed {
                    reason: "no availability challenge is open".to_string(),
                });
            }
        }

        order.availability = Availability::Denied;
        order.status = OrderStatus::Cancelled;
        order.updated_at = now;
        escrow.refund(order, ledger, &mut self.audit, now)?;
        notifier.notify(
            order.buyer,
            NotifyChannel::Push,
            "Order cancelled",
            &format!("The seller cannot fulfil order {id}. Your payment was refunded."),
        );
        self.audit.record(
            id,
            "availability_denied",
            actor,
            serde_json::json!({}),
            now,
        );
        Ok(())
    }

    /// Buyer selects how the goods change hands. Requires a confirmed
    /// availability challenge.
    pub fn set_fulfillment_mode(
        &mut self,
        id: OrderId,
        mode: FulfillmentMode,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let order = self.orders.get_mut(&id).ok_or(SokoError::OrderNotFound(id))?;
        if !order.availability.is_confirmed() {
            return Err(SokoError::AvailabilityNotConfirmed);
        }
        if order.status.is_closed() {
            return Err(SokoError::OrderPreconditionFailed {
                reason: format!("order is {}", order.status),
            });
        }
        if mode == FulfillmentMode::Inspection {
            order.inspection_required = true;
            order.release_condition = ReleaseCondition::InspectionPass;
        }
        order.fulfillment_mode = mode;
        order.updated_at = now;
        Ok(())
    }

    /// Merchant acknowledges the order and commits to fulfil it.
    pub fn merchant_accept(&mut self, id: OrderId, actor: UserId, now: DateTime<Utc>) -> Result<()> {
        let order = self.orders.get_mut(&id).ok_or(SokoError::OrderNotFound(id))?;
        if actor != order.seller {
            return Err(SokoError::Forbidden {
                reason: "only the seller accepts an order".to_string(),
            });
        }
        if !order.availability.is_confirmed() {
            return Err(SokoError::AvailabilityNotConfirmed);
        }
        Self::advance(order, OrderStatus::MerchantAccepted, now)?;
        self.audit
            .record(id, "merchant_accepted", actor, serde_json::json!({}), now);
        Ok(())
    }

    pub fn assign_courier(
        &mut self,
        id: OrderId,
        courier: UserId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let order = self.orders.get_mut(&id).ok_or(SokoError::OrderNotFound(id))?;
        if courier == order.buyer || courier == order.seller {
            return Err(SokoError::Validation {
                reason: "courier must be a third party".to_string(),
            });
        }
        Self::advance(order, OrderStatus::DriverAssigned, now)?;
        order.courier = Some(courier);
        self.audit.record(
            id,
            "courier_assigned",
            courier,
            serde_json::json!({}),
            now,
        );
        Ok(())
    }

    pub fn assign_inspector(
        &mut self,
        id: OrderId,
        inspector: UserId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let order = self.orders.get_mut(&id).ok_or(SokoError::OrderNotFound(id))?;
        if !order.inspection_required {
            return Err(SokoError::OrderPreconditionFailed {
                reason: "order does not require inspection".to_string(),
            });
        }
        order.inspector = Some(inspector);
        order.updated_at = now;
        Ok(())
    }

    /// Courier progress updates, gated by the handoff unlocks.
    pub fn driver_status(
        &mut self,
        id: OrderId,
        target: OrderStatus,
        unlocks: &UnlockManager,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let order = self.orders.get_mut(&id).ok_or(SokoError::OrderNotFound(id))?;
        match target {
            OrderStatus::PickedUp => {
                if !unlocks.is_unlocked(id, UnlockStep::PickupSeller) {
                    return Err(SokoError::OrderPreconditionFailed {
                        reason: "pickup handoff not unlocked".to_string(),
                    });
                }
            }
            OrderStatus::Delivered => {
                if !unlocks.is_unlocked(id, UnlockStep::DeliveryDriver) {
                    return Err(SokoError::OrderPreconditionFailed {
                        reason: "delivery handoff not unlocked".to_string(),
                    });
                }
            }
            OrderStatus::Completed => {}
            other => {
                return Err(SokoError::Validation {
                    reason: format!("{other} is not a driver status"),
                });
            }
        }
        Self::advance(order, target, now)?;
        self.audit.record(
            id,
            &format!("driver_{}", target.to_string().to_lowercase()),
            order.courier.unwrap_or(order.seller),
            serde_json::json!({}),
            now,
        );
        Ok(())
    }

    /// Record the inspector's verdict. An external signal; settlement
    /// consequences are drawn by the automation runner.
    pub fn record_inspection(
        &mut self,
        id: OrderId,
        outcome: InspectionOutcome,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let order = self.orders.get_mut(&id).ok_or(SokoError::OrderNotFound(id))?;
        if !order.inspection_required {
            return Err(SokoError::OrderPreconditionFailed {
                reason: "order does not require inspection".to_string(),
            });
        }
        order.inspection_outcome = outcome;
        order.updated_at = now;
        self.audit.record(
            id,
            "inspection_recorded",
            actor,
            serde_json::json!({ "outcome": outcome }),
            now,
        );
        Ok(())
    }

    /// Explicit buyer receipt confirmation for BUYER_CONFIRM escrows.
    pub fn buyer_confirm_release(
        &mut self,
        id: OrderId,
        actor: UserId,
        escrow: &Escrow,
        ledger: &mut WalletLedger,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let order = self.orders.get_mut(&id).ok_or(SokoError::OrderNotFound(id))?;
        if actor != order.buyer {
            return Err(SokoError::Forbidden {
                reason: "only the buyer confirms receipt".to_string(),
            });
        }
        if order.release_condition != ReleaseCondition::BuyerConfirm {
            return Err(SokoError::OrderPreconditionFailed {
                reason: format!("release condition is {}", order.release_condition),
            });
        }
        escrow.release(order, ledger, &mut self.audit, now)?;
        if order.status.can_transition_to(OrderStatus::Completed) {
            order.status = OrderStatus::Completed;
            order.updated_at = now;
        }
        Ok(())
    }

    /// Cancel an order; held funds refund to the buyer.
    pub fn cancel(
        &mut self,
        id: OrderId,
        actor: UserId,
        reason: &str,
        escrow: &Escrow,
        ledger: &mut WalletLedger,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let order = self.orders.get_mut(&id).ok_or(SokoError::OrderNotFound(id))?;
        if order.status == OrderStatus::Cancelled {
            return Ok(());
        }
        Self::advance(order, OrderStatus::Cancelled, now)?;
        if order.is_held() {
            escrow.refund(order, ledger, &mut self.audit, now)?;
        }
        self.audit.record(
            id,
            "order_cancelled",
            actor,
            serde_json::json!({ "reason": reason }),
            now,
        );
        Ok(())
    }

    // -----------------------------------------------------------------
    // escrow pass-throughs (runner and facade entry points)
    // -----------------------------------------------------------------

    pub fn settle_sale_leg(
        &mut self,
        id: OrderId,
        escrow: &Escrow,
        ledger: &mut WalletLedger,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let order = self.orders.get_mut(&id).ok_or(SokoError::OrderNotFound(id))?;
        escrow.settle_sale_leg(order, ledger, now)
    }

    pub fn release_escrow(
        &mut self,
        id: OrderId,
        escrow: &Escrow,
        ledger: &mut WalletLedger,
        now: DateTime<Utc>,
    ) -> Result<EscrowOutcome> {
        let order = self.orders.get_mut(&id).ok_or(SokoError::OrderNotFound(id))?;
        escrow.release(order, ledger, &mut self.audit, now)
    }

    pub fn refund_escrow(
        &mut self,
        id: OrderId,
        escrow: &Escrow,
        ledger: &mut WalletLedger,
        now: DateTime<Utc>,
    ) -> Result<EscrowOutcome> {
        let order = self.orders.get_mut(&id).ok_or(SokoError::OrderNotFound(id))?;
        escrow.refund(order, ledger, &mut self.audit, now)
    }

    pub fn refund_after_inspection(
        &mut self,
        id: OrderId,
        escrow: &Escrow,
        ledger: &mut WalletLedger,
        now: DateTime<Utc>,
    ) -> Result<EscrowOutcome> {
        let order = self.orders.get_mut(&id).ok_or(SokoError::OrderNotFound(id))?;
        escrow.refund_after_inspection(order, ledger, &mut self.audit, now)
    }

    pub fn dispute_escrow(
        &mut self,
        id: OrderId,
        reason: &str,
        escrow: &Escrow,
        now: DateTime<Utc>,
    ) -> Result<EscrowOutcome> {
        let order = self.orders.get_mut(&id).ok_or(SokoError::OrderNotFound(id))?;
        escrow.dispute(order, &mut self.audit, reason, now)
    }

    pub fn resolve_dispute(
        &mut self,
        id: OrderId,
        refund_buyer: bool,
        escrow: &Escrow,
        ledger: &mut WalletLedger,
        now: DateTime<Utc>,
    ) -> Result<EscrowOutcome> {
        let order = self.orders.get_mut(&id).ok_or(SokoError::OrderNotFound(id))?;
        escrow.resolve_dispute(order, refund_buyer, ledger, &mut self.audit, now)
    }

    /// Orders currently holding escrow, oldest first, bounded.
    #[must_use]
    pub fn held_order_ids(&self, limit: usize) -> Vec<OrderId> {
        let mut ids: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| o.is_held())
            .map(|o| o.id)
            .collect();
        ids.sort_unstable();
        ids.truncate(limit);
        ids
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    fn advance(order: &mut Order, target: OrderStatus, now: DateTime<Utc>) -> Result<()> {
        if !order.status.can_transition_to(target) {
            return Err(SokoError::InvalidOrderTransition {
                from: order.status,
                to: target,
            });
        }
        order.status = target;
        order.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{InMemoryListings, ListingInfo, RecordingNotifier};
    use soko_commission::AccountRole;
    use soko_types::SaleKind;

    struct Fixture {
        lifecycle: OrderLifecycle,
        listings: InMemoryListings,
        escrow: Escrow,
        ledger: WalletLedger,
        notifier: RecordingNotifier,
        config: SettlementConfig,
        listing_id: ListingId,
        seller: UserId,
        buyer: UserId,
    }

    fn fixture() -> Fixture {
        let seller = UserId::new();
        let listing_id = ListingId::new();
        let mut listings = InMemoryListings::new();
        listings.insert(
            listing_id,
            ListingInfo {
                owner: seller,
                active: true,
                price: Minor(1_000_000),
                sale_kind: SaleKind::Declutter,
                seller_role: AccountRole::Merchant,
                top_tier_seller: false,
            },
        );
        let platform = UserId::new();
        Fixture {
            lifecycle: OrderLifecycle::new(),
            listings,
            escrow: Escrow::new(platform, RateCard::default()),
            ledger: WalletLedger::new(),
            notifier: RecordingNotifier::new(),
            config: SettlementConfig::new(platform),
            listing_id,
            seller,
            buyer: UserId::new(),
        }
    }

    fn create_order(fx: &mut Fixture, reference: &str) -> OrderId {
        fx.lifecycle
            .create(
                fx.buyer,
                fx.listing_id,
                &fx.listings,
                reference,
                Minor(150_000),
                Minor::ZERO,
                false,
                fx.escrow.card(),
                Utc::now(),
            )
            .unwrap()
    }

    #[test]
    fn create_applies_merchant_markup() {
        let mut fx = fixture();
        let id = create_order(&mut fx, "SOKO-CREATE-1");
        let order = fx.lifecycle.get(id).unwrap();
        assert_eq!(order.base_amount, Minor(1_000_000));
        assert_eq!(order.sale_charge, Minor(1_050_000));
        assert_eq!(order.total, Minor(1_200_000));
        assert_eq!(order.status, OrderStatus::Created);
    }

    #[test]
    fn create_rejects_self_purchase_and_reused_reference() {
        let mut fx = fixture();
        let err = fx
            .lifecycle
            .create(
                fx.seller,
                fx.listing_id,
                &fx.listings,
                "SOKO-SELF",
                Minor::ZERO,
                Minor::ZERO,
                false,
                fx.escrow.card(),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, SokoError::SellerCannotBuyOwnListing));

        create_order(&mut fx, "SOKO-DUP");
        let err = fx
            .lifecycle
            .create(
                fx.buyer,
                fx.listing_id,
                &fx.listings,
                "SOKO-DUP",
                Minor::ZERO,
                Minor::ZERO,
                false,
                fx.escrow.card(),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, SokoError::PaymentReferenceInUse { .. }));
    }

    #[test]
    fn create_rejects_fee_that_overflows_total() {
        let mut fx = fixture();
        let err = fx
            .lifecycle
            .create(
                fx.buyer,
                fx.listing_id,
                &fx.listings,
                "SOKO-OVERFLOW",
                Minor(u64::MAX),
                Minor::ZERO,
                false,
                fx.escrow.card(),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, SokoError::InvalidAmount { .. }));
        assert!(fx.lifecycle.by_reference("SOKO-OVERFLOW").is_none());
    }

    #[test]
    fn mark_paid_holds_escrow_and_challenges_seller() {
        let mut fx = fixture();
        let id = create_order(&mut fx, "SOKO-PAY-1");
        let now = Utc::now();
        fx.lifecycle
            .mark_paid(id, "SOKO-PAY-1", &fx.escrow, &mut fx.notifier, &fx.config, now)
            .unwrap();

        let order = fx.lifecycle.get(id).unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert!(order.is_held());
        assert_eq!(order.hold_amount, Minor(1_200_000));
        assert!(order.commission.is_some());
        assert!(matches!(order.availability, Availability::Pending { .. }));
        assert_eq!(fx.notifier.sent.len(), 1);
        assert_eq!(fx.notifier.sent[0].user, fx.seller);
    }

    #[test]
    fn mark_paid_twice_equals_once() {
        let mut fx = fixture();
        let id = create_order(&mut fx, "SOKO-PAY-2");
        let now = Utc::now();
        fx.lifecycle
            .mark_paid(id, "SOKO-PAY-2", &fx.escrow, &mut fx.notifier, &fx.config, now)
            .unwrap();
        let snapshot = fx.lifecycle.get(id).unwrap().commission;
        let events = fx.lifecycle.audit.events().len();

        fx.lifecycle
            .mark_paid(id, "SOKO-PAY-2", &fx.escrow, &mut fx.notifier, &fx.config, now)
            .unwrap();
        let order = fx.lifecycle.get(id).unwrap();
        assert_eq!(order.commission, snapshot);
        assert_eq!(fx.lifecycle.audit.events().len(), events);
        assert_eq!(fx.notifier.sent.len(), 1);
    }

    #[test]
    fn availability_deny_cancels_and_refunds() {
        let mut fx = fixture();
        let id = create_order(&mut fx, "SOKO-DENY");
        let now = Utc::now();
        fx.lifecycle
            .mark_paid(id, "SOKO-DENY", &fx.escrow, &mut fx.notifier, &fx.config, now)
            .unwrap();
        fx.lifecycle
            .deny_availability(id, fx.seller, &fx.escrow, &mut fx.ledger, &mut fx.notifier, now)
            .unwrap();

        let order = fx.lifecycle.get(id).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.escrow_status, soko_types::EscrowStatus::Refunded);
        assert_eq!(fx.ledger.balance(fx.buyer), Minor(1_200_000));
    }

    #[test]
    fn availability_challenge_expires() {
        let mut fx = fixture();
        let id = create_order(&mut fx, "SOKO-LATE");
        let now = Utc::now();
        fx.lifecycle
            .mark_paid(id, "SOKO-LATE", &fx.escrow, &mut fx.notifier, &fx.config, now)
            .unwrap();
        let late = now + Duration::hours(fx.config.availability_window_hours + 1);
        let err = fx
            .lifecycle
            .confirm_availability(id, fx.seller, late)
            .unwrap_err();
        assert!(matches!(err, SokoError::AvailabilityChallengeExpired));
    }

    #[test]
    fn fulfillment_mode_requires_confirmed_availability() {
        let mut fx = fixture();
        let id = create_order(&mut fx, "SOKO-MODE");
        let now = Utc::now();
        fx.lifecycle
            .mark_paid(id, "SOKO-MODE", &fx.escrow, &mut fx.notifier, &fx.config, now)
            .unwrap();

        let err = fx
            .lifecycle
            .set_fulfillment_mode(id, FulfillmentMode::Delivery, now)
            .unwrap_err();
        assert!(matches!(err, SokoError::AvailabilityNotConfirmed));

        fx.lifecycle.confirm_availability(id, fx.seller, now).unwrap();
        fx.lifecycle
            .set_fulfillment_mode(id, FulfillmentMode::Delivery, now)
            .unwrap();
        assert_eq!(
            fx.lifecycle.get(id).unwrap().fulfillment_mode,
            FulfillmentMode::Delivery
        );
    }

    #[test]
    fn inspection_mode_forces_inspection_release() {
        let mut fx = fixture();
        let id = create_order(&mut fx, "SOKO-INSPECT");
        let now = Utc::now();
        fx.lifecycle
            .mark_paid(id, "SOKO-INSPECT", &fx.escrow, &mut fx.notifier, &fx.config, now)
            .unwrap();
        fx.lifecycle.confirm_availability(id, fx.seller, now).unwrap();
        fx.lifecycle
            .set_fulfillment_mode(id, FulfillmentMode::Inspection, now)
            .unwrap();

        let order = fx.lifecycle.get(id).unwrap();
        assert!(order.inspection_required);
        assert_eq!(order.release_condition, ReleaseCondition::InspectionPass);
    }

    #[test]
    fn driver_status_gated_by_unlocks() {
        let mut fx = fixture();
        let id = create_order(&mut fx, "SOKO-DRIVE");
        let now = Utc::now();
        fx.lifecycle
            .mark_paid(id, "SOKO-DRIVE", &fx.escrow, &mut fx.notifier, &fx.config, now)
            .unwrap();
        fx.lifecycle.confirm_availability(id, fx.seller, now).unwrap();
        fx.lifecycle.merchant_accept(id, fx.seller, now).unwrap();
        fx.lifecycle.assign_courier(id, UserId::new(), now).unwrap();

        let unlocks = UnlockManager::new();
        let err = fx
            .lifecycle
            .driver_status(id, OrderStatus::PickedUp, &unlocks, now)
            .unwrap_err();
        assert!(matches!(err, SokoError::OrderPreconditionFailed { .. }));
    }

    #[test]
    fn merchant_accept_requires_availability() {
        let mut fx = fixture();
        let id = create_order(&mut fx, "SOKO-ACCEPT");
        let now = Utc::now();
        fx.lifecycle
            .mark_paid(id, "SOKO-ACCEPT", &fx.escrow, &mut fx.notifier, &fx.config, now)
            .unwrap();
        let err = fx.lifecycle.merchant_accept(id, fx.seller, now).unwrap_err();
        assert!(matches!(err, SokoError::AvailabilityNotConfirmed));
    }

    #[test]
    fn cancel_refunds_held_escrow() {
        let mut fx = fixture();
        let id = create_order(&mut fx, "SOKO-CXL");
        let now = Utc::now();
        fx.lifecycle
            .mark_paid(id, "SOKO-CXL", &fx.escrow, &mut fx.notifier, &fx.config, now)
            .unwrap();
        fx.lifecycle
            .cancel(id, fx.buyer, "changed my mind", &fx.escrow, &mut fx.ledger, now)
            .unwrap();
        let order = fx.lifecycle.get(id).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(fx.ledger.balance(fx.buyer), Minor(1_200_000));

        // Idempotent.
        fx.lifecycle
            .cancel(id, fx.buyer, "again", &fx.escrow, &mut fx.ledger, now)
            .unwrap();
        assert_eq!(fx.ledger.balance(fx.buyer), Minor(1_200_000));
    }

    #[test]
    fn held_order_ids_bounded_and_sorted() {
        let mut fx = fixture();
        for i in 0..5 {
            let id = create_order(&mut fx, &format!("SOKO-HELD-{i}"));
            fx.lifecycle
                .mark_paid(id, &format!("SOKO-HELD-{i}"), &fx.escrow, &mut fx.notifier, &fx.config, Utc::now())
                .unwrap();
        }
        assert_eq!(fx.lifecycle.held_order_ids(3).len(), 3);
        assert_eq!(fx.lifecycle.held_order_ids(100).len(), 5);
    }
}
