//! Order model: the settlement core's central aggregate.
//!
//! An order owns its escrow state and unlock rows. Status transitions are
//! driven exclusively by the lifecycle controller; the enums here only
//! encode which transitions are legal.
//!
//! # State Machines
//!
//! ```text
//! OrderStatus:
//!   CREATED → PAID → MERCHANT_ACCEPTED → DRIVER_ASSIGNED → PICKED_UP
//!           → DELIVERED → COMPLETED
//!   (CANCELLED / DISPUTED reachable from non-terminal states)
//!
//! EscrowStatus:
//!   NONE → HELD → { RELEASED | REFUNDED | DISPUTED }
//!   (RELEASED and REFUNDED are terminal)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::commission::{CommissionSnapshot, SaleKind, SellerTier};
use crate::ids::{ListingId, OrderId, UserId};
use crate::money::Minor;

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Paid,
    MerchantAccepted,
    DriverAssigned,
    PickedUp,
    Delivered,
    Completed,
    Cancelled,
    Disputed,
}

impl OrderStatus {
    /// Can this status legally advance to `target`?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Created, Self::Paid | Self::Cancelled)
                | (Self::Paid, Self::MerchantAccepted | Self::Cancelled | Self::Disputed)
                | (
                    Self::MerchantAccepted,
                    Self::DriverAssigned | Self::PickedUp | Self::Cancelled | Self::Disputed
                )
                | (Self::DriverAssigned, Self::PickedUp | Self::Cancelled | Self::Disputed)
                | (Self::PickedUp, Self::Delivered | Self::Completed | Self::Disputed)
                | (Self::Delivered, Self::Completed | Self::Disputed)
        )
    }

    /// Has fulfillment reached a terminal state (goods handed over)?
    #[must_use]
    pub fn is_fulfillment_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Completed)
    }

    /// Is the order finished entirely (no further transitions)?
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::Paid => write!(f, "PAID"),
            Self::MerchantAccepted => write!(f, "MERCHANT_ACCEPTED"),
            Self::DriverAssigned => write!(f, "DRIVER_ASSIGNED"),
            Self::PickedUp => write!(f, "PICKED_UP"),
            Self::Delivered => write!(f, "DELIVERED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Disputed => write!(f, "DISPUTED"),
        }
    }
}

/// Escrow status for the order's held funds.
///
/// Transitions are monotonic; RELEASED and REFUNDED never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    None,
    Held,
    Released,
    Refunded,
    Disputed,
}

impl EscrowStatus {
    /// Terminal once funds have left the platform.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released | Self::Refunded)
    }

    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::None, Self::Held)
                | (Self::Held, Self::Released | Self::Refunded | Self::Disputed)
                | (Self::Disputed, Self::Released | Self::Refunded)
        )
    }
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Held => write!(f, "HELD"),
            Self::Released => write!(f, "RELEASED"),
            Self::Refunded => write!(f, "REFUNDED"),
            Self::Disputed => write!(f, "DISPUTED"),
        }
    }
}

/// What condition releases the held funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseCondition {
    /// Release once the inspector passes the item and the inspection unlock
    /// step is confirmed.
    InspectionPass,
    /// Release only on an explicit buyer confirmation; never auto-resolved.
    BuyerConfirm,
    /// Release once `held_at + timeout_hours` has elapsed.
    Timeout,
    /// Release only by explicit admin action; never auto-resolved.
    Admin,
}

impl std::fmt::Display for ReleaseCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InspectionPass => write!(f, "INSPECTION_PASS"),
            Self::BuyerConfirm => write!(f, "BUYER_CONFIRM"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Admin => write!(f, "ADMIN"),
        }
    }
}

/// Outcome of a third-party inspection, fed in as an external signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionOutcome {
    None,
    Pass,
    Fail,
    Fraud,
}

impl InspectionOutcome {
    /// Fail and Fraud both settle the inspection fee then refund the buyer.
    #[must_use]
    pub fn is_adverse(&self) -> bool {
        matches!(self, Self::Fail | Self::Fraud)
    }
}

impl std::fmt::Display for InspectionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
            Self::Fraud => write!(f, "FRAUD"),
        }
    }
}

/// How the goods change hands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentMode {
    Unselected,
    Pickup,
    Delivery,
    Inspection,
}

impl std::fmt::Display for FulfillmentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unselected => write!(f, "UNSELECTED"),
            Self::Pickup => write!(f, "PICKUP"),
            Self::Delivery => write!(f, "DELIVERY"),
            Self::Inspection => write!(f, "INSPECTION"),
        }
    }
}

/// The seller's response to the post-payment availability challenge.
///
/// No fulfillment-mode selection is accepted until the seller confirms
/// within the challenge window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Availability {
    NotRequested,
    Pending { deadline: DateTime<Utc> },
    Confirmed,
    Denied,
}

impl Availability {
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }

    /// Whether a pending challenge has passed its deadline.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self, Self::Pending { deadline } if now > *deadline)
    }
}

/// The order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer: UserId,
    pub seller: UserId,
    pub courier: Option<UserId>,
    pub inspector: Option<UserId>,
    pub listing: ListingId,
    pub sale_kind: SaleKind,
    pub seller_tier: SellerTier,
    /// Whether the seller qualifies for the top-tier incentive carve-out.
    pub top_tier_seller: bool,

    /// Listing base price.
    pub base_amount: Minor,
    /// What the buyer is charged on the sale leg (base + merchant markup).
    pub sale_charge: Minor,
    pub delivery_fee: Minor,
    pub inspection_fee: Minor,
    /// sale_charge + delivery_fee + inspection_fee.
    pub total: Minor,

    /// Globally unique reference binding this order to its payment intent.
    pub payment_reference: Option<String>,

    pub status: OrderStatus,
    pub escrow_status: EscrowStatus,
    /// Amount held in escrow (set when escrow moves to HELD).
    pub hold_amount: Minor,
    pub held_at: Option<DateTime<Utc>>,
    pub release_condition: ReleaseCondition,
    pub inspection_outcome: InspectionOutcome,
    pub inspection_required: bool,

    pub fulfillment_mode: FulfillmentMode,
    pub availability: Availability,

    /// Frozen fee split. Written exactly once, when funds enter escrow.
    pub commission: Option<CommissionSnapshot>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Order {
    /// The amount escrow holds for this order.
    #[must_use]
    pub fn escrowable_total(&self) -> Minor {
        self.sale_charge + self.delivery_fee + self.inspection_fee
    }

    /// Whether this order is funded and awaiting settlement.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.escrow_status == EscrowStatus::Held
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    /// A paid-for declutter order in HELD escrow, ready for fulfillment.
    pub fn dummy_declutter(sale_charge: Minor, delivery_fee: Minor) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            buyer: UserId::new(),
            seller: UserId::new(),
            courier: None,
            inspector: None,
            listing: ListingId::new(),
            sale_kind: SaleKind::Declutter,
            seller_tier: SellerTier::Merchant,
            top_tier_seller: false,
            base_amount: sale_charge,
            sale_charge,
            delivery_fee,
            inspection_fee: Minor::ZERO,
            total: sale_charge + delivery_fee,
            payment_reference: Some(dummy_reference()),
            status: OrderStatus::Paid,
            escrow_status: EscrowStatus::Held,
            hold_amount: sale_charge + delivery_fee,
            held_at: Some(now),
            release_condition: ReleaseCondition::Timeout,
            inspection_outcome: InspectionOutcome::None,
            inspection_required: false,
            fulfillment_mode: FulfillmentMode::Delivery,
            availability: Availability::Confirmed,
            commission: None,
            created_at: now,
            updated_at: now,
            paid_at: Some(now),
        }
    }

    /// A freshly created, unpaid order.
    pub fn dummy_created(sale_charge: Minor) -> Self {
        let mut order = Self::dummy_declutter(sale_charge, Minor::ZERO);
        order.status = OrderStatus::Created;
        order.escrow_status = EscrowStatus::None;
        order.hold_amount = Minor::ZERO;
        order.held_at = None;
        order.paid_at = None;
        order.availability = Availability::NotRequested;
        order.fulfillment_mode = FulfillmentMode::Unselected;
        order
    }
}

/// A random payment reference in the wire format the providers use.
#[cfg(any(test, feature = "test-helpers"))]
#[must_use]
pub fn dummy_reference() -> String {
    use rand::Rng;
    let n: u64 = rand::thread_rng().gen_range(1_000_000_000..9_999_999_999);
    format!("SOKO-{n}")
}
