//! Commission snapshot types.
//!
//! The snapshot is the frozen fee-split record captured once per order at
//! the moment funds enter escrow. Every later payout reads the persisted
//! snapshot — a rate-policy change never retroactively alters an in-flight
//! order. The `version` field allows the stored shape to evolve without
//! breaking historical snapshots.

use serde::{Deserialize, Serialize};

use crate::money::Minor;

/// What kind of sale this order settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleKind {
    /// Second-hand goods sale.
    Declutter,
    /// Short-let property booking.
    Shortlet,
}

impl std::fmt::Display for SaleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Declutter => write!(f, "DECLUTTER"),
            Self::Shortlet => write!(f, "SHORTLET"),
        }
    }
}

/// Pricing classification of a seller account. The single closed enum every
/// pricing and payout call site consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SellerTier {
    /// Private individual: no platform markup on the base sale.
    Individual,
    /// Merchant account: pays the platform fee on top of the base price.
    Merchant,
}

impl std::fmt::Display for SellerTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Individual => write!(f, "INDIVIDUAL"),
            Self::Merchant => write!(f, "MERCHANT"),
        }
    }
}

/// Split of the sale charge between seller, platform, and the top-tier
/// seller incentive.
///
/// Invariant: `seller + platform + top_tier_incentive == sale charge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleSplit {
    pub seller: Minor,
    pub platform: Minor,
    pub top_tier_incentive: Minor,
}

impl SaleSplit {
    #[must_use]
    pub fn total(&self) -> Minor {
        self.seller + self.platform + self.top_tier_incentive
    }
}

/// Split of a service-leg fee (delivery or inspection) between the acting
/// party and the platform.
///
/// Invariant: `actor + platform == leg fee`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegSplit {
    pub actor: Minor,
    pub platform: Minor,
}

impl LegSplit {
    pub const ZERO: Self = Self {
        actor: Minor::ZERO,
        platform: Minor::ZERO,
    };

    #[must_use]
    pub fn total(&self) -> Minor {
        self.actor + self.platform
    }
}

/// The frozen commission record for one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSnapshot {
    /// Schema version of this snapshot shape.
    pub version: u32,
    /// Sale-leg split.
    pub sale: SaleSplit,
    /// Delivery-leg split.
    pub delivery: LegSplit,
    /// Inspection-leg split.
    pub inspection: LegSplit,
}

impl CommissionSnapshot {
    /// Everything the platform account collects across all three legs.
    #[must_use]
    pub fn platform_total(&self) -> Minor {
        self.sale.platform + self.delivery.platform + self.inspection.platform
    }

    /// Everything the snapshot distributes — must equal the escrow hold.
    #[must_use]
    pub fn grand_total(&self) -> Minor {
        self.sale.total() + self.delivery.total() + self.inspection.total()
    }
}
