//! Rate card and seller classification.
//!
//! All pricing and payout call sites consume one closed classification,
//! [`classify_seller`], instead of branching on account roles themselves.

use serde::{Deserialize, Serialize};

use soko_types::constants;
use soko_types::{SaleKind, SellerTier};

/// Account role as the identity subsystem reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Individual,
    Merchant,
    Courier,
    Inspector,
}

/// Collapse an account role onto the pricing tier.
///
/// Courier and inspector accounts sell under merchant pricing. This mirrors
/// the production billing behavior; see DESIGN.md for the open question
/// raised with product.
#[must_use]
pub fn classify_seller(role: AccountRole) -> SellerTier {
    match role {
        AccountRole::Individual => SellerTier::Individual,
        AccountRole::Merchant | AccountRole::Courier | AccountRole::Inspector => {
            SellerTier::Merchant
        }
    }
}

/// Basis-point rate tables for every leg of a settlement.
///
/// The default card is the live policy; tests construct custom cards to
/// exercise the split arithmetic in isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCard {
    /// Sale-leg platform fee for merchant declutter sales.
    pub declutter_merchant_sale_bps: u32,
    /// Sale-leg platform fee for individual declutter sales.
    pub declutter_individual_sale_bps: u32,
    /// Sale-leg platform fee for short-let bookings (all tiers).
    pub shortlet_sale_bps: u32,
    /// Platform share of the delivery fee.
    pub delivery_platform_bps: u32,
    /// Platform share of the inspection fee.
    pub inspection_platform_bps: u32,
    /// Top-tier incentive, carved out of the platform's sale share.
    pub top_tier_incentive_bps: u32,
}

impl RateCard {
    /// Sale-leg platform rate for the given kind and tier.
    #[must_use]
    pub fn sale_bps(&self, kind: SaleKind, tier: SellerTier) -> u32 {
        match (kind, tier) {
            (SaleKind::Declutter, SellerTier::Merchant) => self.declutter_merchant_sale_bps,
            (SaleKind::Declutter, SellerTier::Individual) => self.declutter_individual_sale_bps,
            (SaleKind::Shortlet, _) => self.shortlet_sale_bps,
        }
    }
}

impl Default for RateCard {
    fn default() -> Self {
        Self {
            declutter_merchant_sale_bps: constants::DECLUTTER_MERCHANT_SALE_BPS,
            declutter_individual_sale_bps: constants::DECLUTTER_INDIVIDUAL_SALE_BPS,
            shortlet_sale_bps: constants::SHORTLET_SALE_BPS,
            delivery_platform_bps: constants::DELIVERY_PLATFORM_BPS,
            inspection_platform_bps: constants::INSPECTION_PLATFORM_BPS,
            top_tier_incentive_bps: constants::TOP_TIER_INCENTIVE_BPS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn individual_stays_individual() {
        assert_eq!(
            classify_seller(AccountRole::Individual),
            SellerTier::Individual
        );
    }

    #[test]
    fn service_roles_classify_as_merchant() {
        assert_eq!(classify_seller(AccountRole::Merchant), SellerTier::Merchant);
        assert_eq!(classify_seller(AccountRole::Courier), SellerTier::Merchant);
        assert_eq!(
            classify_seller(AccountRole::Inspector),
            SellerTier::Merchant
        );
    }

    #[test]
    fn sale_bps_by_kind_and_tier() {
        let card = RateCard::default();
        assert_eq!(
            card.sale_bps(SaleKind::Declutter, SellerTier::Merchant),
            500
        );
        assert_eq!(
            card.sale_bps(SaleKind::Declutter, SellerTier::Individual),
            0
        );
        assert_eq!(card.sale_bps(SaleKind::Shortlet, SellerTier::Merchant), 1_000);
        assert_eq!(
            card.sale_bps(SaleKind::Shortlet, SellerTier::Individual),
            1_000
        );
    }
}
