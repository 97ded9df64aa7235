//! Snapshot computation: the single pure function that splits minor-unit
//! amounts between seller, courier, inspector, and platform.
//!
//! # Conservation Contract
//!
//! For every computed snapshot:
//! ```text
//! sale.seller + sale.platform + sale.top_tier_incentive == sale charge
//! delivery.actor + delivery.platform                    == delivery fee
//! inspection.actor + inspection.platform                == inspection fee
//! ```
//! The incentive is carved out of the platform's share, never out of the
//! seller's, and never exceeds the platform share.

use soko_types::constants::COMMISSION_SNAPSHOT_VERSION;
use soko_types::{CommissionSnapshot, LegSplit, Minor, SaleKind, SaleSplit, SellerTier};

use crate::rates::RateCard;

/// Everything `compute_snapshot` needs. All amounts in minor units.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotInputs {
    pub sale_kind: SaleKind,
    pub seller_tier: SellerTier,
    pub top_tier_seller: bool,
    /// What the buyer was charged on the sale leg.
    pub sale_charge: Minor,
    pub delivery_fee: Minor,
    pub inspection_fee: Minor,
}

/// What the buyer is charged on the sale leg for a given base price.
///
/// Merchant sellers pay the platform fee on top of the base price;
/// individual sellers list at base price.
#[must_use]
pub fn merchant_sale_charge(
    base: Minor,
    kind: SaleKind,
    tier: SellerTier,
    card: &RateCard,
) -> Minor {
    match tier {
        SellerTier::Merchant => base + base.apply_bps(card.sale_bps(kind, tier)),
        SellerTier::Individual => base,
    }
}

/// Compute the frozen fee split for one order.
#[must_use]
pub fn compute_snapshot(inputs: &SnapshotInputs, card: &RateCard) -> CommissionSnapshot {
    let gross_platform = inputs
        .sale_charge
        .apply_bps(card.sale_bps(inputs.sale_kind, inputs.seller_tier));
    let seller = inputs.sale_charge.saturating_sub(gross_platform);

    let top_tier_incentive = if inputs.top_tier_seller {
        // Never carve more than the platform actually collected.
        inputs
            .sale_charge
            .apply_bps(card.top_tier_incentive_bps)
            .min(gross_platform)
    } else {
        Minor::ZERO
    };
    let platform = gross_platform.saturating_sub(top_tier_incentive);

    CommissionSnapshot {
        version: COMMISSION_SNAPSHOT_VERSION,
        sale: SaleSplit {
            seller,
            platform,
            top_tier_incentive,
        },
        delivery: split_leg(inputs.delivery_fee, card.delivery_platform_bps),
        inspection: split_leg(inputs.inspection_fee, card.inspection_platform_bps),
    }
}

fn split_leg(fee: Minor, platform_bps: u32) -> LegSplit {
    if fee.is_zero() {
        return LegSplit::ZERO;
    }
    let platform = fee.apply_bps(platform_bps);
    LegSplit {
        actor: fee.saturating_sub(platform),
        platform,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(
        kind: SaleKind,
        tier: SellerTier,
        top_tier: bool,
        charge: u64,
        delivery: u64,
        inspection: u64,
    ) -> SnapshotInputs {
        SnapshotInputs {
            sale_kind: kind,
            seller_tier: tier,
            top_tier_seller: top_tier,
            sale_charge: Minor(charge),
            delivery_fee: Minor(delivery),
            inspection_fee: Minor(inspection),
        }
    }

    #[test]
    fn merchant_declutter_five_percent() {
        // ₦10,500.00 sale charge at 5% platform.
        let snap = compute_snapshot(
            &inputs(
                SaleKind::Declutter,
                SellerTier::Merchant,
                false,
                1_050_000,
                0,
                0,
            ),
            &RateCard::default(),
        );
        assert_eq!(snap.sale.platform, Minor(52_500));
        assert_eq!(snap.sale.seller, Minor(997_500));
        assert_eq!(snap.sale.top_tier_incentive, Minor::ZERO);
        assert_eq!(snap.version, 1);
    }

    #[test]
    fn merchant_markup_applied_on_top_of_base() {
        let card = RateCard::default();
        assert_eq!(
            merchant_sale_charge(
                Minor(1_000_000),
                SaleKind::Declutter,
                SellerTier::Merchant,
                &card
            ),
            Minor(1_050_000)
        );
        assert_eq!(
            merchant_sale_charge(
                Minor(1_000_000),
                SaleKind::Declutter,
                SellerTier::Individual,
                &card
            ),
            Minor(1_000_000)
        );
    }

    #[test]
    fn individual_declutter_pays_no_sale_commission() {
        let snap = compute_snapshot(
            &inputs(
                SaleKind::Declutter,
                SellerTier::Individual,
                false,
                1_000_000,
                0,
                0,
            ),
            &RateCard::default(),
        );
        assert_eq!(snap.sale.platform, Minor::ZERO);
        assert_eq!(snap.sale.seller, Minor(1_000_000));
    }

    #[test]
    fn shortlet_rate_applies_to_both_tiers() {
        let card = RateCard::default();
        for tier in [SellerTier::Individual, SellerTier::Merchant] {
            let snap = compute_snapshot(
                &inputs(SaleKind::Shortlet, tier, false, 2_000_000, 0, 0),
                &card,
            );
            assert_eq!(snap.sale.platform, Minor(200_000), "tier={tier}");
            assert_eq!(snap.sale.seller, Minor(1_800_000), "tier={tier}");
        }
    }

    #[test]
    fn top_tier_incentive_carved_from_platform() {
        let snap = compute_snapshot(
            &inputs(
                SaleKind::Declutter,
                SellerTier::Merchant,
                true,
                1_050_000,
                0,
                0,
            ),
            &RateCard::default(),
        );
        // 1% of 1,050,000 = 10,500, out of the 52,500 platform share.
        assert_eq!(snap.sale.top_tier_incentive, Minor(10_500));
        assert_eq!(snap.sale.platform, Minor(42_000));
        assert_eq!(snap.sale.seller, Minor(997_500));
        assert_eq!(snap.sale.total(), Minor(1_050_000));
    }

    #[test]
    fn incentive_never_exceeds_platform_share() {
        // Individual sale: zero platform share, so zero incentive even for
        // a top-tier seller.
        let snap = compute_snapshot(
            &inputs(
                SaleKind::Declutter,
                SellerTier::Individual,
                true,
                1_000_000,
                0,
                0,
            ),
            &RateCard::default(),
        );
        assert_eq!(snap.sale.top_tier_incentive, Minor::ZERO);
        assert_eq!(snap.sale.seller, Minor(1_000_000));
    }

    #[test]
    fn delivery_and_inspection_legs_split() {
        let snap = compute_snapshot(
            &inputs(
                SaleKind::Declutter,
                SellerTier::Merchant,
                false,
                1_050_000,
                150_000,
                50_000,
            ),
            &RateCard::default(),
        );
        assert_eq!(snap.delivery.platform, Minor(30_000));
        assert_eq!(snap.delivery.actor, Minor(120_000));
        assert_eq!(snap.inspection.platform, Minor(10_000));
        assert_eq!(snap.inspection.actor, Minor(40_000));
    }

    #[test]
    fn zero_fee_legs_are_zero() {
        let snap = compute_snapshot(
            &inputs(
                SaleKind::Declutter,
                SellerTier::Merchant,
                false,
                1_050_000,
                0,
                0,
            ),
            &RateCard::default(),
        );
        assert_eq!(snap.delivery, soko_types::LegSplit::ZERO);
        assert_eq!(snap.inspection, soko_types::LegSplit::ZERO);
    }

    #[test]
    fn conservation_across_amount_sweep() {
        let card = RateCard::default();
        for tier in [SellerTier::Individual, SellerTier::Merchant] {
            for top_tier in [false, true] {
                let mut charge: u64 = 1;
                while charge <= 10_u64.pow(12) {
                    let snap = compute_snapshot(
                        &inputs(SaleKind::Declutter, tier, top_tier, charge, 1_777, 333),
                        &card,
                    );
                    assert_eq!(
                        snap.sale.total(),
                        Minor(charge),
                        "sale conservation: charge={charge} tier={tier} top={top_tier}"
                    );
                    assert_eq!(snap.delivery.total(), Minor(1_777));
                    assert_eq!(snap.inspection.total(), Minor(333));
                    charge = charge * 3 + 7;
                }
            }
        }
    }

    #[test]
    fn deterministic_output() {
        let i = inputs(
            SaleKind::Shortlet,
            SellerTier::Merchant,
            true,
            3_333_333,
            123_457,
            99_999,
        );
        let card = RateCard::default();
        assert_eq!(compute_snapshot(&i, &card), compute_snapshot(&i, &card));
    }
}
