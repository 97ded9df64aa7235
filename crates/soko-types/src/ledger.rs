//! Wallet ledger entry types.
//!
//! Entries are append-only: no entry is mutated or deleted after insert,
//! and reversals are new entries with an explicit `*_refund` kind. The
//! (user, kind, reference) triple identifies a unique financial effect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EntryId, UserId};
use crate::money::Minor;

/// Which way the money moves relative to the user's wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryDirection {
    Credit,
    Debit,
}

impl std::fmt::Display for EntryDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Credit => write!(f, "CREDIT"),
            Self::Debit => write!(f, "DEBIT"),
        }
    }
}

/// Closed set of financial effects the ledger records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Seller's share of the sale charge.
    SalePayout,
    /// Extra incentive carved from the platform share for top-tier sellers.
    TopTierIncentive,
    /// Courier's share of the delivery fee.
    DeliveryPayout,
    /// Inspector's share of the inspection fee.
    InspectionPayout,
    /// Platform's commission across any leg.
    PlatformCommission,
    /// Buyer refund of escrowed funds.
    EscrowRefund,
    /// Wallet top-up through a payment intent.
    Topup,
    /// Withdrawal to an external account.
    Withdrawal,
    /// Reversal of a failed withdrawal.
    WithdrawalRefund,
}

impl EntryKind {
    /// Stable snake_case name used in reference strings and audit detail.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SalePayout => "sale_payout",
            Self::TopTierIncentive => "top_tier_incentive",
            Self::DeliveryPayout => "delivery_payout",
            Self::InspectionPayout => "inspection_payout",
            Self::PlatformCommission => "platform_commission",
            Self::EscrowRefund => "escrow_refund",
            Self::Topup => "topup",
            Self::Withdrawal => "withdrawal",
            Self::WithdrawalRefund => "withdrawal_refund",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable wallet ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletLedgerEntry {
    pub id: EntryId,
    pub user: UserId,
    pub direction: EntryDirection,
    pub amount: Minor,
    pub kind: EntryKind,
    /// Caller-computed reference string; with (user, kind) this identifies
    /// the financial effect.
    pub reference: String,
    pub note: String,
    /// Cached wallet balance after this entry applied.
    pub balance_after: Minor,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_snake_case() {
        assert_eq!(EntryKind::SalePayout.as_str(), "sale_payout");
        assert_eq!(EntryKind::EscrowRefund.as_str(), "escrow_refund");
        assert_eq!(EntryKind::WithdrawalRefund.as_str(), "withdrawal_refund");
    }

    #[test]
    fn kind_display_matches_serde() {
        let json = serde_json::to_string(&EntryKind::DeliveryPayout).unwrap();
        assert_eq!(json, format!("\"{}\"", EntryKind::DeliveryPayout));
    }

    #[test]
    fn entry_serde_roundtrip() {
        let entry = WalletLedgerEntry {
            id: EntryId::new(),
            user: UserId::new(),
            direction: EntryDirection::Credit,
            amount: Minor(997_500),
            kind: EntryKind::SalePayout,
            reference: "order:abc".into(),
            note: "sale payout".into(),
            balance_after: Minor(997_500),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        let back: WalletLedgerEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry.id, back.id);
        assert_eq!(entry.amount, back.amount);
    }
}
