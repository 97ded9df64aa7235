//! Unlock row model: the dual-factor gate in front of every physical
//! handoff step.
//!
//! One row exists per (order, step). The row stores only a hash of the
//! secret code; the plaintext lives in the SMS that delivered it. Once
//! `unlocked_at` is set it never unsets — the row cannot unlock twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::OrderId;

/// The three gated handoff checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockStep {
    /// Seller hands the item to the courier.
    PickupSeller,
    /// Courier hands the item to the buyer.
    DeliveryDriver,
    /// Seller hands the item to the inspector.
    InspectionInspector,
}

impl UnlockStep {
    /// The role that must scan the QR token for this step.
    #[must_use]
    pub fn scanner_role(&self) -> HandoffRole {
        match self {
            Self::PickupSeller => HandoffRole::Courier,
            Self::DeliveryDriver => HandoffRole::Buyer,
            Self::InspectionInspector => HandoffRole::Inspector,
        }
    }
}

// Display matches the serde snake_case names so hashes and QR scopes built
// from Display stay stable across the wire.
impl std::fmt::Display for UnlockStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PickupSeller => write!(f, "pickup_seller"),
            Self::DeliveryDriver => write!(f, "delivery_driver"),
            Self::InspectionInspector => write!(f, "inspection_inspector"),
        }
    }
}

/// Which party a QR token is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffRole {
    Buyer,
    Seller,
    Courier,
    Inspector,
}

impl std::fmt::Display for HandoffRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buyer => write!(f, "buyer"),
            Self::Seller => write!(f, "seller"),
            Self::Courier => write!(f, "courier"),
            Self::Inspector => write!(f, "inspector"),
        }
    }
}

/// One unlock row: the state of a single (order, step) handoff gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowUnlock {
    pub order_id: OrderId,
    pub step: UnlockStep,
    /// SHA-256 of the secret code, domain-separated and bound to
    /// (order, step) so equal codes on different orders hash differently.
    pub code_hash: [u8; 32],
    pub qr_required: bool,
    pub qr_verified: bool,
    /// Failed confirmation attempts so far.
    pub attempts: u32,
    /// Locked out after the attempt limit; reopenable only via the
    /// admin-override proof flow.
    pub locked: bool,
    /// Immutable once set.
    pub unlocked_at: Option<DateTime<Utc>>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Hash of the short-lived admin-override proof token, if one is live.
    pub override_token_hash: Option<[u8; 32]>,
    pub override_expires_at: Option<DateTime<Utc>>,
}

impl EscrowUnlock {
    /// Hash a plaintext code for this (order, step).
    #[must_use]
    pub fn hash_code(order_id: OrderId, step: UnlockStep, code: &str) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(b"soko:unlock_code:v1:");
        hasher.update(order_id.0.as_bytes());
        hasher.update(step.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(code.as_bytes());
        hasher.finalize().into()
    }

    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.unlocked_at.is_some()
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
