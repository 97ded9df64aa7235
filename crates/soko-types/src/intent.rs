//! Payment intent model: one tracked attempt to collect money through an
//! external provider.
//!
//! # State Machine
//!
//! ```text
//!   ┌─────────────┐      ┌─────────────────┐
//!   │ INITIALIZED ├─────▶│ AWAITING_PAYMENT├──┐
//!   └──────┬──────┘      └─────────────────┘  │   ┌──────┐
//!          │             ┌─────────────────┐  ├──▶│ PAID │
//!          ├────────────▶│ MANUAL_PENDING  ├──┘   └──────┘
//!          │             └─────────────────┘
//!          └──▶ PAID (mock provider settles immediately)
//!
//!   FAILED is reachable from any non-terminal state.
//! ```
//!
//! Every status change appends to the intent's transition log, keyed by an
//! idempotency key derived from (reference, target state) — the same
//! transition request applied twice has no additional effect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{IntentId, OrderId, UserId};
use crate::money::Minor;

/// Which external provider strategy collects the money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// Always-succeeds test double.
    Mock,
    /// Redirect the payer to a hosted checkout page.
    HostedCheckout,
    /// Manual bank transfer with static instructions and an SLA.
    BankTransfer,
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mock => write!(f, "MOCK"),
            Self::HostedCheckout => write!(f, "HOSTED_CHECKOUT"),
            Self::BankTransfer => write!(f, "BANK_TRANSFER"),
        }
    }
}

/// Lifecycle status of a payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Initialized,
    ManualPending,
    AwaitingPayment,
    Paid,
    Failed,
}

impl IntentStatus {
    /// Paid and Failed are terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Failed)
    }

    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        if *self == target {
            return false;
        }
        match (self, target) {
            // Failed is reachable from any non-terminal state.
            (s, Self::Failed) => !s.is_terminal(),
            (Self::Initialized, Self::ManualPending | Self::AwaitingPayment | Self::Paid)
            | (Self::ManualPending | Self::AwaitingPayment, Self::Paid) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized => write!(f, "INITIALIZED"),
            Self::ManualPending => write!(f, "MANUAL_PENDING"),
            Self::AwaitingPayment => write!(f, "AWAITING_PAYMENT"),
            Self::Paid => write!(f, "PAID"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// What the collected money is for. A versioned tagged structure, so the
/// fields each purpose requires are statically guaranteed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "purpose", rename_all = "snake_case")]
pub enum IntentPurpose {
    /// Wallet top-up; no order attached.
    Topup,
    /// Funds one marketplace order.
    Order { order_id: OrderId },
    /// Funds one short-let booking order.
    ShortletBooking { order_id: OrderId },
}

impl IntentPurpose {
    /// The order this intent funds, when it funds one.
    #[must_use]
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            Self::Topup => None,
            Self::Order { order_id } | Self::ShortletBooking { order_id } => Some(*order_id),
        }
    }
}

/// One record in the append-only transition log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentTransition {
    /// Idempotency key: sha256(reference, target), hex.
    pub key: String,
    pub from: IntentStatus,
    pub to: IntentStatus,
    pub actor: UserId,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// A payment intent. Mutated only through the intent state machine's
/// `transition` operation; direct field writes are not part of the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: IntentId,
    /// The user who initiated collection; owns the intent.
    pub owner: UserId,
    pub provider: ProviderId,
    /// Globally unique reference shared with the external provider.
    pub reference: String,
    /// Versioned purpose metadata.
    pub purpose: IntentPurpose,
    /// Expected amount in minor units. Webhook settlements must match this
    /// exactly.
    pub amount: Minor,
    pub status: IntentStatus,
    /// Append-only status change log.
    pub transitions: Vec<IntentTransition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentIntent {
    /// Idempotency key for transitioning `reference` to `target`.
    #[must_use]
    pub fn transition_key(reference: &str, target: IntentStatus) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(b"soko:intent_transition:v1:");
        hasher.update(reference.as_bytes());
        hasher.update(b":");
        hasher.update(target.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Whether this transition was already applied.
    #[must_use]
    pub fn has_transition(&self, key: &str) -> bool {
        self.transitions.iter().any(|t| t.key == key)
    }
}
