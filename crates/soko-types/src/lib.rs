//! # soko-types
//!
//! Shared types, errors, and configuration for the **Soko** marketplace
//! settlement core.
//!
//! This crate is the leaf dependency of the workspace — every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`OrderId`], [`UserId`], [`ListingId`], [`IntentId`], [`EntryId`]
//! - **Money**: [`Minor`] — exact integer minor-unit arithmetic
//! - **Order model**: [`Order`], [`OrderStatus`], [`EscrowStatus`], [`ReleaseCondition`],
//!   [`InspectionOutcome`], [`FulfillmentMode`], [`Availability`]
//! - **Commission model**: [`CommissionSnapshot`], [`SaleKind`], [`SellerTier`]
//! - **Payment intent model**: [`PaymentIntent`], [`IntentStatus`], [`IntentPurpose`], [`ProviderId`]
//! - **Unlock model**: [`EscrowUnlock`], [`UnlockStep`], [`HandoffRole`]
//! - **Ledger model**: [`WalletLedgerEntry`], [`EntryDirection`], [`EntryKind`]
//! - **Webhook model**: [`WebhookEvent`], [`WebhookStatus`]
//! - **Audit model**: [`OrderEvent`], [`JobRun`]
//! - **Configuration**: [`SettlementConfig`]
//! - **Errors**: [`SokoError`] with `SK_ERR_` prefix codes and an [`ErrorClass`] taxonomy

pub mod audit;
pub mod commission;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod intent;
pub mod ledger;
pub mod money;
pub mod order;
pub mod unlock;
pub mod webhook;

// Re-export all primary types at crate root for ergonomic imports:
//   use soko_types::{Order, EscrowStatus, Minor, SokoError, ...};

pub use audit::*;
pub use commission::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use intent::*;
pub use ledger::*;
pub use money::*;
pub use order::*;
pub use unlock::*;
pub use webhook::*;

// Constants are accessed via `soko_types::constants::FOO`
// (not re-exported to avoid name collisions).
