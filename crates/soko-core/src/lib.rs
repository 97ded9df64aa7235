//! Settlement engine for the soko marketplace.
//!
//! Everything downstream of "a buyer pays for a listing" lives here: the
//! order lifecycle, escrow holds and releases, payment intents against
//! pluggable providers, handoff unlock codes and QR gates, webhook
//! ingestion, and the automation runner that resolves ripe escrows.
//!
//! [`SettlementCore`] is the composition root; the individual managers are
//! public for tests and for callers that need finer control.

pub mod audit;
pub mod collab;
pub mod core;
pub mod escrow;
pub mod intent;
pub mod lifecycle;
pub mod providers;
pub mod runner;
pub mod unlock;
pub mod webhook;

pub use crate::core::{IngestOutcome, SettlementCore};
pub use audit::AuditTrail;
pub use collab::{
    FeatureFlags, InMemoryListings, ListingDirectory, ListingInfo, Notification, Notifier,
    NotifyChannel, RecordingNotifier, StaticFlags,
};
pub use escrow::{Escrow, EscrowOutcome};
pub use intent::{Drift, IntentManager, ReconcileReport, TransitionOutcome};
pub use lifecycle::OrderLifecycle;
pub use providers::{
    BankTransferProvider, HostedCheckoutProvider, MockProvider, PaymentProvider,
    ProviderDirective, ProviderRegistry,
};
pub use runner::{EscrowRunner, SweepSummary};
pub use unlock::{SettlementTrigger, UnlockManager};
pub use webhook::{ParsedEvent, WebhookLog};
