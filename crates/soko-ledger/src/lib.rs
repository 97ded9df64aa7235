//! # soko-ledger
//!
//! **Money-movement plane**: the append-only wallet ledger and the generic
//! request idempotency store.
//!
//! ## Architecture
//!
//! The ledger is the final authority on wallet balances:
//! 1. **WalletLedger**: append-only postings; the (user, kind, reference)
//!    triple identifies a unique financial effect, and a collision returns
//!    the existing entry instead of double-posting
//! 2. **IdempotencyStore**: de-duplication of side-effecting endpoint calls
//!    by (actor, endpoint, idempotency key) with payload-hash conflict
//!    detection and a TTL
//!
//! Entries are never mutated or deleted after insert; reversals are new
//! entries with an explicit `*_refund` kind.

pub mod idempotency;
pub mod wallet;

pub use idempotency::{CheckOutcome, IdempotencyStore, StoredResponse, payload_hash};
pub use wallet::{PostOutcome, WalletLedger};
