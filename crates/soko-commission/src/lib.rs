//! # soko-commission
//!
//! **Pure commission computation for the Soko settlement core.**
//!
//! This is the compute plane — it takes pricing inputs and produces a
//! deterministic fee split. It has:
//!
//! - **Zero side effects**: no store writes, no balance checks, no clocks
//! - **Deterministic output**: same inputs -> same snapshot on every call
//! - **Integer arithmetic only**: minor units in, minor units out,
//!   half-up rounding at every basis-point application
//!
//! The snapshot it produces is computed exactly once per order, at the
//! moment funds enter escrow, and persisted. All downstream payout code
//! reads the persisted snapshot — that is what makes a rate-policy change
//! non-retroactive for in-flight orders.

pub mod rates;
pub mod snapshot;

pub use rates::{classify_seller, AccountRole, RateCard};
pub use snapshot::{compute_snapshot, merchant_sale_charge, SnapshotInputs};
