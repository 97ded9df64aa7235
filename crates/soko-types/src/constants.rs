//! System-wide constants and default rates for the settlement core.

/// Schema version written into newly computed commission snapshots.
pub const COMMISSION_SNAPSHOT_VERSION: u32 = 1;

/// Platform fee on the sale leg for merchant declutter sales (basis points).
pub const DECLUTTER_MERCHANT_SALE_BPS: u32 = 500;

/// Platform fee on the sale leg for individual declutter sales.
/// Individuals pay no markup on the base sale.
pub const DECLUTTER_INDIVIDUAL_SALE_BPS: u32 = 0;

/// Platform fee on the sale leg for short-let bookings, all seller tiers.
pub const SHORTLET_SALE_BPS: u32 = 1_000;

/// Platform share of the delivery fee (courier keeps the rest).
pub const DELIVERY_PLATFORM_BPS: u32 = 2_000;

/// Platform share of the inspection fee (inspector keeps the rest).
pub const INSPECTION_PLATFORM_BPS: u32 = 2_000;

/// Top-tier seller incentive, carved out of the platform's sale share.
pub const TOP_TIER_INCENTIVE_BPS: u32 = 100;

/// Hours the seller has to answer the availability challenge.
pub const DEFAULT_AVAILABILITY_WINDOW_HOURS: i64 = 2;

/// Hours after `held_at` at which a TIMEOUT-conditioned escrow releases.
pub const DEFAULT_ESCROW_TIMEOUT_HOURS: i64 = 72;

/// Maximum orders one automation sweep processes.
pub const DEFAULT_SWEEP_LIMIT: usize = 500;

/// Failed confirmation attempts before an unlock row locks out.
pub const MAX_UNLOCK_ATTEMPTS: u32 = 4;

/// Hours an issued unlock code stays valid.
pub const DEFAULT_CODE_TTL_HOURS: i64 = 24;

/// Minutes a signed QR token stays valid.
pub const DEFAULT_QR_TOKEN_TTL_MINUTES: i64 = 10;

/// Minutes an admin-override proof token stays valid.
pub const DEFAULT_OVERRIDE_TOKEN_TTL_MINUTES: i64 = 15;

/// Seconds an idempotency record replays the stored response.
pub const DEFAULT_IDEMPOTENCY_TTL_SECS: i64 = 86_400;

/// Digits in a generated unlock secret code.
pub const UNLOCK_CODE_DIGITS: usize = 6;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "SokoSettlement";
