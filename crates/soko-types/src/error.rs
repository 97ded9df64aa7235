//! Error types for the settlement core.
//!
//! All errors use the `SK_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Order lifecycle errors
//! - 2xx: Escrow errors
//! - 3xx: Payment intent errors
//! - 4xx: Unlock verification errors
//! - 5xx: Wallet ledger errors
//! - 6xx: Webhook / idempotency errors
//! - 7xx: Validation / authorization / rate limiting
//! - 8xx: Automation runner errors
//! - 9xx: General / internal errors
//!
//! Every variant carries a stable machine-readable [`SokoError::code`] and
//! maps onto an [`ErrorClass`] so the HTTP layer can derive a status without
//! matching on individual variants.

use thiserror::Error;

use crate::ids::{ListingId, OrderId};
use crate::intent::IntentStatus;
use crate::money::Minor;
use crate::order::{EscrowStatus, OrderStatus};
use crate::unlock::UnlockStep;

/// Coarse classification of an error, mirroring how the API layer reports it.
///
/// State-machine guard failures are `Conflict`s, recovered locally — never
/// panics. `Integration` is kept distinct from `Internal` so operators can
/// tell "provider down" from "our bug".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Malformed or missing input. Never touches the store.
    Validation,
    /// Caller is not allowed to perform this operation. No side effect.
    Authorization,
    /// The referenced entity does not exist.
    NotFound,
    /// A state-machine precondition failed (already paid, already unlocked,
    /// pending request exists, amount disagreement).
    Conflict,
    /// A deadline has passed (expired availability challenge, expired code).
    Gone,
    /// The resource is locked out (unlock attempt limit reached).
    Locked,
    /// Too many requests; includes a retry-after hint.
    RateLimited,
    /// An external collaborator is disabled or misconfigured.
    Integration,
    /// Unexpected failure. The enclosing mutation is rolled back first.
    Internal,
}

impl ErrorClass {
    /// Representative HTTP status for this class.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Authorization => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Gone => 410,
            Self::Locked => 423,
            Self::RateLimited => 429,
            Self::Integration => 503,
            Self::Internal => 500,
        }
    }
}

/// Central error enum for all settlement operations.
#[derive(Debug, Error)]
pub enum SokoError {
    // =================================================================
    // Order Lifecycle Errors (1xx)
    // =================================================================
    /// The requested order was not found.
    #[error("SK_ERR_100: Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order input failed validation (missing fields, bad values, etc.).
    #[error("SK_ERR_101: Invalid order: {reason}")]
    InvalidOrder { reason: String },

    /// A seller attempted to buy their own listing.
    #[error("SK_ERR_102: Seller cannot buy own listing")]
    SellerCannotBuyOwnListing,

    /// The referenced listing is inactive or unknown.
    #[error("SK_ERR_103: Listing unavailable: {0}")]
    ListingUnavailable(ListingId),

    /// The payment reference is already bound to another order.
    #[error("SK_ERR_104: Payment reference already in use: {reference}")]
    PaymentReferenceInUse { reference: String },

    /// The requested order status transition is not legal.
    #[error("SK_ERR_105: Invalid order transition: {from} -> {to}")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },

    /// A fulfillment step was attempted before the seller confirmed
    /// availability.
    #[error("SK_ERR_106: Seller availability not confirmed")]
    AvailabilityNotConfirmed,

    /// The 2-hour availability challenge has expired.
    #[error("SK_ERR_107: Availability challenge expired")]
    AvailabilityChallengeExpired,

    /// A lifecycle precondition failed (e.g., pickup unlock not confirmed
    /// before marking picked up).
    #[error("SK_ERR_108: Order precondition not met: {reason}")]
    OrderPreconditionFailed { reason: String },

    // =================================================================
    // Escrow Errors (2xx)
    // =================================================================
    /// The escrow operation requires HELD status.
    #[error("SK_ERR_200: Escrow is not held: currently {status}")]
    EscrowNotHeld { status: EscrowStatus },

    /// The escrow has already reached a terminal state.
    #[error("SK_ERR_201: Escrow already terminal: {status}")]
    EscrowTerminal { status: EscrowStatus },

    /// A payout was requested but the order has no commission snapshot.
    #[error("SK_ERR_202: Commission snapshot missing for order {0}")]
    SnapshotMissing(OrderId),

    // =================================================================
    // Payment Intent Errors (3xx)
    // =================================================================
    /// No intent is known under this reference.
    #[error("SK_ERR_300: Payment intent not found: {reference}")]
    IntentNotFound { reference: String },

    /// The requested intent status transition is not legal.
    #[error("SK_ERR_301: Invalid intent transition: {from} -> {to}")]
    InvalidIntentTransition { from: IntentStatus, to: IntentStatus },

    /// A new intent was requested for an order that is already paid.
    #[error("SK_ERR_302: Order already paid: {0}")]
    OrderAlreadyPaid(OrderId),

    /// The paid amount disagrees with the intent's expected amount.
    /// Treated as a security-relevant anomaly, never silently corrected.
    #[error("SK_ERR_303: Amount mismatch: expected {expected} minor, got {actual}")]
    AmountMismatch { expected: Minor, actual: Minor },

    /// The selected payment provider is disabled or misconfigured.
    #[error("SK_ERR_304: Provider unavailable: {provider}")]
    ProviderUnavailable { provider: String },

    /// An existing intent under this reference has a different purpose or
    /// amount than the initialize request.
    #[error("SK_ERR_305: Intent reference reused with different terms: {reference}")]
    IntentTermsMismatch { reference: String },

    // =================================================================
    // Unlock Verification Errors (4xx)
    // =================================================================
    /// No unlock row exists for this (order, step).
    #[error("SK_ERR_400: No unlock issued for step {0}")]
    UnlockNotFound(UnlockStep),

    /// The step has already been unlocked; `unlocked_at` is immutable.
    #[error("SK_ERR_401: Step already unlocked: {0}")]
    AlreadyUnlocked(UnlockStep),

    /// The unlock row is locked out after repeated failures.
    #[error("SK_ERR_402: Unlock locked after too many failed attempts: {0}")]
    UnlockLockedOut(UnlockStep),

    /// The secret code has expired.
    #[error("SK_ERR_403: Unlock code expired for step {0}")]
    CodeExpired(UnlockStep),

    /// QR verification is required before the code can be accepted.
    #[error("SK_ERR_404: QR scan required before code confirmation: {0}")]
    QrScanRequired(UnlockStep),

    /// The supplied secret code is wrong.
    #[error("SK_ERR_405: Wrong unlock code: {attempts_remaining} attempts remaining")]
    WrongCode { attempts_remaining: u32 },

    /// The QR token failed verification (bad signature, wrong scope, expired).
    #[error("SK_ERR_406: QR token invalid: {reason}")]
    QrTokenInvalid { reason: String },

    /// The admin override proof token failed verification or expired.
    #[error("SK_ERR_407: Override token invalid")]
    OverrideTokenInvalid,

    /// A code is already issued and still live for this step.
    #[error("SK_ERR_408: Unlock code already issued for step {0}")]
    CodeAlreadyIssued(UnlockStep),

    // =================================================================
    // Wallet Ledger Errors (5xx)
    // =================================================================
    /// Not enough balance to cover a debit.
    #[error("SK_ERR_500: Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Minor, available: Minor },

    /// A posting would overflow the balance counter.
    #[error("SK_ERR_501: Balance overflow")]
    BalanceOverflow,

    // =================================================================
    // Webhook / Idempotency Errors (6xx)
    // =================================================================
    /// The webhook signature did not verify. Nothing is recorded.
    #[error("SK_ERR_600: Webhook signature invalid for provider {provider}")]
    SignatureInvalid { provider: String },

    /// The webhook payload could not be parsed.
    #[error("SK_ERR_601: Malformed webhook payload: {reason}")]
    MalformedPayload { reason: String },

    /// The same idempotency key arrived with a different payload hash.
    #[error("SK_ERR_602: Idempotency key reused with different payload")]
    IdempotencyConflict,

    /// Webhooks arrived for a provider we hold no secret for.
    #[error("SK_ERR_603: Unknown webhook provider: {provider}")]
    UnknownProvider { provider: String },

    // =================================================================
    // Validation / Authorization (7xx)
    // =================================================================
    /// Generic input validation failure.
    #[error("SK_ERR_700: Validation failed: {reason}")]
    Validation { reason: String },

    /// An amount failed minor-unit validation.
    #[error("SK_ERR_701: Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// The acting user may not perform this operation.
    #[error("SK_ERR_702: Forbidden: {reason}")]
    Forbidden { reason: String },

    /// Rate limit exceeded.
    #[error("SK_ERR_703: Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    // =================================================================
    // Automation Runner Errors (8xx)
    // =================================================================
    /// A sweep is already in flight; runs never overlap.
    #[error("SK_ERR_800: Escrow sweep already running")]
    SweepAlreadyRunning,

    /// The automation feature flag is off.
    #[error("SK_ERR_801: Escrow automation disabled")]
    AutomationDisabled,

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("SK_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("SK_ERR_901: Serialization error: {0}")]
    Serialization(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, SokoError>;

impl SokoError {
    /// Stable machine-readable code carried on every error response.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::InvalidOrder { .. } => "INVALID_ORDER",
            Self::SellerCannotBuyOwnListing => "SELLER_CANNOT_BUY_OWN_LISTING",
            Self::ListingUnavailable(_) => "LISTING_UNAVAILABLE",
            Self::PaymentReferenceInUse { .. } => "PAYMENT_REFERENCE_IN_USE",
            Self::InvalidOrderTransition { .. } => "INVALID_ORDER_TRANSITION",
            Self::AvailabilityNotConfirmed => "AVAILABILITY_NOT_CONFIRMED",
            Self::AvailabilityChallengeExpired => "AVAILABILITY_EXPIRED",
            Self::OrderPreconditionFailed { .. } => "ORDER_PRECONDITION_FAILED",
            Self::EscrowNotHeld { .. } => "ESCROW_NOT_HELD",
            Self::EscrowTerminal { .. } => "ESCROW_TERMINAL",
            Self::SnapshotMissing(_) => "SNAPSHOT_MISSING",
            Self::IntentNotFound { .. } => "INTENT_NOT_FOUND",
            Self::InvalidIntentTransition { .. } => "INVALID_INTENT_TRANSITION",
            Self::OrderAlreadyPaid(_) => "ORDER_ALREADY_PAID",
            Self::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            Self::ProviderUnavailable { .. } => "PROVIDER_UNAVAILABLE",
            Self::IntentTermsMismatch { .. } => "INTENT_TERMS_MISMATCH",
            Self::UnlockNotFound(_) => "UNLOCK_NOT_FOUND",
            Self::AlreadyUnlocked(_) => "ALREADY_UNLOCKED",
            Self::UnlockLockedOut(_) => "UNLOCK_LOCKED",
            Self::CodeExpired(_) => "CODE_EXPIRED",
            Self::QrScanRequired(_) => "QR_SCAN_REQUIRED",
            Self::WrongCode { .. } => "WRONG_CODE",
            Self::QrTokenInvalid { .. } => "QR_TOKEN_INVALID",
            Self::OverrideTokenInvalid => "OVERRIDE_TOKEN_INVALID",
            Self::CodeAlreadyIssued(_) => "CODE_ALREADY_ISSUED",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::BalanceOverflow => "BALANCE_OVERFLOW",
            Self::SignatureInvalid { .. } => "SIGNATURE_INVALID",
            Self::MalformedPayload { .. } => "MALFORMED_PAYLOAD",
            Self::IdempotencyConflict => "IDEMPOTENCY_CONFLICT",
            Self::UnknownProvider { .. } => "UNKNOWN_PROVIDER",
            Self::Validation { .. } => "VALIDATION_FAILED",
            Self::InvalidAmount { .. } => "INVALID_AMOUNT",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::SweepAlreadyRunning => "SWEEP_ALREADY_RUNNING",
            Self::AutomationDisabled => "AUTOMATION_DISABLED",
            Self::Internal(_) => "INTERNAL",
            Self::Serialization(_) => "SERIALIZATION",
        }
    }

    /// Map this error onto the coarse taxonomy the API layer reports.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidOrder { .. }
            | Self::MalformedPayload { .. }
            | Self::Validation { .. }
            | Self::InvalidAmount { .. }
            | Self::WrongCode { .. } => ErrorClass::Validation,

            Self::Forbidden { .. }
            | Self::SignatureInvalid { .. }
            | Self::QrTokenInvalid { .. }
            | Self::OverrideTokenInvalid => ErrorClass::Authorization,

            Self::OrderNotFound(_) | Self::IntentNotFound { .. } | Self::UnlockNotFound(_) => {
                ErrorClass::NotFound
            }

            Self::SellerCannotBuyOwnListing
            | Self::ListingUnavailable(_)
            | Self::PaymentReferenceInUse { .. }
            | Self::InvalidOrderTransition { .. }
            | Self::AvailabilityNotConfirmed
            | Self::OrderPreconditionFailed { .. }
            | Self::EscrowNotHeld { .. }
            | Self::EscrowTerminal { .. }
            | Self::InvalidIntentTransition { .. }
            | Self::OrderAlreadyPaid(_)
            | Self::AmountMismatch { .. }
            | Self::IntentTermsMismatch { .. }
            | Self::AlreadyUnlocked(_)
            | Self::QrScanRequired(_)
            | Self::CodeAlreadyIssued(_)
            | Self::InsufficientBalance { .. }
            | Self::IdempotencyConflict
            | Self::SweepAlreadyRunning => ErrorClass::Conflict,

            Self::AvailabilityChallengeExpired | Self::CodeExpired(_) => ErrorClass::Gone,

            Self::UnlockLockedOut(_) => ErrorClass::Locked,

            Self::RateLimited { .. } => ErrorClass::RateLimited,

            Self::ProviderUnavailable { .. }
            | Self::UnknownProvider { .. }
            | Self::AutomationDisabled => ErrorClass::Integration,

            Self::SnapshotMissing(_)
            | Self::BalanceOverflow
            | Self::Internal(_)
            | Self::Serialization(_) => ErrorClass::Internal,
        }
    }

    /// Shortcut: the representative HTTP status for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.class().http_status()
    }
}
