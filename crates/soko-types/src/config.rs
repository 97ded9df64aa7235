//! Configuration for the settlement core.
//!
//! The core assumes a fixed, versioned schema shape; anything environment-
//! specific (timeouts, secrets, the platform treasury account) arrives here
//! during the explicit bootstrap phase, before the service accepts traffic.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::ids::UserId;

/// Full configuration for the settlement core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// The platform treasury account commissions are credited to.
    pub platform_account: UserId,
    /// Hours the seller has to answer the availability challenge.
    pub availability_window_hours: i64,
    /// Hours after `held_at` when TIMEOUT-conditioned escrow releases.
    pub escrow_timeout_hours: i64,
    /// Maximum orders one automation sweep processes.
    pub sweep_limit: usize,
    /// Failed confirmation attempts before an unlock row locks out.
    pub max_unlock_attempts: u32,
    /// Hours an issued unlock code stays valid.
    pub code_ttl_hours: i64,
    /// Minutes a signed QR token stays valid.
    pub qr_token_ttl_minutes: i64,
    /// Minutes an admin-override proof token stays valid.
    pub override_token_ttl_minutes: i64,
    /// Seconds an idempotency record replays the stored response.
    pub idempotency_ttl_secs: i64,
    /// Server-held secret signing QR tokens.
    pub qr_secret: String,
    /// Per-provider webhook signing secrets, keyed by provider name.
    pub webhook_secrets: HashMap<String, String>,
}

impl SettlementConfig {
    /// Configuration with default limits for the given platform account.
    #[must_use]
    pub fn new(platform_account: UserId) -> Self {
        Self {
            platform_account,
            availability_window_hours: constants::DEFAULT_AVAILABILITY_WINDOW_HOURS,
            escrow_timeout_hours: constants::DEFAULT_ESCROW_TIMEOUT_HOURS,
            sweep_limit: constants::DEFAULT_SWEEP_LIMIT,
            max_unlock_attempts: constants::MAX_UNLOCK_ATTEMPTS,
            code_ttl_hours: constants::DEFAULT_CODE_TTL_HOURS,
            qr_token_ttl_minutes: constants::DEFAULT_QR_TOKEN_TTL_MINUTES,
            override_token_ttl_minutes: constants::DEFAULT_OVERRIDE_TOKEN_TTL_MINUTES,
            idempotency_ttl_secs: constants::DEFAULT_IDEMPOTENCY_TTL_SECS,
            qr_secret: String::new(),
            webhook_secrets: HashMap::new(),
        }
    }

    /// Builder-style: set the QR signing secret.
    #[must_use]
    pub fn with_qr_secret(mut self, secret: impl Into<String>) -> Self {
        self.qr_secret = secret.into();
        self
    }

    /// Builder-style: register a provider webhook secret.
    #[must_use]
    pub fn with_webhook_secret(
        mut self,
        provider: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        self.webhook_secrets.insert(provider.into(), secret.into());
        self
    }
}
