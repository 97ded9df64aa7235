//! Unlock verification: the dual-factor gate in front of every physical
//! handoff.
//!
//! Per (order, step) the flow is: issue a 6-digit code (delivered by SMS,
//! only its hash stored) → optionally scan a short-lived HMAC-signed QR
//! token scoped to (order, step, role, expiry) → confirm the code. A
//! correct confirmation sets `unlocked_at` once, forever, and tells the
//! caller which settlement the lifecycle must trigger.
//!
//! Four wrong codes lock the row; a locked row reopens only through the
//! override flow, which itself demands proof of code possession.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};

use soko_types::{
    EscrowUnlock, HandoffRole, Order, OrderId, Result, SettlementConfig, SokoError, UnlockStep,
};

use crate::collab::{Notifier, NotifyChannel};

type HmacSha256 = Hmac<Sha256>;

/// What money movement a successful confirmation obligates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementTrigger {
    /// Pickup handoff confirmed: settle the seller's sale leg now.
    SaleLeg,
    /// Delivery handoff confirmed: settle the courier leg and release
    /// the escrow in full.
    FullRelease,
    /// Inspection handoff confirmed: no money moves yet; the runner
    /// releases once the inspector records a PASS.
    InspectionGate,
}

impl SettlementTrigger {
    fn for_step(step: UnlockStep) -> Self {
        match step {
            UnlockStep::PickupSeller => Self::SaleLeg,
            UnlockStep::DeliveryDriver => Self::FullRelease,
            UnlockStep::InspectionInspector => Self::InspectionGate,
        }
    }
}

/// In-memory store of unlock rows, one per (order, step).
#[derive(Debug, Default)]
pub struct UnlockManager {
    rows: HashMap<(OrderId, UnlockStep), EscrowUnlock>,
}

impl UnlockManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate and deliver a fresh 6-digit code for a handoff step.
    ///
    /// Returns the plaintext code; only its hash is retained. Reissue is a
    /// conflict while a live, unexpired code exists.
    pub fn issue_code(
        &mut self,
        order: &Order,
        step: UnlockStep,
        qr_required: bool,
        config: &SettlementConfig,
        notifier: &mut dyn Notifier,
        now: DateTime<Utc>,
    ) -> Result<String> {
        if !order.is_held() {
            return Err(SokoError::OrderPreconditionFailed {
                reason: format!("escrow must be held to gate a handoff, was {}", order.escrow_status),
            });
        }
        if let Some(row) = self.rows.get(&(order.id, step)) {
            if row.is_unlocked() {
                return Err(SokoError::AlreadyUnlocked(step));
            }
            if !row.is_expired(now) {
                return Err(SokoError::CodeAlreadyIssued(step));
            }
        }

        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
        self.rows.insert(
            (order.id, step),
            EscrowUnlock {
                order_id: order.id,
                step,
                code_hash: EscrowUnlock::hash_code(order.id, step, &code),
                qr_required,
                qr_verified: false,
                attempts: 0,
                locked: false,
                unlocked_at: None,
                issued_at: now,
                expires_at: now + Duration::hours(config.code_ttl_hours),
                override_token_hash: None,
                override_expires_at: None,
            },
        );

        let recipient = match step {
            UnlockStep::PickupSeller => order.seller,
            UnlockStep::DeliveryDriver => order.buyer,
            // The inspector holds the code; before one is assigned the
            // seller does.
            UnlockStep::InspectionInspector => order.inspector.unwrap_or(order.seller),
        };
        notifier.notify(
            recipient,
            NotifyChannel::Sms,
            "Handoff code",
            &format!("Your code for order {} is {code}", order.id),
        );
        tracing::info!(order = %order.id, step = %step, "unlock code issued");
        Ok(code)
    }

    /// Mint a signed QR token for a step, scoped to the scanning role.
    pub fn issue_qr(
        &self,
        order_id: OrderId,
        step: UnlockStep,
        config: &SettlementConfig,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let row = self
            .rows
            .get(&(order_id, step))
            .ok_or(SokoError::UnlockNotFound(step))?;
        if row.is_unlocked() {
            return Err(SokoError::AlreadyUnlocked(step));
        }
        let role = step.scanner_role();
        let expires = (now + Duration::minutes(config.qr_token_ttl_minutes)).timestamp();
        let signature = sign_qr_scope(&config.qr_secret, order_id, step, role, expires)?;
        Ok(format!("{order_id}.{step}.{role}.{expires}.{signature}"))
    }

    /// Verify a scanned QR token and mark the row QR-verified.
    pub fn scan_qr(
        &mut self,
        token: &str,
        presented_role: HandoffRole,
        config: &SettlementConfig,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let parts: Vec<&str> = token.split('.').collect();
        let &[order_part, step_part, role_part, expires_part, signature] = parts.as_slice() else {
            return Err(SokoError::QrTokenInvalid {
                reason: "malformed token".to_string(),
            });
        };

        let order_id: OrderId = order_part.parse().map_err(|_| SokoError::QrTokenInvalid {
            reason: "bad order id".to_string(),
        })?;
        let step = parse_step(step_part).ok_or_else(|| SokoError::QrTokenInvalid {
            reason: "unknown step".to_string(),
        })?;
        let role = parse_role(role_part).ok_or_else(|| SokoError::QrTokenInvalid {
            reason: "unknown role".to_string(),
        })?;
        let expires: i64 = expires_part.parse().map_err(|_| SokoError::QrTokenInvalid {
            reason: "bad expiry".to_string(),
        })?;

        // Signature first: an attacker learns nothing else from a forgery.
        verify_qr_scope(&config.qr_secret, order_id, step, role, expires, signature)?;

        if now.timestamp() > expires {
            return Err(SokoError::QrTokenInvalid {
                reason: "expired".to_string(),
            });
        }
        if role != step.scanner_role() || presented_role != role {
            return Err(SokoError::QrTokenInvalid {
                reason: "role mismatch".to_string(),
            });
        }

        let row = self
            .rows
            .get_mut(&(order_id, step))
            .ok_or(SokoError::UnlockNotFound(step))?;
        if row.is_unlocked() {
            return Err(SokoError::AlreadyUnlocked(step));
        }
        row.qr_verified = true;
        tracing::info!(order = %order_id, step = %step, role = %role, "qr verified");
        Ok(())
    }

    /// Confirm the secret code for a handoff step.
    ///
    /// Check order matters: an already-unlocked or locked-out row answers
    /// before the code is even looked at, and a missing QR verification is
    /// rejected without counting an attempt.
    pub fn confirm(
        &mut self,
        order_id: OrderId,
        step: UnlockStep,
        code: &str,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<SettlementTrigger> {
        let row = self
            .rows
            .get_mut(&(order_id, step))
            .ok_or(SokoError::UnlockNotFound(step))?;

        if row.is_unlocked() {
            return Err(SokoError::AlreadyUnlocked(step));
        }
        if row.locked {
            return Err(SokoError::UnlockLockedOut(step));
        }
        if row.is_expired(now) {
            return Err(SokoError::CodeExpired(step));
        }
        if row.qr_required && !row.qr_verified {
            return Err(SokoError::QrScanRequired(step));
        }

        if row.code_hash != EscrowUnlock::hash_code(order_id, step, code) {
            row.attempts += 1;
            if row.attempts >= max_attempts {
                row.locked = true;
                tracing::warn!(order = %order_id, step = %step, "unlock locked out");
                return Err(SokoError::UnlockLockedOut(step));
            }
            return Err(SokoError::WrongCode {
                attempts_remaining: max_attempts - row.attempts,
            });
        }

        row.unlocked_at = Some(now);
        tracing::info!(order = %order_id, step = %step, "handoff unlocked");
        Ok(SettlementTrigger::for_step(step))
    }

    /// Exchange out-of-band proof of code possession for a short-lived
    /// override token. Does not touch the attempt counter.
    pub fn request_override(
        &mut self,
        order_id: OrderId,
        step: UnlockStep,
        code: &str,
        config: &SettlementConfig,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let row = self
            .rows
            .get_mut(&(order_id, step))
            .ok_or(SokoError::UnlockNotFound(step))?;
        if row.is_unlocked() {
            return Err(SokoError::AlreadyUnlocked(step));
        }
        if row.code_hash != EscrowUnlock::hash_code(order_id, step, code) {
            return Err(SokoError::WrongCode {
                attempts_remaining: config.max_unlock_attempts.saturating_sub(row.attempts),
            });
        }

        let token = random_token();
        row.override_token_hash = Some(hash_override_token(&token));
        row.override_expires_at = Some(now + Duration::minutes(config.override_token_ttl_minutes));
        tracing::info!(order = %order_id, step = %step, "override token issued");
        Ok(token)
    }

    /// Spend an override token to clear a lockout so the handoff can retry.
    pub fn admin_reopen(
        &mut self,
        order_id: OrderId,
        step: UnlockStep,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let row = self
            .rows
            .get_mut(&(order_id, step))
            .ok_or(SokoError::UnlockNotFound(step))?;

        let stored = row
            .override_token_hash
            .ok_or(SokoError::OverrideTokenInvalid)?;
        let live = row
            .override_expires_at
            .is_some_and(|expires| now <= expires);
        if !live || stored != hash_override_token(token) {
            return Err(SokoError::OverrideTokenInvalid);
        }

        row.locked = false;
        row.attempts = 0;
        row.override_token_hash = None;
        row.override_expires_at = None;
        tracing::warn!(order = %order_id, step = %step, "unlock reopened by override");
        Ok(())
    }

    #[must_use]
    pub fn is_unlocked(&self, order_id: OrderId, step: UnlockStep) -> bool {
        self.rows
            .get(&(order_id, step))
            .is_some_and(EscrowUnlock::is_unlocked)
    }

    #[must_use]
    pub fn row(&self, order_id: OrderId, step: UnlockStep) -> Option<&EscrowUnlock> {
        self.rows.get(&(order_id, step))
    }
}

// ---------------------------------------------------------------------
// token plumbing
// ---------------------------------------------------------------------

fn qr_scope(order_id: OrderId, step: UnlockStep, role: HandoffRole, expires: i64) -> String {
    format!("soko:qr:v1:{order_id}:{step}:{role}:{expires}")
}

fn sign_qr_scope(
    secret: &str,
    order_id: OrderId,
    step: UnlockStep,
    role: HandoffRole,
    expires: i64,
) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SokoError::Internal(format!("hmac key: {e}")))?;
    mac.update(qr_scope(order_id, step, role, expires).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn verify_qr_scope(
    secret: &str,
    order_id: OrderId,
    step: UnlockStep,
    role: HandoffRole,
    expires: i64,
    signature: &str,
) -> Result<()> {
    let raw = hex::decode(signature).map_err(|_| SokoError::QrTokenInvalid {
        reason: "bad signature encoding".to_string(),
    })?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SokoError::Internal(format!("hmac key: {e}")))?;
    mac.update(qr_scope(order_id, step, role, expires).as_bytes());
    mac.verify_slice(&raw).map_err(|_| SokoError::QrTokenInvalid {
        reason: "bad signature".to_string(),
    })
}

fn parse_step(s: &str) -> Option<UnlockStep> {
    match s {
        "pickup_seller" => Some(UnlockStep::PickupSeller),
        "delivery_driver" => Some(UnlockStep::DeliveryDriver),
        "inspection_inspector" => Some(UnlockStep::InspectionInspector),
        _ => None,
    }
}

fn parse_role(s: &str) -> Option<HandoffRole> {
    match s {
        "buyer" => Some(HandoffRole::Buyer),
        "seller" => Some(HandoffRole::Seller),
        "courier" => Some(HandoffRole::Courier),
        "inspector" => Some(HandoffRole::Inspector),
        _ => None,
    }
}

fn random_token() -> String {
    let bytes = rand::random::<[u8; 32]>();
    hex::encode(bytes)
}

fn hash_override_token(token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"soko:override:v1:");
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::RecordingNotifier;
    use soko_types::{Minor, UserId};

    fn setup() -> (UnlockManager, Order, SettlementConfig, RecordingNotifier) {
        let manager = UnlockManager::new();
        let order = Order::dummy_declutter(Minor(1_050_000), Minor(150_000));
        let config = SettlementConfig::new(UserId::new()).with_qr_secret("qr-test-secret");
        (manager, order, config, RecordingNotifier::new())
    }

    #[test]
    fn issue_then_confirm_unlocks_once() {
        let (mut unlocks, order, config, mut notifier) = setup();
        let now = Utc::now();
        let code = unlocks
            .issue_code(&order, UnlockStep::PickupSeller, false, &config, &mut notifier, now)
            .unwrap();
        assert_eq!(code.len(), 6);
        assert_eq!(notifier.sent.len(), 1);
        assert_eq!(notifier.sent[0].user, order.seller);

        let trigger = unlocks
            .confirm(order.id, UnlockStep::PickupSeller, &code, 4, now)
            .unwrap();
        assert_eq!(trigger, SettlementTrigger::SaleLeg);
        assert!(unlocks.is_unlocked(order.id, UnlockStep::PickupSeller));

        let err = unlocks
            .confirm(order.id, UnlockStep::PickupSeller, &code, 4, now)
            .unwrap_err();
        assert!(matches!(err, SokoError::AlreadyUnlocked(_)));
    }

    #[test]
    fn reissue_live_code_is_conflict() {
        let (mut unlocks, order, config, mut notifier) = setup();
        let now = Utc::now();
        unlocks
            .issue_code(&order, UnlockStep::DeliveryDriver, false, &config, &mut notifier, now)
            .unwrap();
        let err = unlocks
            .issue_code(&order, UnlockStep::DeliveryDriver, false, &config, &mut notifier, now)
            .unwrap_err();
        assert!(matches!(err, SokoError::CodeAlreadyIssued(_)));

        // Expired code can be reissued.
        let later = now + Duration::hours(config.code_ttl_hours + 1);
        unlocks
            .issue_code(&order, UnlockStep::DeliveryDriver, false, &config, &mut notifier, later)
            .unwrap();
    }

    #[test]
    fn fourth_wrong_code_locks_and_fifth_stays_locked() {
        let (mut unlocks, order, config, mut notifier) = setup();
        let now = Utc::now();
        let code = unlocks
            .issue_code(&order, UnlockStep::PickupSeller, false, &config, &mut notifier, now)
            .unwrap();

        for remaining in [3u32, 2, 1] {
            let err = unlocks
                .confirm(order.id, UnlockStep::PickupSeller, "000000", 4, now)
                .unwrap_err();
            assert!(
                matches!(err, SokoError::WrongCode { attempts_remaining } if attempts_remaining == remaining)
            );
        }
        let err = unlocks
            .confirm(order.id, UnlockStep::PickupSeller, "000000", 4, now)
            .unwrap_err();
        assert!(matches!(err, SokoError::UnlockLockedOut(_)));

        // Even the correct code is refused once locked.
        let err = unlocks
            .confirm(order.id, UnlockStep::PickupSeller, &code, 4, now)
            .unwrap_err();
        assert!(matches!(err, SokoError::UnlockLockedOut(_)));
    }

    #[test]
    fn qr_required_rejects_without_counting_attempt() {
        let (mut unlocks, order, config, mut notifier) = setup();
        let now = Utc::now();
        let code = unlocks
            .issue_code(&order, UnlockStep::DeliveryDriver, true, &config, &mut notifier, now)
            .unwrap();

        let err = unlocks
            .confirm(order.id, UnlockStep::DeliveryDriver, &code, 4, now)
            .unwrap_err();
        assert!(matches!(err, SokoError::QrScanRequired(_)));
        assert_eq!(
            unlocks.row(order.id, UnlockStep::DeliveryDriver).unwrap().attempts,
            0
        );

        let token = unlocks
            .issue_qr(order.id, UnlockStep::DeliveryDriver, &config, now)
            .unwrap();
        unlocks
            .scan_qr(&token, HandoffRole::Buyer, &config, now)
            .unwrap();
        let trigger = unlocks
            .confirm(order.id, UnlockStep::DeliveryDriver, &code, 4, now)
            .unwrap();
        assert_eq!(trigger, SettlementTrigger::FullRelease);
    }

    #[test]
    fn qr_token_rejects_wrong_role_and_tamper() {
        let (mut unlocks, order, config, mut notifier) = setup();
        let now = Utc::now();
        unlocks
            .issue_code(&order, UnlockStep::DeliveryDriver, true, &config, &mut notifier, now)
            .unwrap();
        let token = unlocks
            .issue_qr(order.id, UnlockStep::DeliveryDriver, &config, now)
            .unwrap();

        let err = unlocks
            .scan_qr(&token, HandoffRole::Courier, &config, now)
            .unwrap_err();
        assert!(matches!(err, SokoError::QrTokenInvalid { .. }));

        let mut tampered = token.clone();
        tampered.truncate(token.len() - 2);
        tampered.push_str("00");
        let err = unlocks
            .scan_qr(&tampered, HandoffRole::Buyer, &config, now)
            .unwrap_err();
        assert!(matches!(err, SokoError::QrTokenInvalid { .. }));
    }

    #[test]
    fn qr_token_expires() {
        let (mut unlocks, order, config, mut notifier) = setup();
        let now = Utc::now();
        unlocks
            .issue_code(&order, UnlockStep::DeliveryDriver, true, &config, &mut notifier, now)
            .unwrap();
        let token = unlocks
            .issue_qr(order.id, UnlockStep::DeliveryDriver, &config, now)
            .unwrap();
        let later = now + Duration::minutes(config.qr_token_ttl_minutes + 1);
        let err = unlocks
            .scan_qr(&token, HandoffRole::Buyer, &config, later)
            .unwrap_err();
        assert!(matches!(err, SokoError::QrTokenInvalid { reason } if reason == "expired"));
    }

    #[test]
    fn override_flow_reopens_locked_row() {
        let (mut unlocks, order, config, mut notifier) = setup();
        let now = Utc::now();
        let code = unlocks
            .issue_code(&order, UnlockStep::PickupSeller, false, &config, &mut notifier, now)
            .unwrap();
        for _ in 0..4 {
            let _ = unlocks.confirm(order.id, UnlockStep::PickupSeller, "000000", 4, now);
        }
        assert!(unlocks.row(order.id, UnlockStep::PickupSeller).unwrap().locked);

        // Wrong code earns no token.
        let err = unlocks
            .request_override(order.id, UnlockStep::PickupSeller, "000000", &config, now)
            .unwrap_err();
        assert!(matches!(err, SokoError::WrongCode { .. }));

        let token = unlocks
            .request_override(order.id, UnlockStep::PickupSeller, &code, &config, now)
            .unwrap();

        // A bogus token does not reopen.
        let err = unlocks
            .admin_reopen(order.id, UnlockStep::PickupSeller, "not-the-token", now)
            .unwrap_err();
        assert!(matches!(err, SokoError::OverrideTokenInvalid));

        unlocks
            .admin_reopen(order.id, UnlockStep::PickupSeller, &token, now)
            .unwrap();
        let trigger = unlocks
            .confirm(order.id, UnlockStep::PickupSeller, &code, 4, now)
            .unwrap();
        assert_eq!(trigger, SettlementTrigger::SaleLeg);
    }

    #[test]
    fn override_token_expires() {
        let (mut unlocks, order, config, mut notifier) = setup();
        let now = Utc::now();
        let code = unlocks
            .issue_code(&order, UnlockStep::PickupSeller, false, &config, &mut notifier, now)
            .unwrap();
        let token = unlocks
            .request_override(order.id, UnlockStep::PickupSeller, &code, &config, now)
            .unwrap();
        let later = now + Duration::minutes(config.override_token_ttl_minutes + 1);
        let err = unlocks
            .admin_reopen(order.id, UnlockStep::PickupSeller, &token, later)
            .unwrap_err();
        assert!(matches!(err, SokoError::OverrideTokenInvalid));
    }

    #[test]
    fn expired_code_is_gone() {
        let (mut unlocks, order, config, mut notifier) = setup();
        let now = Utc::now();
        let code = unlocks
            .issue_code(&order, UnlockStep::PickupSeller, false, &config, &mut notifier, now)
            .unwrap();
        let later = now + Duration::hours(config.code_ttl_hours + 1);
        let err = unlocks
            .confirm(order.id, UnlockStep::PickupSeller, &code, 4, later)
            .unwrap_err();
        assert!(matches!(err, SokoError::CodeExpired(_)));
    }

    #[test]
    fn unheld_order_cannot_gate() {
        let (mut unlocks, _, config, mut notifier) = setup();
        let order = Order::dummy_created(Minor(100_000));
        let err = unlocks
            .issue_code(&order, UnlockStep::PickupSeller, false, &config, &mut notifier, Utc::now())
            .unwrap_err();
        assert!(matches!(err, SokoError::OrderPreconditionFailed { .. }));
    }
}
