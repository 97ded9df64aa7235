//! Append-only wallet ledger with idempotent references.
//!
//! Many call sites compute a reference string themselves (escrow release,
//! the automation runner, admin tooling), so the same release or refund can
//! fire twice. The ledger treats a (user, kind, reference) collision as
//! "already applied" and returns the existing entry — this is the
//! idempotency boundary that prevents double-crediting.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use soko_types::{
    EntryDirection, EntryId, EntryKind, Minor, Result, SokoError, UserId, WalletLedgerEntry,
};

/// Outcome of a posting attempt.
#[derive(Debug, Clone)]
pub enum PostOutcome {
    /// A new entry was appended.
    Applied(WalletLedgerEntry),
    /// The (user, kind, reference) triple was already posted — no state
    /// change; the existing entry is returned.
    AlreadyApplied(WalletLedgerEntry),
}

impl PostOutcome {
    /// The entry this posting resolved to, new or pre-existing.
    #[must_use]
    pub fn entry(&self) -> &WalletLedgerEntry {
        match self {
            Self::Applied(e) | Self::AlreadyApplied(e) => e,
        }
    }

    /// Whether this call actually moved money.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// The append-only per-user balance ledger.
pub struct WalletLedger {
    /// All entries, in posting order. Never mutated after push.
    entries: Vec<WalletLedgerEntry>,
    /// Cached balance per user, updated on every applied post.
    balances: HashMap<UserId, Minor>,
    /// (user, kind, reference) -> index into `entries`.
    applied: HashMap<(UserId, EntryKind, String), usize>,
}

impl WalletLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            balances: HashMap::new(),
            applied: HashMap::new(),
        }
    }

    /// Append one ledger entry and update the user's cached balance.
    ///
    /// # Errors
    /// - [`SokoError::InsufficientBalance`] when a debit exceeds the balance
    /// - [`SokoError::BalanceOverflow`] when a credit overflows the counter
    pub fn post(
        &mut self,
        user: UserId,
        direction: EntryDirection,
        amount: Minor,
        kind: EntryKind,
        reference: impl Into<String>,
        note: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<PostOutcome> {
        let reference = reference.into();
        let triple = (user, kind, reference.clone());

        if let Some(&idx) = self.applied.get(&triple) {
            tracing::debug!(
                user = %user,
                kind = %kind,
                reference = %reference,
                "ledger posting already applied, returning existing entry"
            );
            return Ok(PostOutcome::AlreadyApplied(self.entries[idx].clone()));
        }

        let current = self.balance(user);
        let balance_after = match direction {
            EntryDirection::Credit => current
                .checked_add(amount)
                .ok_or(SokoError::BalanceOverflow)?,
            EntryDirection::Debit => {
                current
                    .checked_sub(amount)
                    .ok_or(SokoError::InsufficientBalance {
                        needed: amount,
                        available: current,
                    })?
            }
        };

        let entry = WalletLedgerEntry {
            id: EntryId::deterministic(user, kind.as_str(), &reference),
            user,
            direction,
            amount,
            kind,
            reference,
            note: note.into(),
            balance_after,
            created_at: now,
        };

        self.balances.insert(user, balance_after);
        self.applied.insert(triple, self.entries.len());
        self.entries.push(entry.clone());
        Ok(PostOutcome::Applied(entry))
    }

    /// Current cached balance for a user (zero if never posted).
    #[must_use]
    pub fn balance(&self, user: UserId) -> Minor {
        self.balances.get(&user).copied().unwrap_or(Minor::ZERO)
    }

    /// All entries, in posting order.
    #[must_use]
    pub fn entries(&self) -> &[WalletLedgerEntry] {
        &self.entries
    }

    /// All entries for one user, in posting order.
    pub fn entries_for(&self, user: UserId) -> impl Iterator<Item = &WalletLedgerEntry> {
        self.entries.iter().filter(move |e| e.user == user)
    }

    /// Number of posted entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for WalletLedger {
    fn default() -> Self {
        Self::new()
    }
}
