//! Collaborator traits: the seams to subsystems the settlement core does
//! not own.
//!
//! Listings, notification delivery, and feature flags live elsewhere; the
//! core only needs the narrow capability each trait names. In-memory
//! implementations below back tests and demos.

use std::collections::HashMap;

use soko_commission::AccountRole;
use soko_types::{ListingId, Minor, SaleKind, UserId};

/// What the core needs to know about a listing to price and validate an
/// order against it.
#[derive(Debug, Clone, Copy)]
pub struct ListingInfo {
    pub owner: UserId,
    pub active: bool,
    /// Listing base price in minor units.
    pub price: Minor,
    pub sale_kind: SaleKind,
    pub seller_role: AccountRole,
    pub top_tier_seller: bool,
}

/// Read access to the listing catalogue.
pub trait ListingDirectory {
    fn listing(&self, id: ListingId) -> Option<ListingInfo>;
}

/// Delivery channel for an outbound notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyChannel {
    Sms,
    Push,
    Email,
}

/// Outbound notification sink. Enqueue-only; delivery is someone else's
/// problem and must never block a settlement transition.
pub trait Notifier {
    fn notify(&mut self, user: UserId, channel: NotifyChannel, title: &str, message: &str);
}

/// Runtime feature flags the core consults.
pub trait FeatureFlags {
    /// Gates the escrow automation sweep.
    fn automation_enabled(&self) -> bool;
}

// ---------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------

/// Listing directory backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryListings {
    listings: HashMap<ListingId, ListingInfo>,
}

impl InMemoryListings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ListingId, info: ListingInfo) {
        self.listings.insert(id, info);
    }
}

impl ListingDirectory for InMemoryListings {
    fn listing(&self, id: ListingId) -> Option<ListingInfo> {
        self.listings.get(&id).copied()
    }
}

/// One enqueued notification, kept for assertions.
#[derive(Debug, Clone)]
pub struct Notification {
    pub user: UserId,
    pub channel: NotifyChannel,
    pub title: String,
    pub message: String,
}

/// Notifier that records everything it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub sent: Vec<Notification>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&mut self, user: UserId, channel: NotifyChannel, title: &str, message: &str) {
        self.sent.push(Notification {
            user,
            channel,
            title: title.to_string(),
            message: message.to_string(),
        });
    }
}

/// Fixed flag values.
#[derive(Debug, Clone, Copy)]
pub struct StaticFlags {
    pub automation: bool,
}

impl Default for StaticFlags {
    fn default() -> Self {
        Self { automation: true }
    }
}

impl FeatureFlags for StaticFlags {
    fn automation_enabled(&self) -> bool {
        self.automation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soko_types::SellerTier;

    #[test]
    fn in_memory_listing_lookup() {
        let mut listings = InMemoryListings::new();
        let id = ListingId::new();
        listings.insert(
            id,
            ListingInfo {
                owner: UserId::new(),
                active: true,
                price: Minor(1_000_000),
                sale_kind: SaleKind::Declutter,
                seller_role: AccountRole::Merchant,
                top_tier_seller: false,
            },
        );
        let info = listings.listing(id).unwrap();
        assert!(info.active);
        assert_eq!(info.price, Minor(1_000_000));
        assert!(listings.listing(ListingId::new()).is_none());
    }

    #[test]
    fn recording_notifier_captures() {
        let mut notifier = RecordingNotifier::new();
        let user = UserId::new();
        notifier.notify(user, NotifyChannel::Sms, "Pickup code", "482913");
        assert_eq!(notifier.sent.len(), 1);
        assert_eq!(notifier.sent[0].user, user);
        assert_eq!(notifier.sent[0].message, "482913");
    }

    #[test]
    fn merchant_role_classifies_as_merchant() {
        assert_eq!(
            soko_commission::classify_seller(AccountRole::Merchant),
            SellerTier::Merchant
        );
    }
}
