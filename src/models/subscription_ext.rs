/// Extension methods for the subscriptions entity
///
/// Business accessors that complement the plain column definitions in
/// entity/src/subscriptions.rs
use entity::subscriptions;
use time::OffsetDateTime;

use super::common::EntitlementTier;

pub trait SubscriptionExt {
    /// Tier as stored on the row; unrecognized values degrade to `None`.
    fn entitlement_tier(&self) -> EntitlementTier;

    /// Whether the row grants entitlement at `now`, independent of the
    /// persisted `is_active` snapshot.
    fn is_live_at(&self, now: OffsetDateTime) -> bool;
}

impl SubscriptionExt for subscriptions::Model {
    fn entitlement_tier(&self) -> EntitlementTier {
        EntitlementTier::from_str(&self.tier).unwrap_or(EntitlementTier::None)
    }

    fn is_live_at(&self, now: OffsetDateTime) -> bool {
        match self.entitlement_tier() {
            EntitlementTier::Lifetime => true,
            EntitlementTier::None => false,
            _ => self.expires_at.map(|at| at > now).unwrap_or(false),
        }
    }
}
