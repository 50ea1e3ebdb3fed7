use chordelia::middleware::UserIdentity;
use chordelia::models::common::EntitlementTier;
use uuid::Uuid;

#[test]
fn test_user_identity_struct() {
    // Basic test to verify UserIdentity structure works
    let identity = UserIdentity {
        user_id: Uuid::new_v4(),
        tier: EntitlementTier::None,
    };

    assert_eq!(identity.tier, EntitlementTier::None);
}

#[test]
fn test_tier_priorities_are_strictly_ordered() {
    let tiers = [
        EntitlementTier::None,
        EntitlementTier::Monthly,
        EntitlementTier::Annual,
        EntitlementTier::Lifetime,
    ];

    for pair in tiers.windows(2) {
        assert!(pair[0].priority() < pair[1].priority());
    }
}
