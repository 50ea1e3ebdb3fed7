use axum::{extract::State, Json};
use time::OffsetDateTime;
use tracing::instrument;

use crate::{
    app_state::AppState,
    error::Result,
    middleware::UserIdentity,
    models::{
        common::EntitlementTier,
        validate::{EntitlementData, EntitlementResponse},
    },
    services::SubscriptionService,
};

/// GET /api/v1/entitlement
///
/// Returns the caller's aggregate effective entitlement, as maintained by
/// the reconciler after every validated purchase. Feature gating reads this.
#[instrument(skip(state, identity))]
pub async fn get_entitlement(
    State(state): State<AppState>,
    identity: UserIdentity,
) -> Result<Json<EntitlementResponse>> {
    let user = state
        .subscription_service
        .get_user(identity.user_id)
        .await?;

    let tier = EntitlementTier::from_str(&user.effective_tier).unwrap_or(EntitlementTier::None);
    let is_active = SubscriptionService::compute_is_active(
        tier,
        user.entitlement_expires_at,
        OffsetDateTime::now_utc(),
    );

    Ok(Json(EntitlementResponse {
        success: true,
        data: EntitlementData {
            tier,
            expires_at: user.entitlement_expires_at,
            is_active,
        },
    }))
}
