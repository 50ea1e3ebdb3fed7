use axum::{extract::State, Json};
use tracing::instrument;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    middleware::UserIdentity,
    models::validate::{
        SubscriptionSummary, ValidateTransactionRequest, ValidateTransactionResponse,
    },
};

/// POST /api/v1/transactions/validate
///
/// Validates a store transaction for the authenticated caller and returns the
/// reconciled subscription:
///
/// ```json
/// {
///   "success": true,
///   "subscription": {
///     "type": "monthly",
///     "expiresDate": "2025-07-01T00:00:00Z",
///     "isActive": true,
///     "transactionId": "2000000123456789",
///     "originalTransactionId": "2000000100000000"
///   }
/// }
/// ```
///
/// Resubmitting the same transaction id is safe: reconciliation updates the
/// existing row instead of creating another one.
#[instrument(skip(state, request))]
pub async fn validate_transaction(
    State(state): State<AppState>,
    identity: UserIdentity,
    Json(request): Json<ValidateTransactionRequest>,
) -> Result<Json<ValidateTransactionResponse>> {
    // Validate request
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let outcome = state
        .validation_service
        .validate(&request.transaction_id, identity.user_id)
        .await?;

    Ok(Json(ValidateTransactionResponse {
        success: true,
        subscription: SubscriptionSummary {
            tier: outcome.tier,
            expires_date: outcome.expires_at,
            is_active: outcome.is_active,
            transaction_id: outcome.transaction_id,
            original_transaction_id: outcome.original_transaction_id,
        },
    }))
}
