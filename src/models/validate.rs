use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use super::common::EntitlementTier;

/// Request body for transaction validation
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTransactionRequest {
    #[validate(length(min = 1, max = 128))]
    pub transaction_id: String,
}

/// Response from successful transaction validation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTransactionResponse {
    pub success: bool,
    pub subscription: SubscriptionSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    #[serde(rename = "type")]
    pub tier: EntitlementTier,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_date: Option<OffsetDateTime>,
    pub is_active: bool,
    pub transaction_id: String,
    pub original_transaction_id: String,
}

/// Response for the effective-entitlement read endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementResponse {
    pub success: bool,
    pub data: EntitlementData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementData {
    pub tier: EntitlementTier,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    pub is_active: bool,
}
