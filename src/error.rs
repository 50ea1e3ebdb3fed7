use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Pipeline stage a validation failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStage {
    Fetching,
    Verifying,
    Decoding,
    Mapping,
    Reconciling,
}

impl ValidationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::Verifying => "verifying",
            Self::Decoding => "decoding",
            Self::Mapping => "mapping",
            Self::Reconciling => "reconciling",
        }
    }
}

/// Typed failure of one transaction validation, carrying the failing stage.
///
/// Every variant is terminal for the invocation; the only retry the pipeline
/// performs internally is the environment fallback inside fetching. A client
/// resubmitting the same transaction id is safe because reconciliation is
/// idempotent per transaction id.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("missing App Store credentials: {0}")]
    MissingCredentials(String),

    #[error("transaction {0} not found in any configured environment")]
    TransactionNotFound(String),

    #[error("store rejected service credentials: {0}")]
    StoreAuthentication(String),

    #[error("store request failed: {0}")]
    StoreUnavailable(String),

    #[error("malformed signed payload: expected 3 segments, found {0}")]
    MalformedSignature(usize),

    #[error("signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("claim mismatch: {0}")]
    ClaimMismatch(String),

    #[error("transaction payload rejected: {0}")]
    Decode(String),

    #[error("unknown product identifier: {0}")]
    UnknownProduct(String),

    #[error("failed to record verified transaction: {0}")]
    Persistence(String),
}

impl ValidationError {
    pub fn stage(&self) -> ValidationStage {
        match self {
            Self::MissingCredentials(_)
            | Self::TransactionNotFound(_)
            | Self::StoreAuthentication(_)
            | Self::StoreUnavailable(_) => ValidationStage::Fetching,
            Self::MalformedSignature(_)
            | Self::SignatureVerification(_)
            | Self::ClaimMismatch(_) => ValidationStage::Verifying,
            Self::Decode(_) => ValidationStage::Decoding,
            Self::UnknownProduct(_) => ValidationStage::Mapping,
            Self::Persistence(_) => ValidationStage::Reconciling,
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            Self::MissingCredentials(_) => "App Store credentials are not configured",
            Self::TransactionNotFound(_) => "Transaction not found",
            Self::StoreAuthentication(_) => "App Store rejected the service credentials",
            Self::StoreUnavailable(_) => "App Store request failed",
            Self::MalformedSignature(_) => "Malformed signed payload",
            Self::SignatureVerification(_) => "Signature verification failed",
            Self::ClaimMismatch(_) => "Transaction claims do not match this app",
            Self::Decode(_) => "Transaction payload could not be decoded",
            Self::UnknownProduct(_) => "Unknown product identifier",
            Self::Persistence(_) => "Failed to record the verified transaction",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::MissingCredentials(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::TransactionNotFound(_) => StatusCode::NOT_FOUND,
            Self::StoreAuthentication(_) | Self::StoreUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::MalformedSignature(_)
            | Self::SignatureVerification(_)
            | Self::ClaimMismatch(_)
            | Self::Decode(_)
            | Self::UnknownProduct(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    ExpiredToken,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            ApiError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal database error occurred".to_string(),
                    None,
                )
            }
            ApiError::Validation(ref e) => {
                // A persistence failure means an authentic purchase exists but
                // entitlement was not recorded; keep it distinguishable for
                // alerting, unlike the expected earlier-stage rejections.
                if let ValidationError::Persistence(_) = e {
                    tracing::error!(
                        stage = e.stage().as_str(),
                        "verified transaction could not be recorded: {}",
                        e
                    );
                } else {
                    tracing::warn!(stage = e.stage().as_str(), "validation failed: {}", e);
                }
                (e.status(), e.summary().to_string(), Some(e.to_string()))
            }
            ApiError::BadRequest(ref msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            ApiError::NotFound(ref msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            ApiError::Unauthorized(ref msg) => (StatusCode::UNAUTHORIZED, msg.clone(), None),
            ApiError::InvalidToken(ref msg) => (
                StatusCode::UNAUTHORIZED,
                "Invalid access token".to_string(),
                Some(msg.clone()),
            ),
            ApiError::ExpiredToken => (
                StatusCode::UNAUTHORIZED,
                "Access token expired".to_string(),
                None,
            ),
            ApiError::RateLimitExceeded => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests, please try again later".to_string(),
                None,
            ),
            ApiError::Internal(ref e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let mut body = json!({
            "success": false,
            "error": error,
        });
        if let Some(details) = details {
            body["details"] = json!(details);
        }

        (status, Json(body)).into_response()
    }
}

// Helper type for results
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_variant_maps_to_its_stage() {
        let cases = [
            (
                ValidationError::MissingCredentials("k".into()),
                ValidationStage::Fetching,
            ),
            (
                ValidationError::TransactionNotFound("t".into()),
                ValidationStage::Fetching,
            ),
            (
                ValidationError::StoreAuthentication("401".into()),
                ValidationStage::Fetching,
            ),
            (
                ValidationError::StoreUnavailable("timeout".into()),
                ValidationStage::Fetching,
            ),
            (
                ValidationError::MalformedSignature(2),
                ValidationStage::Verifying,
            ),
            (
                ValidationError::SignatureVerification("bad".into()),
                ValidationStage::Verifying,
            ),
            (
                ValidationError::ClaimMismatch("bundle".into()),
                ValidationStage::Verifying,
            ),
            (
                ValidationError::Decode("missing".into()),
                ValidationStage::Decoding,
            ),
            (
                ValidationError::UnknownProduct("p".into()),
                ValidationStage::Mapping,
            ),
            (
                ValidationError::Persistence("write".into()),
                ValidationStage::Reconciling,
            ),
        ];

        for (err, stage) in cases {
            assert_eq!(err.stage(), stage, "wrong stage for {:?}", err);
        }
    }
}
