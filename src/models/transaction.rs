use serde::Deserialize;
use time::OffsetDateTime;

use crate::{error::ValidationError, models::common::StoreEnvironment};

/// Signed transaction payload as delivered by the store service.
///
/// Strict schema: required fields must be present with the right types or the
/// payload is rejected at decode time. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransactionPayload {
    pub transaction_id: String,
    pub product_id: String,
    #[serde(default)]
    pub original_transaction_id: Option<String>,
    #[serde(default)]
    pub bundle_id: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub purchase_date: Option<i64>,
    #[serde(default)]
    pub expires_date: Option<i64>,
    #[serde(default)]
    pub signed_date: Option<i64>,
    #[serde(default, rename = "type")]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub in_app_ownership_type: Option<String>,
    #[serde(default)]
    pub quantity: Option<i32>,
}

/// Canonical record produced per validation, consumed by the reconciler.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub transaction_id: String,
    pub original_transaction_id: String,
    pub product_id: String,
    pub purchase_date: OffsetDateTime,
    pub expires_date: Option<OffsetDateTime>,
    pub environment: StoreEnvironment,
    pub signed_date: Option<OffsetDateTime>,
    /// Opaque audit copy of the decoded payload JSON.
    pub raw_payload: String,
}

/// Parse verified payload bytes into a [`TransactionRecord`].
///
/// `environment` is the environment the payload was actually retrieved from,
/// which the verifier has already checked against the embedded claim.
/// Failures here are fatal and non-retryable: a malformed payload cannot
/// become well-formed by retrying.
pub fn decode_transaction(
    payload: &[u8],
    environment: StoreEnvironment,
) -> Result<TransactionRecord, ValidationError> {
    let parsed: SignedTransactionPayload = serde_json::from_slice(payload)
        .map_err(|e| ValidationError::Decode(format!("payload does not match schema: {}", e)))?;

    if parsed.transaction_id.is_empty() {
        return Err(ValidationError::Decode(
            "transactionId is empty".to_string(),
        ));
    }
    if parsed.product_id.is_empty() {
        return Err(ValidationError::Decode("productId is empty".to_string()));
    }

    let purchase_date = match parsed.purchase_date {
        Some(ms) => timestamp_from_ms(ms, "purchaseDate")?,
        None => {
            return Err(ValidationError::Decode(
                "purchaseDate is missing".to_string(),
            ))
        }
    };

    // 0 means a non-expiring purchase, same as an absent field
    let expires_date = match parsed.expires_date {
        None | Some(0) => None,
        Some(ms) => Some(timestamp_from_ms(ms, "expiresDate")?),
    };

    if let Some(expires) = expires_date {
        if expires < purchase_date {
            return Err(ValidationError::Decode(format!(
                "expiresDate {} precedes purchaseDate {}",
                expires, purchase_date
            )));
        }
    }

    let signed_date = match parsed.signed_date {
        None | Some(0) => None,
        Some(ms) => Some(timestamp_from_ms(ms, "signedDate")?),
    };

    // First purchase in a lineage is self-referential
    let original_transaction_id = parsed
        .original_transaction_id
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| parsed.transaction_id.clone());

    Ok(TransactionRecord {
        transaction_id: parsed.transaction_id,
        original_transaction_id,
        product_id: parsed.product_id,
        purchase_date,
        expires_date,
        environment,
        signed_date,
        raw_payload: String::from_utf8_lossy(payload).into_owned(),
    })
}

fn timestamp_from_ms(ms: i64, field: &str) -> Result<OffsetDateTime, ValidationError> {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .map_err(|_| ValidationError::Decode(format!("{} is out of range: {}", field, ms)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn payload(json: &str) -> Vec<u8> {
        json.as_bytes().to_vec()
    }

    #[test]
    fn test_decode_full_payload() {
        let bytes = payload(
            r#"{
                "transactionId": "2000000123456789",
                "originalTransactionId": "2000000100000000",
                "productId": "com.midnightaudio.chordelia.monthly.plan",
                "bundleId": "com.midnightaudio.chordelia",
                "environment": "Production",
                "purchaseDate": 1704067200000,
                "expiresDate": 1706745600000,
                "signedDate": 1704067201000,
                "type": "Auto-Renewable Subscription",
                "inAppOwnershipType": "PURCHASED",
                "quantity": 1
            }"#,
        );

        let record = decode_transaction(&bytes, StoreEnvironment::Production).unwrap();
        assert_eq!(record.transaction_id, "2000000123456789");
        assert_eq!(record.original_transaction_id, "2000000100000000");
        assert_eq!(record.purchase_date, datetime!(2024-01-01 00:00:00 UTC));
        assert_eq!(
            record.expires_date,
            Some(datetime!(2024-02-01 00:00:00 UTC))
        );
        assert_eq!(record.environment, StoreEnvironment::Production);
    }

    #[test]
    fn test_original_transaction_id_defaults_to_transaction_id() {
        let bytes = payload(
            r#"{"transactionId": "T1", "productId": "p", "purchaseDate": 1704067200000}"#,
        );
        let record = decode_transaction(&bytes, StoreEnvironment::Sandbox).unwrap();
        assert_eq!(record.original_transaction_id, "T1");
        assert!(record.expires_date.is_none());
    }

    #[test]
    fn test_missing_product_id_is_rejected() {
        let bytes = payload(r#"{"transactionId": "T1", "purchaseDate": 1704067200000}"#);
        let err = decode_transaction(&bytes, StoreEnvironment::Production).unwrap_err();
        assert!(matches!(err, ValidationError::Decode(_)));
    }

    #[test]
    fn test_missing_purchase_date_is_rejected() {
        let bytes = payload(r#"{"transactionId": "T1", "productId": "p"}"#);
        let err = decode_transaction(&bytes, StoreEnvironment::Production).unwrap_err();
        assert!(matches!(err, ValidationError::Decode(_)));
    }

    #[test]
    fn test_zero_expires_date_means_non_expiring() {
        let bytes = payload(
            r#"{"transactionId": "T1", "productId": "p", "purchaseDate": 1704067200000, "expiresDate": 0}"#,
        );
        let record = decode_transaction(&bytes, StoreEnvironment::Production).unwrap();
        assert!(record.expires_date.is_none());
    }

    #[test]
    fn test_expiry_before_purchase_is_rejected() {
        let bytes = payload(
            r#"{"transactionId": "T1", "productId": "p", "purchaseDate": 1706745600000, "expiresDate": 1704067200000}"#,
        );
        let err = decode_transaction(&bytes, StoreEnvironment::Production).unwrap_err();
        assert!(matches!(err, ValidationError::Decode(_)));
    }

    #[test]
    fn test_non_numeric_timestamp_is_rejected() {
        let bytes = payload(
            r#"{"transactionId": "T1", "productId": "p", "purchaseDate": "2024-01-01"}"#,
        );
        let err = decode_transaction(&bytes, StoreEnvironment::Production).unwrap_err();
        assert!(matches!(err, ValidationError::Decode(_)));
    }
}
