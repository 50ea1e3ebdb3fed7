//! Validation pipeline orchestration
//!
//! One inbound request runs one sequential pipeline:
//! fetching → verifying → decoding → mapping → reconciling. Each stage
//! failure is terminal and carries the stage it happened in; nothing is
//! written before the reconciling stage, so an abandoned validation leaves
//! no partial state behind.

use crate::{
    error::{ApiError, Result, ValidationError},
    models::{
        common::{EntitlementTier, StoreEnvironment},
        transaction::{decode_transaction, TransactionRecord},
    },
    services::{
        app_store_client::AppStoreClient, product_catalog::ProductCatalog,
        signature_verifier::SignatureVerifier, subscription_service::SubscriptionService,
    },
};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

/// Result of a successful validation, as surfaced to the caller.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub tier: EntitlementTier,
    pub expires_at: Option<OffsetDateTime>,
    pub is_active: bool,
    pub transaction_id: String,
    pub original_transaction_id: String,
}

pub struct ValidationService {
    app_store: Arc<AppStoreClient>,
    verifier: Arc<SignatureVerifier>,
    catalog: Arc<ProductCatalog>,
    subscriptions: Arc<SubscriptionService>,
    bundle_id: String,
}

impl ValidationService {
    pub fn new(
        app_store: Arc<AppStoreClient>,
        verifier: Arc<SignatureVerifier>,
        catalog: Arc<ProductCatalog>,
        subscriptions: Arc<SubscriptionService>,
        bundle_id: String,
    ) -> Self {
        Self {
            app_store,
            verifier,
            catalog,
            subscriptions,
            bundle_id,
        }
    }

    /// Validate one transaction id for one caller, end to end.
    #[instrument(skip(self))]
    pub async fn validate(&self, transaction_id: &str, user_id: Uuid) -> Result<ValidationOutcome> {
        // The caller must resolve to a known user before any remote work
        self.subscriptions.get_user(user_id).await?;

        // Fetching: remote lookup with ordered environment fallback
        let (jws, environment) = self.app_store.fetch_signed_transaction(transaction_id).await?;

        self.process_signed_payload(&jws, environment, user_id).await
    }

    /// Verifying → Decoding → Mapping → Reconciling for a payload that has
    /// already been fetched from `environment`.
    pub async fn process_signed_payload(
        &self,
        jws: &str,
        environment: StoreEnvironment,
        user_id: Uuid,
    ) -> Result<ValidationOutcome> {
        // Verifying: signature + chain of trust + claim checks
        let payload = self.verifier.verify(jws, &self.bundle_id, environment)?;

        // Decoding: strict schema into the canonical record
        let record = decode_transaction(&payload, environment)?;

        // Mapping: explicit catalog lookup; unknown products are rejected
        // here so reconciliation never runs for them
        let tier = self
            .catalog
            .resolve(&record.product_id)
            .ok_or_else(|| ValidationError::UnknownProduct(record.product_id.clone()))?;

        // Reconciling: atomic upsert + aggregate entitlement recompute
        let outcome = self.reconcile_verified(&record, user_id, tier).await?;

        info!(
            transaction_id = %outcome.transaction_id,
            tier = outcome.tier.as_str(),
            is_active = outcome.is_active,
            "transaction validated"
        );

        Ok(outcome)
    }

    /// Reconciling stage: persist the verified record and refresh the user's
    /// effective entitlement. A failure after this point means an authentic
    /// purchase was not recorded, which is reported as a persistence failure
    /// rather than a validation rejection.
    ///
    /// The write runs on its own task: a caller disconnect cancels the
    /// request future, but a signature-verified transaction must still be
    /// recorded once reconciliation has started.
    pub async fn reconcile_verified(
        &self,
        record: &TransactionRecord,
        user_id: Uuid,
        tier: EntitlementTier,
    ) -> Result<ValidationOutcome> {
        let subscriptions = Arc::clone(&self.subscriptions);
        let record = record.clone();

        let write = tokio::spawn(async move {
            let row = subscriptions.reconcile(&record, user_id, tier).await?;

            subscriptions
                .recompute_effective_entitlement(user_id)
                .await
                .map_err(|e| {
                    ApiError::Validation(ValidationError::Persistence(format!(
                        "entitlement recompute failed: {}",
                        e
                    )))
                })?;

            Ok::<_, ApiError>(ValidationOutcome {
                tier,
                expires_at: row.expires_at,
                is_active: row.is_active,
                transaction_id: row.transaction_id,
                original_transaction_id: row.original_transaction_id,
            })
        });

        write.await.map_err(|e| {
            ApiError::Validation(ValidationError::Persistence(format!(
                "reconciliation task failed: {}",
                e
            )))
        })?
    }
}
