use crate::{
    error::{ApiError, Result, ValidationError},
    models::{
        common::EntitlementTier, subscription_ext::SubscriptionExt, transaction::TransactionRecord,
    },
};
use entity::{subscriptions, users};
use sea_orm::{
    entity::*,
    query::*,
    sea_query::{Expr, OnConflict},
    DatabaseConnection,
};
use std::cmp::Ordering;
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

pub struct SubscriptionService {
    db: DatabaseConnection,
}

impl SubscriptionService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Whether a subscription grants entitlement at `now`.
    ///
    /// Lifetime is always active and ignores expiry; every other tier is
    /// active iff its expiry is strictly in the future.
    pub fn compute_is_active(
        tier: EntitlementTier,
        expires_at: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) -> bool {
        match tier {
            EntitlementTier::Lifetime => true,
            EntitlementTier::None => false,
            _ => expires_at.map(|at| at > now).unwrap_or(false),
        }
    }

    /// Idempotently merge one verified transaction into durable state.
    ///
    /// The row is keyed by `transaction_id` alone; the unique index makes the
    /// insert-or-update a single atomic statement, so concurrent validations
    /// of the same id converge on one row. Owner and identity columns are
    /// never overwritten on conflict.
    #[instrument(skip(self, record), fields(transaction_id = %record.transaction_id))]
    pub async fn reconcile(
        &self,
        record: &TransactionRecord,
        user_id: Uuid,
        tier: EntitlementTier,
    ) -> std::result::Result<subscriptions::Model, ValidationError> {
        let now = OffsetDateTime::now_utc();
        let expires_at = if tier.expires() {
            record.expires_date
        } else {
            None
        };
        let is_active = Self::compute_is_active(tier, expires_at, now);
        // The renewal flag travels in the renewal-info payload, which this
        // pipeline does not consume; expiring tiers default to renewing.
        let auto_renew = tier.expires();

        let new_row = subscriptions::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            transaction_id: Set(record.transaction_id.clone()),
            original_transaction_id: Set(record.original_transaction_id.clone()),
            product_id: Set(record.product_id.clone()),
            tier: Set(tier.as_str().to_string()),
            environment: Set(record.environment.as_str().to_string()),
            purchase_date: Set(record.purchase_date),
            expires_at: Set(expires_at),
            is_active: Set(is_active),
            auto_renew: Set(auto_renew),
            last_validated_at: Set(now),
            raw_payload: Set(record.raw_payload.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let persisted = subscriptions::Entity::insert(new_row)
            .on_conflict(
                OnConflict::column(subscriptions::Column::TransactionId)
                    .update_columns([
                        subscriptions::Column::Tier,
                        subscriptions::Column::ExpiresAt,
                        subscriptions::Column::IsActive,
                        subscriptions::Column::AutoRenew,
                        subscriptions::Column::LastValidatedAt,
                        subscriptions::Column::RawPayload,
                        subscriptions::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_with_returning(&self.db)
            .await
            .map_err(|e| ValidationError::Persistence(e.to_string()))?;

        info!(
            user_id = %persisted.user_id,
            tier = tier.as_str(),
            is_active,
            "reconciled subscription"
        );

        Ok(persisted)
    }

    /// Recompute and persist the user's aggregate effective entitlement: the
    /// highest-priority live subscription, ties broken by later expiry. This
    /// is the value downstream feature gating reads.
    #[instrument(skip(self))]
    pub async fn recompute_effective_entitlement(
        &self,
        user_id: Uuid,
    ) -> Result<(EntitlementTier, Option<OffsetDateTime>)> {
        let now = OffsetDateTime::now_utc();

        let rows = subscriptions::Entity::find()
            .filter(subscriptions::Column::UserId.eq(user_id))
            .all(&self.db)
            .await?;

        let mut best_tier = EntitlementTier::None;
        let mut best_expiry: Option<OffsetDateTime> = None;

        for row in &rows {
            if !row.is_live_at(now) {
                continue;
            }
            let tier = row.entitlement_tier();
            let replaces = match tier.priority().cmp(&best_tier.priority()) {
                Ordering::Greater => true,
                Ordering::Less => false,
                Ordering::Equal => match (row.expires_at, best_expiry) {
                    (Some(candidate), Some(current)) => candidate > current,
                    (None, Some(_)) => true,
                    _ => false,
                },
            };
            if replaces {
                best_tier = tier;
                best_expiry = if tier.expires() { row.expires_at } else { None };
            }
        }

        users::Entity::update_many()
            .filter(users::Column::Id.eq(user_id))
            .col_expr(
                users::Column::EffectiveTier,
                Expr::value(best_tier.as_str()),
            )
            .col_expr(users::Column::EntitlementExpiresAt, Expr::value(best_expiry))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .exec(&self.db)
            .await?;

        info!(
            tier = best_tier.as_str(),
            "recomputed effective entitlement"
        );

        Ok((best_tier, best_expiry))
    }

    /// Look up the owning user row; validation refuses callers without one.
    pub async fn get_user(&self, user_id: Uuid) -> Result<users::Model> {
        users::Entity::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ApiError::NotFound("User profile not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_lifetime_is_always_active() {
        let now = datetime!(2024-06-15 12:00:00 UTC);
        assert!(SubscriptionService::compute_is_active(
            EntitlementTier::Lifetime,
            None,
            now
        ));
        // Even a stale expiry on the row cannot deactivate a lifetime tier
        assert!(SubscriptionService::compute_is_active(
            EntitlementTier::Lifetime,
            Some(datetime!(2020-01-01 00:00:00 UTC)),
            now
        ));
    }

    #[test]
    fn test_expiring_tiers_compare_against_now() {
        let now = datetime!(2024-06-15 12:00:00 UTC);
        assert!(SubscriptionService::compute_is_active(
            EntitlementTier::Monthly,
            Some(datetime!(2024-07-01 00:00:00 UTC)),
            now
        ));
        assert!(!SubscriptionService::compute_is_active(
            EntitlementTier::Monthly,
            Some(datetime!(2024-02-01 00:00:00 UTC)),
            now
        ));
        assert!(!SubscriptionService::compute_is_active(
            EntitlementTier::Annual,
            None,
            now
        ));
    }

    #[test]
    fn test_expiry_exactly_now_is_inactive() {
        let now = datetime!(2024-06-15 12:00:00 UTC);
        assert!(!SubscriptionService::compute_is_active(
            EntitlementTier::Monthly,
            Some(now),
            now
        ));
    }
}
