use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One row per store transaction id. Re-validation updates the row in place;
/// `user_id` and `transaction_id` are immutable after insert.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    #[sea_orm(unique)]
    pub transaction_id: String,
    pub original_transaction_id: String,
    pub product_id: String,
    pub tier: String,
    pub environment: String,
    pub purchase_date: TimeDateTimeWithTimeZone,
    pub expires_at: Option<TimeDateTimeWithTimeZone>,
    pub is_active: bool,
    pub auto_renew: bool,
    pub last_validated_at: TimeDateTimeWithTimeZone,
    #[sea_orm(column_type = "Text")]
    pub raw_payload: String,
    pub created_at: TimeDateTimeWithTimeZone,
    pub updated_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    Users,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
