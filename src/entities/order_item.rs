use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, FromJsonQueryResult, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::commerce::perfume;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "order_items")]
#[serde(rename_all = "camelCase")]
#[schema(as = OrderItem)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub perfume_id: Uuid,
    pub quantity: i32,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub unit_price: Decimal,
    /// Always `quantity * unit_price`; recomputed on every save.
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total_price: Decimal,
    #[sea_orm(column_type = "Json")]
    pub snapshot: PerfumeSnapshot,
    pub created_at: DateTime<Utc>,
}

/// Perfume display data frozen at order time. Later catalog edits never
/// reach an existing order.
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct PerfumeSnapshot {
    pub name: String,
    pub brand: String,
    pub image_url: Option<String>,
    pub size_ml: i32,
}

impl From<&perfume::Model> for PerfumeSnapshot {
    fn from(p: &perfume::Model) -> Self {
        Self {
            name: p.name.clone(),
            brand: p.brand.clone(),
            image_url: p.image_url.clone(),
            size_ml: p.size_ml,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
    #[sea_orm(
        belongs_to = "crate::entities::commerce::perfume::Entity",
        from = "Column::PerfumeId",
        to = "crate::entities::commerce::perfume::Column::Id"
    )]
    Perfume,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<perfume::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Perfume.def()
    }
}

/// Line total for a quantity at a unit price.
pub fn line_total(quantity: i32, unit_price: Decimal) -> Decimal {
    Decimal::from(quantity) * unit_price
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        let total = match (
            active_model.quantity.try_as_ref(),
            active_model.unit_price.try_as_ref(),
        ) {
            (Some(quantity), Some(unit_price)) => Some(line_total(*quantity, *unit_price)),
            _ => None,
        };
        match total {
            Some(total) => active_model.total_price = Set(total),
            None if insert => {
                return Err(DbErr::Custom(
                    "order item requires quantity and unit_price".to_string(),
                ))
            }
            None => {}
        }

        if insert {
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(Utc::now());
            }
        }

        Ok(active_model)
    }
}
