use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, FromJsonQueryResult, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Perfume catalog entry
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "perfumes")]
#[serde(rename_all = "camelCase")]
#[schema(as = Perfume)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub brand: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub original_price: Option<Decimal>,
    pub category: PerfumeCategory,
    pub fragrance_family: FragranceFamily,
    #[sea_orm(column_type = "Json")]
    pub top_notes: Notes,
    #[sea_orm(column_type = "Json")]
    pub middle_notes: Notes,
    #[sea_orm(column_type = "Json")]
    pub base_notes: Notes,
    pub size_ml: i32,
    pub stock: i32,
    pub image_url: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((3, 2)))")]
    pub rating: Decimal,
    pub review_count: i32,
    pub is_featured: bool,
    pub is_active: bool,
    pub launch_year: Option<i32>,
    pub concentration: Option<Concentration>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn is_in_stock(&self) -> bool {
        self.stock > 0
    }

    /// Whole-percent markdown from `original_price`, 0 when not discounted.
    pub fn discount_percentage(&self) -> u32 {
        match self.original_price {
            Some(original) if original > self.price && original > Decimal::ZERO => {
                let pct = (original - self.price) / original * Decimal::ONE_HUNDRED;
                pct.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                    .try_into()
                    .unwrap_or(0)
            }
            _ => 0,
        }
    }
}

/// Ordered list of fragrance notes stored as a JSON array
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema,
)]
pub struct Notes(pub Vec<String>);

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
    #[sea_orm(has_many = "crate::entities::order_item::Entity")]
    OrderItems,
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl Related<crate::entities::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(now);
            }
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
        }
        active_model.updated_at = Set(now);

        Ok(active_model)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    strum::AsRefStr,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PerfumeCategory {
    #[sea_orm(string_value = "men")]
    Men,
    #[sea_orm(string_value = "women")]
    Women,
    #[sea_orm(string_value = "unisex")]
    Unisex,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    strum::AsRefStr,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FragranceFamily {
    #[sea_orm(string_value = "floral")]
    Floral,
    #[sea_orm(string_value = "oriental")]
    Oriental,
    #[sea_orm(string_value = "woody")]
    Woody,
    #[sea_orm(string_value = "fresh")]
    Fresh,
    #[sea_orm(string_value = "citrus")]
    Citrus,
    #[sea_orm(string_value = "fruity")]
    Fruity,
    #[sea_orm(string_value = "spicy")]
    Spicy,
    #[sea_orm(string_value = "aquatic")]
    Aquatic,
    #[sea_orm(string_value = "gourmand")]
    Gourmand,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    strum::AsRefStr,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Concentration {
    #[sea_orm(string_value = "parfum")]
    Parfum,
    #[sea_orm(string_value = "eau_de_parfum")]
    EauDeParfum,
    #[sea_orm(string_value = "eau_de_toilette")]
    EauDeToilette,
    #[sea_orm(string_value = "eau_de_cologne")]
    EauDeCologne,
    #[sea_orm(string_value = "eau_fraiche")]
    EauFraiche,
}

/// Parses the wire name of a string-backed enum (`"eau_de_parfum"`).
pub fn parse_variant<E>(value: &str) -> Option<E>
where
    E: sea_orm::Iterable + AsRef<str>,
{
    let needle = value.trim();
    E::iter().find(|variant| variant.as_ref().eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample(price: Decimal, original: Option<Decimal>, stock: i32) -> Model {
        let now = Utc::now();
        Model {
            id: Uuid::new_v4(),
            name: "Aventus".into(),
            brand: "Creed".into(),
            description: "Pineapple and birch".into(),
            price,
            original_price: original,
            category: PerfumeCategory::Men,
            fragrance_family: FragranceFamily::Fruity,
            top_notes: Notes(vec!["pineapple".into()]),
            middle_notes: Notes::default(),
            base_notes: Notes::default(),
            size_ml: 100,
            stock,
            image_url: None,
            rating: dec!(4.5),
            review_count: 12,
            is_featured: false,
            is_active: true,
            launch_year: Some(2010),
            concentration: Some(Concentration::EauDeParfum),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn discount_percentage_rounds_to_whole_percent() {
        assert_eq!(sample(dec!(80), Some(dec!(120)), 1).discount_percentage(), 33);
        assert_eq!(sample(dec!(50), Some(dec!(100)), 1).discount_percentage(), 50);
        assert_eq!(sample(dec!(100), Some(dec!(90)), 1).discount_percentage(), 0);
        assert_eq!(sample(dec!(100), None, 1).discount_percentage(), 0);
    }

    #[test]
    fn in_stock_means_positive_stock() {
        assert!(sample(dec!(10), None, 1).is_in_stock());
        assert!(!sample(dec!(10), None, 0).is_in_stock());
    }

    #[test]
    fn wire_names_parse_back() {
        assert_eq!(
            parse_variant::<Concentration>("eau_de_parfum"),
            Some(Concentration::EauDeParfum)
        );
        assert_eq!(
            parse_variant::<PerfumeCategory>("Unisex"),
            Some(PerfumeCategory::Unisex)
        );
        assert_eq!(parse_variant::<FragranceFamily>("musky"), None);
    }
}
