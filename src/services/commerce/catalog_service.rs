use crate::{
    config::AppConfig,
    entities::commerce::{
        perfume::{self, parse_variant},
        Concentration, FragranceFamily, Notes, Perfume, PerfumeCategory, PerfumeModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::page_window,
};
use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    sea_query::{Expr, Func, LikeExpr},
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

pub const DEFAULT_LIMIT: u64 = 20;
const MAX_LIMIT: u64 = 100;
const DEFAULT_FEATURED_LIMIT: u64 = 8;
const MAX_FEATURED_LIMIT: u64 = 50;

/// Perfume catalog: browsing for shoppers, CRUD and stock control for
/// admins.
///
/// Stock is only ever changed through [`CatalogService::decrement_stock`]
/// and [`CatalogService::restock`]. Both are single statements on any
/// connection, so checkout and cancellation can run them inside their own
/// transactions.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl CatalogService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    /// Active perfume by id
    #[instrument(skip(self))]
    pub async fn get_product(&self, perfume_id: Uuid) -> Result<PerfumeModel, ServiceError> {
        Perfume::find_by_id(perfume_id)
            .filter(perfume::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Perfume", perfume_id))
    }

    /// Perfume by id regardless of the active flag, for admin paths
    #[instrument(skip(self))]
    pub async fn get_product_for_update(
        &self,
        perfume_id: Uuid,
    ) -> Result<PerfumeModel, ServiceError> {
        Perfume::find_by_id(perfume_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Perfume", perfume_id))
    }

    /// Filtered, sorted and paginated listing of active perfumes.
    /// Returns the page and the total number of matches.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        query: ProductQuery,
    ) -> Result<(Vec<PerfumeModel>, u64), ServiceError> {
        let window = page_window(query.page, query.limit, DEFAULT_LIMIT, MAX_LIMIT)?;

        let condition = query.condition()?;
        let (sort_column, descending) = query.ordering();

        let base = Perfume::find().filter(condition);
        let total = base.clone().count(&*self.db).await?;

        let ordered = if descending {
            base.order_by_desc(sort_column)
        } else {
            base.order_by_asc(sort_column)
        };
        let items = ordered
            .order_by_asc(perfume::Column::Id)
            .limit(window.limit)
            .offset(window.offset)
            .all(&*self.db)
            .await?;

        Ok((items, total))
    }

    #[instrument(skip(self))]
    pub async fn featured_products(
        &self,
        limit: Option<u64>,
    ) -> Result<Vec<PerfumeModel>, ServiceError> {
        let limit = limit
            .unwrap_or(DEFAULT_FEATURED_LIMIT)
            .clamp(1, MAX_FEATURED_LIMIT);

        Ok(Perfume::find()
            .filter(perfume::Column::IsActive.eq(true))
            .filter(perfume::Column::IsFeatured.eq(true))
            .order_by_desc(perfume::Column::CreatedAt)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }

    /// Active perfumes at or below `threshold` units, scarcest first.
    #[instrument(skip(self))]
    pub async fn low_stock(&self, threshold: Option<i32>) -> Result<Vec<PerfumeModel>, ServiceError> {
        let threshold = threshold.unwrap_or(self.config.low_stock_threshold);
        if threshold < 0 {
            return Err(ServiceError::ValidationError(
                "threshold must not be negative".to_string(),
            ));
        }

        Ok(Perfume::find()
            .filter(perfume::Column::IsActive.eq(true))
            .filter(perfume::Column::Stock.lte(threshold))
            .order_by_asc(perfume::Column::Stock)
            .order_by_asc(perfume::Column::Name)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(
        &self,
        input: CreatePerfumeInput,
    ) -> Result<PerfumeModel, ServiceError> {
        input.validate()?;
        check_launch_year(input.launch_year)?;

        let perfume = perfume::ActiveModel {
            name: Set(input.name.trim().to_string()),
            brand: Set(input.brand.trim().to_string()),
            description: Set(input.description),
            price: Set(input.price),
            original_price: Set(input.original_price),
            category: Set(input.category),
            fragrance_family: Set(input.fragrance_family),
            top_notes: Set(Notes(input.top_notes)),
            middle_notes: Set(Notes(input.middle_notes)),
            base_notes: Set(Notes(input.base_notes)),
            size_ml: Set(input.size_ml),
            stock: Set(input.stock),
            image_url: Set(input.image_url),
            rating: Set(input.rating.unwrap_or(Decimal::ZERO)),
            review_count: Set(input.review_count.unwrap_or(0)),
            is_featured: Set(input.is_featured),
            is_active: Set(true),
            launch_year: Set(input.launch_year),
            concentration: Set(input.concentration),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        info!(perfume_id = %perfume.id, "Created perfume");
        Ok(perfume)
    }

    /// Partial update; absent fields keep their stored value.
    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        perfume_id: Uuid,
        input: UpdatePerfumeInput,
    ) -> Result<PerfumeModel, ServiceError> {
        input.validate()?;
        check_launch_year(input.launch_year)?;
        let existing = self.get_product_for_update(perfume_id).await?;
        let mut active: perfume::ActiveModel = existing.into();

        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(brand) = input.brand {
            active.brand = Set(brand.trim().to_string());
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(original_price) = input.original_price {
            active.original_price = Set(Some(original_price));
        }
        if let Some(category) = input.category {
            active.category = Set(category);
        }
        if let Some(family) = input.fragrance_family {
            active.fragrance_family = Set(family);
        }
        if let Some(notes) = input.top_notes {
            active.top_notes = Set(Notes(notes));
        }
        if let Some(notes) = input.middle_notes {
            active.middle_notes = Set(Notes(notes));
        }
        if let Some(notes) = input.base_notes {
            active.base_notes = Set(Notes(notes));
        }
        if let Some(size_ml) = input.size_ml {
            active.size_ml = Set(size_ml);
        }
        if let Some(stock) = input.stock {
            active.stock = Set(stock);
        }
        if let Some(image_url) = input.image_url {
            active.image_url = Set(Some(image_url));
        }
        if let Some(rating) = input.rating {
            active.rating = Set(rating);
        }
        if let Some(is_featured) = input.is_featured {
            active.is_featured = Set(is_featured);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(launch_year) = input.launch_year {
            active.launch_year = Set(Some(launch_year));
        }
        if let Some(concentration) = input.concentration {
            active.concentration = Set(Some(concentration));
        }

        let updated = active.update(&*self.db).await?;
        info!(perfume_id = %perfume_id, "Updated perfume");
        Ok(updated)
    }

    /// Soft delete. Existing order items keep pointing at the row.
    #[instrument(skip(self))]
    pub async fn deactivate_product(&self, perfume_id: Uuid) -> Result<(), ServiceError> {
        let existing = self.get_product_for_update(perfume_id).await?;
        if !existing.is_active {
            return Ok(());
        }

        let mut active: perfume::ActiveModel = existing.into();
        active.is_active = Set(false);
        active.update(&*self.db).await?;

        info!(perfume_id = %perfume_id, "Deactivated perfume");
        Ok(())
    }

    /// Takes `quantity` units out of stock in one conditional statement.
    ///
    /// Fails with `InsufficientStock` when fewer units remain, and with
    /// `NotFound` when the perfume is missing or inactive. Returns the new
    /// stock level.
    pub async fn decrement_stock<C>(
        conn: &C,
        perfume_id: Uuid,
        quantity: i32,
    ) -> Result<i32, ServiceError>
    where
        C: ConnectionTrait,
    {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "quantity must be positive".to_string(),
            ));
        }

        let result = Perfume::update_many()
            .col_expr(
                perfume::Column::Stock,
                Expr::col(perfume::Column::Stock).sub(quantity),
            )
            .col_expr(perfume::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(perfume::Column::Id.eq(perfume_id))
            .filter(perfume::Column::IsActive.eq(true))
            .filter(perfume::Column::Stock.gte(quantity))
            .exec(conn)
            .await?;

        let current = Perfume::find_by_id(perfume_id).one(conn).await?;
        match current {
            Some(p) if result.rows_affected == 1 => Ok(p.stock),
            Some(p) if p.is_active => {
                metrics::record_stock_conflict();
                warn!(
                    perfume_id = %perfume_id,
                    requested = quantity,
                    available = p.stock,
                    "Stock decrement refused"
                );
                Err(insufficient_stock(&p))
            }
            _ => Err(ServiceError::not_found("Perfume", perfume_id)),
        }
    }

    /// Puts `quantity` units back. Works on inactive perfumes too, so a
    /// cancelled order can always return its stock.
    pub async fn restock<C>(conn: &C, perfume_id: Uuid, quantity: i32) -> Result<i32, ServiceError>
    where
        C: ConnectionTrait,
    {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "quantity must be positive".to_string(),
            ));
        }

        let result = Perfume::update_many()
            .col_expr(
                perfume::Column::Stock,
                Expr::col(perfume::Column::Stock).add(quantity),
            )
            .col_expr(perfume::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(perfume::Column::Id.eq(perfume_id))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Perfume", perfume_id));
        }

        Perfume::find_by_id(perfume_id)
            .one(conn)
            .await?
            .map(|p| p.stock)
            .ok_or_else(|| ServiceError::not_found("Perfume", perfume_id))
    }

    /// Admin stock correction. Never clamps: taking out more than is on
    /// hand fails with `InsufficientStock`.
    #[instrument(skip(self))]
    pub async fn adjust_stock(&self, perfume_id: Uuid, delta: i32) -> Result<PerfumeModel, ServiceError> {
        let new_stock = match delta {
            0 => {
                return Err(ServiceError::ValidationError(
                    "delta must not be zero".to_string(),
                ))
            }
            d if d > 0 => Self::restock(&*self.db, perfume_id, d).await?,
            d => {
                let quantity = d.checked_neg().ok_or_else(|| {
                    ServiceError::ValidationError("delta is out of range".to_string())
                })?;
                Self::decrement_stock(&*self.db, perfume_id, quantity).await?
            }
        };

        info!(perfume_id = %perfume_id, delta, new_stock, "Adjusted stock");
        self.event_sender
            .send_or_log(Event::StockAdjusted {
                perfume_id,
                delta,
                new_stock,
            })
            .await;
        self.notify_if_low(perfume_id, new_stock).await;

        self.get_product_for_update(perfume_id).await
    }

    /// Emits `LowStock` when a level is at or below the configured threshold.
    pub async fn notify_if_low(&self, perfume_id: Uuid, remaining: i32) {
        let threshold = self.config.low_stock_threshold;
        if remaining <= threshold {
            self.event_sender
                .send_or_log(Event::LowStock {
                    perfume_id,
                    remaining,
                    threshold,
                })
                .await;
        }
    }
}

pub(crate) fn insufficient_stock(perfume: &PerfumeModel) -> ServiceError {
    ServiceError::InsufficientStock(format!(
        "only {} unit(s) of '{}' available",
        perfume.stock.max(0),
        perfume.name
    ))
}

/// Catalog listing parameters, as sent by the storefront
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ProductQuery {
    /// 1-based page number
    pub page: Option<u64>,
    /// Page size, 1 to 100
    pub limit: Option<u64>,
    /// `men`, `women`, `unisex` or `all`
    pub category: Option<String>,
    /// Fragrance family name or `all`
    pub fragrance_family: Option<String>,
    /// Case-insensitive substring of the brand
    pub brand: Option<String>,
    #[param(value_type = Option<String>)]
    pub min_price: Option<Decimal>,
    #[param(value_type = Option<String>)]
    pub max_price: Option<Decimal>,
    /// Case-insensitive substring of name, brand or description
    pub search: Option<String>,
    pub featured: Option<bool>,
    /// `name`, `price`, `rating`, `createdAt` or `brand`
    pub sort_by: Option<String>,
    /// `asc` or `desc`
    pub sort_order: Option<String>,
}

impl ProductQuery {
    fn condition(&self) -> Result<Condition, ServiceError> {
        let mut condition = Condition::all().add(perfume::Column::IsActive.eq(true));

        if let Some(category) = filter_value(&self.category) {
            let category = parse_variant::<PerfumeCategory>(category).ok_or_else(|| {
                ServiceError::ValidationError(format!("unknown category '{}'", category))
            })?;
            condition = condition.add(perfume::Column::Category.eq(category));
        }
        if let Some(family) = filter_value(&self.fragrance_family) {
            let family = parse_variant::<FragranceFamily>(family).ok_or_else(|| {
                ServiceError::ValidationError(format!("unknown fragrance family '{}'", family))
            })?;
            condition = condition.add(perfume::Column::FragranceFamily.eq(family));
        }
        if let Some(brand) = non_blank(&self.brand) {
            condition = condition.add(ilike(perfume::Column::Brand, brand));
        }
        if let Some(min) = self.min_price {
            condition = condition.add(perfume::Column::Price.gte(min));
        }
        if let Some(max) = self.max_price {
            condition = condition.add(perfume::Column::Price.lte(max));
        }
        if let Some(search) = non_blank(&self.search) {
            condition = condition.add(
                Condition::any()
                    .add(ilike(perfume::Column::Name, search))
                    .add(ilike(perfume::Column::Brand, search))
                    .add(ilike(perfume::Column::Description, search)),
            );
        }
        if self.featured == Some(true) {
            condition = condition.add(perfume::Column::IsFeatured.eq(true));
        }

        Ok(condition)
    }

    /// Unknown sort fields fall back to newest first.
    fn ordering(&self) -> (perfume::Column, bool) {
        let column = match self.sort_by.as_deref().map(str::trim) {
            Some("name") => perfume::Column::Name,
            Some("price") => perfume::Column::Price,
            Some("rating") => perfume::Column::Rating,
            Some("brand") => perfume::Column::Brand,
            _ => perfume::Column::CreatedAt,
        };
        let descending = !self
            .sort_order
            .as_deref()
            .map(|o| o.trim().eq_ignore_ascii_case("asc"))
            .unwrap_or(false);
        (column, descending)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn filter_value(value: &Option<String>) -> Option<&str> {
    non_blank(value).filter(|v| !v.eq_ignore_ascii_case("all"))
}

/// `LOWER(column) LIKE %needle%` with LIKE wildcards in the needle escaped
fn ilike(column: perfume::Column, needle: &str) -> sea_orm::sea_query::SimpleExpr {
    let escaped = needle
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Expr::expr(Func::lower(Expr::col(column)))
        .like(LikeExpr::new(format!("%{}%", escaped)).escape('\\'))
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price < dec!(0.01) {
        let mut err = ValidationError::new("price");
        err.message = Some("price must be at least 0.01".into());
        return Err(err);
    }
    // Trailing zeros are fine; sub-cent digits are not.
    if price.normalize().scale() > 2 {
        let mut err = ValidationError::new("price");
        err.message = Some("price must not have more than 2 decimal places".into());
        return Err(err);
    }
    Ok(())
}

fn validate_non_negative_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price < Decimal::ZERO {
        let mut err = ValidationError::new("original_price");
        err.message = Some("original price must not be negative".into());
        return Err(err);
    }
    Ok(())
}

fn validate_rating(rating: &Decimal) -> Result<(), ValidationError> {
    if *rating < Decimal::ZERO || *rating > dec!(5) {
        let mut err = ValidationError::new("rating");
        err.message = Some("rating must be between 0 and 5".into());
        return Err(err);
    }
    Ok(())
}

/// Upper bound of `launch_year` moves with the calendar, so it is checked
/// outside the derive.
fn check_launch_year(year: Option<i32>) -> Result<(), ServiceError> {
    match year {
        Some(year) if year > Utc::now().year() => Err(ServiceError::ValidationError(
            "launch_year: launch year must be between 1900 and the current year".to_string(),
        )),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePerfumeInput {
    #[validate(length(min = 2, max = 100, message = "name must be 2-100 characters"))]
    pub name: String,
    #[validate(length(min = 2, max = 50, message = "brand must be 2-50 characters"))]
    pub brand: String,
    #[validate(length(min = 1, message = "description is required"))]
    pub description: String,
    #[validate(custom = "validate_price")]
    #[schema(value_type = String, example = "89.99")]
    pub price: Decimal,
    #[validate(custom = "validate_non_negative_price")]
    #[schema(value_type = Option<String>)]
    pub original_price: Option<Decimal>,
    pub category: PerfumeCategory,
    pub fragrance_family: FragranceFamily,
    #[serde(default)]
    pub top_notes: Vec<String>,
    #[serde(default)]
    pub middle_notes: Vec<String>,
    #[serde(default)]
    pub base_notes: Vec<String>,
    #[validate(range(min = 1, max = 1000, message = "size must be 1-1000 ml"))]
    pub size_ml: i32,
    #[validate(range(min = 0, message = "stock must not be negative"))]
    pub stock: i32,
    #[validate(url(message = "image url must be a valid URL"))]
    pub image_url: Option<String>,
    #[validate(custom = "validate_rating")]
    #[schema(value_type = Option<String>)]
    pub rating: Option<Decimal>,
    #[validate(range(min = 0, message = "review count must not be negative"))]
    pub review_count: Option<i32>,
    #[serde(default)]
    pub is_featured: bool,
    #[validate(range(
        min = 1900,
        message = "launch year must be between 1900 and the current year"
    ))]
    pub launch_year: Option<i32>,
    pub concentration: Option<Concentration>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePerfumeInput {
    #[validate(length(min = 2, max = 100, message = "name must be 2-100 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 2, max = 50, message = "brand must be 2-50 characters"))]
    pub brand: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "validate_price")]
    #[schema(value_type = Option<String>)]
    pub price: Option<Decimal>,
    #[validate(custom = "validate_non_negative_price")]
    #[schema(value_type = Option<String>)]
    pub original_price: Option<Decimal>,
    pub category: Option<PerfumeCategory>,
    pub fragrance_family: Option<FragranceFamily>,
    pub top_notes: Option<Vec<String>>,
    pub middle_notes: Option<Vec<String>>,
    pub base_notes: Option<Vec<String>>,
    #[validate(range(min = 1, max = 1000, message = "size must be 1-1000 ml"))]
    pub size_ml: Option<i32>,
    #[validate(range(min = 0, message = "stock must not be negative"))]
    pub stock: Option<i32>,
    #[validate(url(message = "image url must be a valid URL"))]
    pub image_url: Option<String>,
    #[validate(custom = "validate_rating")]
    #[schema(value_type = Option<String>)]
    pub rating: Option<Decimal>,
    pub is_featured: Option<bool>,
    pub is_active: Option<bool>,
    #[validate(range(
        min = 1900,
        message = "launch year must be between 1900 and the current year"
    ))]
    pub launch_year: Option<i32>,
    pub concentration: Option<Concentration>,
}
