use crate::{
    entities::commerce::{cart_item, perfume, CartItem, CartItemModel, Perfume, PerfumeModel},
    errors::{is_unique_violation, ServiceError},
    events::{Event, EventSender},
    services::commerce::catalog_service::insufficient_stock,
};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Largest quantity a single cart line may hold
pub const MAX_LINE_QUANTITY: i32 = 99;

/// Per-user shopping cart.
///
/// Lines are validated against live stock when they change, but nothing is
/// reserved: stock is only taken at checkout.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

/// Cart line joined with the perfume's current catalog data
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartLineView {
    pub id: Uuid,
    pub perfume_id: Uuid,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub line_total: Decimal,
    pub perfume: PerfumeModel,
}

impl CartLineView {
    fn new(line: CartItemModel, perfume: PerfumeModel) -> Self {
        Self {
            id: line.id,
            perfume_id: line.perfume_id,
            quantity: line.quantity,
            line_total: Decimal::from(line.quantity) * perfume.price,
            perfume,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub items: Vec<CartLineView>,
    /// Sum of line quantities
    pub item_count: i64,
    /// Priced at today's catalog prices; checkout prices independently
    #[schema(value_type = String)]
    pub total: Decimal,
}

impl CartSummary {
    pub fn from_lines(items: Vec<CartLineView>) -> Self {
        let item_count = items.iter().map(|l| i64::from(l.quantity)).sum();
        let total = Self::live_total(&items);
        Self {
            items,
            item_count,
            total,
        }
    }

    pub fn live_total(items: &[CartLineView]) -> Decimal {
        items
            .iter()
            .map(|l| Decimal::from(l.quantity) * l.perfume.price)
            .sum::<Decimal>()
            .round_dp(2)
    }
}

fn check_quantity(quantity: i32) -> Result<(), ServiceError> {
    if !(1..=MAX_LINE_QUANTITY).contains(&quantity) {
        return Err(ServiceError::ValidationError(format!(
            "quantity must be between 1 and {}",
            MAX_LINE_QUANTITY
        )));
    }
    Ok(())
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    async fn active_perfume(&self, perfume_id: Uuid) -> Result<PerfumeModel, ServiceError> {
        Perfume::find_by_id(perfume_id)
            .filter(perfume::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Perfume", perfume_id))
    }

    async fn find_line(
        &self,
        user_id: Uuid,
        perfume_id: Uuid,
    ) -> Result<Option<CartItemModel>, ServiceError> {
        Ok(CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::PerfumeId.eq(perfume_id))
            .one(&*self.db)
            .await?)
    }

    /// Adds `quantity` units, merging into an existing line for the same
    /// perfume. The boolean is true when a new line was created.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        perfume_id: Uuid,
        quantity: i32,
    ) -> Result<(CartLineView, bool), ServiceError> {
        check_quantity(quantity)?;
        let perfume = self.active_perfume(perfume_id).await?;

        let existing = self.find_line(user_id, perfume_id).await?;
        let already = existing.as_ref().map_or(0, |l| l.quantity);
        let wanted = already + quantity;
        if wanted > MAX_LINE_QUANTITY {
            return Err(ServiceError::ValidationError(format!(
                "a cart line may hold at most {} units",
                MAX_LINE_QUANTITY
            )));
        }
        if !perfume.is_in_stock() || wanted > perfume.stock {
            return Err(insufficient_stock(&perfume));
        }

        let (line, created) = match existing {
            Some(line) => {
                let mut active: cart_item::ActiveModel = line.into();
                active.quantity = Set(wanted);
                (active.update(&*self.db).await?, false)
            }
            None => {
                let insert = cart_item::ActiveModel {
                    user_id: Set(user_id),
                    perfume_id: Set(perfume_id),
                    quantity: Set(quantity),
                    ..Default::default()
                }
                .insert(&*self.db)
                .await;

                match insert {
                    Ok(line) => (line, true),
                    // A concurrent request created the line first; merge into it.
                    Err(e) if is_unique_violation(&e) => {
                        let line = self
                            .find_line(user_id, perfume_id)
                            .await?
                            .ok_or_else(|| ServiceError::DatabaseError(e))?;
                        let merged = line.quantity + quantity;
                        if merged > perfume.stock || merged > MAX_LINE_QUANTITY {
                            return Err(insufficient_stock(&perfume));
                        }
                        let mut active: cart_item::ActiveModel = line.into();
                        active.quantity = Set(merged);
                        (active.update(&*self.db).await?, false)
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        debug!(user_id = %user_id, perfume_id = %perfume_id, quantity = line.quantity, "Cart line saved");
        Ok((CartLineView::new(line, perfume), created))
    }

    /// Overwrites a line's quantity; zero or less removes the line and
    /// returns `None`.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        user_id: Uuid,
        perfume_id: Uuid,
        quantity: i32,
    ) -> Result<Option<CartLineView>, ServiceError> {
        let line = self
            .find_line(user_id, perfume_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Cart item for perfume", perfume_id))?;

        if quantity <= 0 {
            CartItem::delete_by_id(line.id).exec(&*self.db).await?;
            return Ok(None);
        }
        check_quantity(quantity)?;

        let perfume = self.active_perfume(perfume_id).await?;
        if quantity > perfume.stock {
            return Err(insufficient_stock(&perfume));
        }

        let mut active: cart_item::ActiveModel = line.into();
        active.quantity = Set(quantity);
        let line = active.update(&*self.db).await?;
        Ok(Some(CartLineView::new(line, perfume)))
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, perfume_id: Uuid) -> Result<(), ServiceError> {
        let result = CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::PerfumeId.eq(perfume_id))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Cart item for perfume", perfume_id));
        }
        Ok(())
    }

    /// Empties the cart and returns how many lines were removed.
    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let removed = Self::clear_in(&*self.db, user_id).await?;
        info!(user_id = %user_id, removed, "Cart cleared");
        self.event_sender
            .send_or_log(Event::CartCleared {
                user_id,
                lines_removed: removed,
            })
            .await;
        Ok(removed)
    }

    /// Deletes every line of a user's cart on the given connection.
    pub async fn clear_in<C>(conn: &C, user_id: Uuid) -> Result<u64, ServiceError>
    where
        C: ConnectionTrait,
    {
        let result = CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Lines for active perfumes, newest first, with live totals.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartSummary, ServiceError> {
        let rows = CartItem::find()
            .find_also_related(Perfume)
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(perfume::Column::IsActive.eq(true))
            .order_by_desc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let lines = rows
            .into_iter()
            .filter_map(|(line, perfume)| perfume.map(|p| CartLineView::new(line, p)))
            .collect();

        Ok(CartSummary::from_lines(lines))
    }
}
