use crate::{
    config::AppConfig,
    db::with_transaction,
    entities::order::{self, Entity as OrderEntity, Model as OrderModel},
    entities::order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel},
    entities::{OrderStatus, PaymentStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::commerce::catalog_service::CatalogService,
    services::order_status::{apply_transition, check_transition},
    services::page_window,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveEnum, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

pub const USER_DEFAULT_LIMIT: u64 = 10;
const USER_MAX_LIMIT: u64 = 50;
const MAX_TRACKING_NUMBER_LEN: usize = 100;

/// Who is asking. Shoppers only see their own orders; admins see all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub is_admin: bool,
}

impl Actor {
    pub fn customer(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }

    fn can_see(&self, order: &OrderModel) -> bool {
        self.is_admin || order.user_id == self.user_id
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

/// Admin listing filter. Dates bound `created_at` inclusively.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// Admin status change request
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub status: Option<OrderStatus>,
    pub reason: Option<String>,
    pub tracking_number: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

/// Order lifecycle after checkout: reads, cancellation and the admin
/// status and payment updates.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

/// Flips `status` to `to` only if it is still one of `from`. Zero rows
/// means another request changed the order first.
async fn claim_status<C>(
    conn: &C,
    order_id: Uuid,
    from: &[OrderStatus],
    to: OrderStatus,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let result = OrderEntity::update_many()
        .col_expr(order::Column::Status, Expr::value(to.to_value()))
        .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(order::Column::Id.eq(order_id))
        .filter(order::Column::Status.is_in(from.iter().copied()))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::Conflict(
            "Order status changed concurrently, reload and retry".to_string(),
        ));
    }
    Ok(())
}

impl OrderService {
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

    async fn load(&self, actor: &Actor, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        // Someone else's order is reported as missing, not forbidden.
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .filter(|o| actor.can_see(o))
            .ok_or_else(|| ServiceError::not_found("Order", order_id))
    }

    async fn items_for<C>(conn: &C, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItemModel>>, ServiceError>
    where
        C: ConnectionTrait,
    {
        let mut grouped: HashMap<Uuid, Vec<OrderItemModel>> = HashMap::new();
        if order_ids.is_empty() {
            return Ok(grouped);
        }
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids.iter().copied()))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(conn)
            .await?;
        for item in items {
            grouped.entry(item.order_id).or_default().push(item);
        }
        Ok(grouped)
    }

    async fn attach_items(&self, orders: Vec<OrderModel>) -> Result<Vec<OrderWithItems>, ServiceError> {
        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut items = Self::items_for(&*self.db, &ids).await?;
        Ok(orders
            .into_iter()
            .map(|order| OrderWithItems {
                items: items.remove(&order.id).unwrap_or_default(),
                order,
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, actor: &Actor, order_id: Uuid) -> Result<OrderWithItems, ServiceError> {
        let order = self.load(actor, order_id).await?;
        let mut with_items = self.attach_items(vec![order]).await?;
        with_items
            .pop()
            .ok_or_else(|| ServiceError::not_found("Order", order_id))
    }

    /// The user's orders, newest first
    #[instrument(skip(self))]
    pub async fn list_user_orders(
        &self,
        user_id: Uuid,
        page: Option<u64>,
        limit: Option<u64>,
        status: Option<OrderStatus>,
    ) -> Result<(Vec<OrderWithItems>, u64), ServiceError> {
        let window = page_window(page, limit, USER_DEFAULT_LIMIT, USER_MAX_LIMIT)?;

        let mut query = OrderEntity::find().filter(order::Column::UserId.eq(user_id));
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }

        let total = query.clone().count(&*self.db).await?;
        let orders = query
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::OrderNumber)
            .limit(window.limit)
            .offset(window.offset)
            .all(&*self.db)
            .await?;

        Ok((self.attach_items(orders).await?, total))
    }

    /// Every order matching the filter, newest first
    #[instrument(skip(self))]
    pub async fn list_all_orders(
        &self,
        filter: OrderFilter,
    ) -> Result<(Vec<OrderWithItems>, u64), ServiceError> {
        let window = page_window(
            filter.page,
            filter.limit,
            u64::from(self.config.api_default_page_size),
            u64::from(self.config.api_max_page_size),
        )?;
        if let (Some(start), Some(end)) = (filter.start_date, filter.end_date) {
            if start > end {
                return Err(ServiceError::ValidationError(
                    "startDate must not be after endDate".to_string(),
                ));
            }
        }

        let mut condition = Condition::all();
        if let Some(status) = filter.status {
            condition = condition.add(order::Column::Status.eq(status));
        }
        if let Some(payment_status) = filter.payment_status {
            condition = condition.add(order::Column::PaymentStatus.eq(payment_status));
        }
        if let Some(start) = filter.start_date {
            condition = condition.add(order::Column::CreatedAt.gte(start));
        }
        if let Some(end) = filter.end_date {
            condition = condition.add(order::Column::CreatedAt.lte(end));
        }

        let query = OrderEntity::find().filter(condition);
        let total = query.clone().count(&*self.db).await?;
        let orders = query
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::OrderNumber)
            .limit(window.limit)
            .offset(window.offset)
            .all(&*self.db)
            .await?;

        Ok((self.attach_items(orders).await?, total))
    }

    /// Cancels a pending or confirmed order and puts every item's quantity
    /// back into stock, all in one transaction.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        actor: &Actor,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<OrderWithItems, ServiceError> {
        let order = self.load(actor, order_id).await?;
        if !order.can_be_cancelled() {
            return Err(ServiceError::Conflict(format!(
                "Order cannot be cancelled in status {}",
                order.status.as_ref()
            )));
        }

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let old_status = order.status;
        let cancel_reason = reason.clone();

        let (cancelled, items, restored) = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                claim_status(
                    txn,
                    order.id,
                    &[OrderStatus::Pending, OrderStatus::Confirmed],
                    OrderStatus::Cancelled,
                )
                .await?;

                let mut items = Self::items_for(txn, &[order.id]).await?;
                let items = items.remove(&order.id).unwrap_or_default();
                let mut restored: i64 = 0;
                for item in &items {
                    CatalogService::restock(txn, item.perfume_id, item.quantity).await?;
                    restored += i64::from(item.quantity);
                }

                let cancelled = apply_transition(order, OrderStatus::Cancelled, cancel_reason)
                    .update(txn)
                    .await?;
                Ok::<_, ServiceError>((cancelled, items, restored))
            })
        })
        .await?;

        info!(order_id = %order_id, restored, "Order cancelled");
        metrics::record_order_cancelled();
        self.event_sender
            .send_or_log(Event::OrderCancelled {
                order_id,
                reason,
                restored_units: restored,
            })
            .await;
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status: OrderStatus::Cancelled,
            })
            .await;

        Ok(OrderWithItems {
            order: cancelled,
            items,
        })
    }

    /// Admin status change, checked against the transition table.
    /// Cancelling goes through [`OrderService::cancel_order`] so stock is
    /// returned.
    #[instrument(skip(self, update))]
    pub async fn update_status(
        &self,
        admin: &Actor,
        order_id: Uuid,
        update: StatusUpdate,
    ) -> Result<OrderWithItems, ServiceError> {
        if !admin.is_admin {
            return Err(ServiceError::Forbidden(
                "Admin privileges required".to_string(),
            ));
        }
        let new_status = update.status.ok_or_else(|| {
            ServiceError::ValidationError("status: status is required".to_string())
        })?;
        let tracking_number = update
            .tracking_number
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if tracking_number
            .as_ref()
            .map_or(false, |t| t.chars().count() > MAX_TRACKING_NUMBER_LEN)
        {
            return Err(ServiceError::ValidationError(format!(
                "trackingNumber: tracking number must be at most {} characters",
                MAX_TRACKING_NUMBER_LEN
            )));
        }

        let order = self.load(admin, order_id).await?;
        check_transition(order.status, new_status, order.payment_status)?;

        if new_status == OrderStatus::Cancelled {
            return self.cancel_order(admin, order_id, update.reason).await;
        }

        let old_status = order.status;
        let old_payment = order.payment_status;
        let reason = update.reason;
        let estimated_delivery = update.estimated_delivery;

        let updated = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                claim_status(txn, order.id, &[old_status], new_status).await?;

                let mut active = apply_transition(order, new_status, reason);
                if new_status == OrderStatus::Shipped {
                    if let Some(tracking) = tracking_number {
                        active.tracking_number = Set(Some(tracking));
                    }
                }
                if let Some(eta) = estimated_delivery {
                    active.estimated_delivery = Set(Some(eta));
                }
                Ok::<_, ServiceError>(active.update(txn).await?)
            })
        })
        .await?;

        info!(
            order_id = %order_id,
            from = old_status.as_ref(),
            to = new_status.as_ref(),
            "Order status updated"
        );
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            })
            .await;
        if updated.payment_status != old_payment {
            self.event_sender
                .send_or_log(Event::PaymentStatusChanged {
                    order_id,
                    old_status: old_payment,
                    new_status: updated.payment_status,
                })
                .await;
        }

        let mut with_items = self.attach_items(vec![updated]).await?;
        with_items
            .pop()
            .ok_or_else(|| ServiceError::not_found("Order", order_id))
    }

    /// Admin payment bookkeeping. Refunds are not set here; they follow
    /// from the `refunded` order transition.
    #[instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        admin: &Actor,
        order_id: Uuid,
        payment_status: PaymentStatus,
    ) -> Result<OrderModel, ServiceError> {
        if !admin.is_admin {
            return Err(ServiceError::Forbidden(
                "Admin privileges required".to_string(),
            ));
        }
        if payment_status == PaymentStatus::Refunded {
            return Err(ServiceError::ValidationError(
                "paymentStatus: refunds are recorded by moving the order to refunded".to_string(),
            ));
        }

        let order = self.load(admin, order_id).await?;
        let old_status = order.payment_status;
        if old_status == payment_status {
            return Err(ServiceError::Conflict(format!(
                "Payment is already {}",
                payment_status.as_ref()
            )));
        }
        if old_status == PaymentStatus::Refunded {
            return Err(ServiceError::Conflict(
                "Payment has been refunded".to_string(),
            ));
        }

        let mut active: order::ActiveModel = order.into();
        active.payment_status = Set(payment_status);
        let updated = active.update(&*self.db).await?;

        info!(
            order_id = %order_id,
            from = old_status.as_ref(),
            to = payment_status.as_ref(),
            "Payment status updated"
        );
        self.event_sender
            .send_or_log(Event::PaymentStatusChanged {
                order_id,
                old_status,
                new_status: payment_status,
            })
            .await;

        Ok(updated)
    }
}
