use crate::{
    config::AppConfig,
    db::with_transaction,
    entities::{
        commerce::{perfume, Perfume, PerfumeModel},
        order::{self, Address},
        order_item, OrderStatus, PaymentMethod, PaymentStatus, PerfumeSnapshot,
    },
    errors::{is_unique_violation, ServiceError},
    events::{Event, EventSender},
    metrics,
    services::{
        commerce::{
            cart_service::{CartService, MAX_LINE_QUANTITY},
            catalog_service::{insufficient_stock, CatalogService},
        },
        pricing::{OrderNumberGenerator, OrderTotals},
    },
};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

const MAX_NOTES_LEN: usize = 1000;
const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Turns a list of requested perfumes into a persisted order.
///
/// Everything that writes (order header, items, stock decrements and the
/// cart wipe) happens in one transaction. A failure anywhere leaves the
/// database exactly as it was.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
    order_numbers: Arc<OrderNumberGenerator>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineInput {
    pub perfume_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderInput {
    pub items: Vec<OrderLineInput>,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub payment_method: PaymentMethod,
    #[validate(length(max = 1000, message = "notes must be at most 1000 characters"))]
    pub notes: Option<String>,
    #[serde(skip)]
    pub idempotency_key: Option<String>,
}

/// Result of a checkout. `replayed` is set when an earlier order with the
/// same idempotency key was returned instead of creating a new one.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    #[serde(skip)]
    pub replayed: bool,
}

/// Checked and merged checkout input, ready to price.
#[derive(Debug)]
struct NormalizedOrder {
    lines: Vec<OrderLineInput>,
    shipping_address: Address,
    billing_address: Address,
    notes: Option<String>,
    idempotency_key: Option<String>,
}

fn normalize(input: PlaceOrderInput) -> Result<NormalizedOrder, ServiceError> {
    input.validate()?;

    if input.items.is_empty() {
        return Err(ServiceError::ValidationError(
            "items: order must contain at least one item".to_string(),
        ));
    }

    let mut lines: Vec<OrderLineInput> = Vec::with_capacity(input.items.len());
    for item in &input.items {
        if !(1..=MAX_LINE_QUANTITY).contains(&item.quantity) {
            return Err(ServiceError::ValidationError(format!(
                "items: quantity must be between 1 and {}",
                MAX_LINE_QUANTITY
            )));
        }
        match lines.iter_mut().find(|l| l.perfume_id == item.perfume_id) {
            Some(existing) => existing.quantity += item.quantity,
            None => lines.push(*item),
        }
    }

    let shipping_address = input.shipping_address.trimmed();
    shipping_address.validate()?;
    let billing_address = match input.billing_address {
        Some(billing) => {
            let billing = billing.trimmed();
            billing.validate()?;
            billing
        }
        None => shipping_address.clone(),
    };

    let notes = input
        .notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    if notes.as_ref().map_or(false, |n| n.chars().count() > MAX_NOTES_LEN) {
        return Err(ServiceError::ValidationError(
            "notes: notes must be at most 1000 characters".to_string(),
        ));
    }

    let idempotency_key = input
        .idempotency_key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty());
    if idempotency_key
        .as_ref()
        .map_or(false, |k| k.len() > MAX_IDEMPOTENCY_KEY_LEN)
    {
        return Err(ServiceError::ValidationError(format!(
            "Idempotency-Key must be at most {} characters",
            MAX_IDEMPOTENCY_KEY_LEN
        )));
    }

    Ok(NormalizedOrder {
        lines,
        shipping_address,
        billing_address,
        notes,
        idempotency_key,
    })
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        order_numbers: Arc<OrderNumberGenerator>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
            order_numbers,
        }
    }

    #[instrument(skip(self, input), fields(user_id = %user_id))]
    pub async fn place_order(
        &self,
        user_id: Uuid,
        input: PlaceOrderInput,
    ) -> Result<PlacedOrder, ServiceError> {
        let payment_method = input.payment_method;
        let result = match normalize(input) {
            Ok(normalized) => self.place_normalized(user_id, payment_method, normalized).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            metrics::record_checkout_rejection(e.kind());
            warn!(user_id = %user_id, error = %e, "Checkout rejected");
        }
        result
    }

    async fn place_normalized(
        &self,
        user_id: Uuid,
        payment_method: PaymentMethod,
        order: NormalizedOrder,
    ) -> Result<PlacedOrder, ServiceError> {
        if let Some(key) = &order.idempotency_key {
            if let Some(existing) = self.find_by_idempotency_key(user_id, key).await? {
                info!(order_id = %existing.order.id, "Replaying idempotent checkout");
                return Ok(existing);
            }
        }

        // Price from the catalog as it stands now; the transaction re-checks
        // stock atomically when it decrements.
        let mut priced: Vec<(PerfumeModel, i32)> = Vec::with_capacity(order.lines.len());
        for line in &order.lines {
            let perfume = Perfume::find_by_id(line.perfume_id)
                .filter(perfume::Column::IsActive.eq(true))
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::not_found("Perfume", line.perfume_id))?;
            if !perfume.is_in_stock() || perfume.stock < line.quantity {
                return Err(insufficient_stock(&perfume));
            }
            priced.push((perfume, line.quantity));
        }

        let subtotal: Decimal = priced
            .iter()
            .map(|(p, qty)| order_item::line_total(*qty, p.price))
            .sum();
        let totals = OrderTotals::compute(subtotal, &self.config.pricing);
        let order_number = self.order_numbers.next();

        let header = order::ActiveModel {
            order_number: Set(order_number.clone()),
            user_id: Set(user_id),
            status: Set(OrderStatus::Pending),
            subtotal: Set(totals.subtotal),
            tax_amount: Set(totals.tax),
            shipping_amount: Set(totals.shipping),
            discount_amount: Set(totals.discount),
            total_amount: Set(totals.total),
            payment_method: Set(payment_method),
            payment_status: Set(PaymentStatus::Pending),
            shipping_address: Set(order.shipping_address),
            billing_address: Set(order.billing_address),
            notes: Set(order.notes),
            tracking_number: Set(None),
            estimated_delivery: Set(None),
            delivered_at: Set(None),
            cancelled_at: Set(None),
            cancellation_reason: Set(None),
            idempotency_key: Set(order.idempotency_key.clone()),
            ..Default::default()
        };

        let outcome = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let saved = header.insert(txn).await?;

                let mut items = Vec::with_capacity(priced.len());
                let mut stock_levels = Vec::with_capacity(priced.len());
                for (perfume, quantity) in &priced {
                    let item = order_item::ActiveModel {
                        order_id: Set(saved.id),
                        perfume_id: Set(perfume.id),
                        quantity: Set(*quantity),
                        unit_price: Set(perfume.price),
                        snapshot: Set(PerfumeSnapshot::from(perfume)),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;
                    items.push(item);

                    let remaining =
                        CatalogService::decrement_stock(txn, perfume.id, *quantity).await?;
                    stock_levels.push((perfume.id, remaining));
                }

                CartService::clear_in(txn, user_id).await?;
                Ok::<_, ServiceError>((saved, items, stock_levels))
            })
        })
        .await;

        let (saved, items, stock_levels) = match outcome {
            Ok(done) => done,
            Err(ServiceError::DatabaseError(e)) if is_unique_violation(&e) => {
                return self
                    .resolve_unique_violation(user_id, order.idempotency_key.as_deref(), e)
                    .await;
            }
            Err(e) => return Err(e),
        };

        info!(
            order_id = %saved.id,
            order_number = %saved.order_number,
            total = %saved.total_amount,
            "Order placed"
        );
        metrics::record_order_placed();
        self.event_sender
            .send_or_log(Event::OrderPlaced {
                order_id: saved.id,
                order_number: saved.order_number.clone(),
                user_id,
                total_amount: saved.total_amount,
            })
            .await;
        self.emit_low_stock(&stock_levels).await;

        Ok(PlacedOrder {
            order: saved,
            items,
            replayed: false,
        })
    }

    /// A concurrent checkout with the same idempotency key won the race:
    /// hand back its order. Any other unique violation is an order number
    /// collision with another process.
    async fn resolve_unique_violation(
        &self,
        user_id: Uuid,
        idempotency_key: Option<&str>,
        err: sea_orm::DbErr,
    ) -> Result<PlacedOrder, ServiceError> {
        if let Some(key) = idempotency_key {
            if let Some(existing) = self.find_by_idempotency_key(user_id, key).await? {
                info!(order_id = %existing.order.id, "Concurrent duplicate checkout resolved");
                return Ok(existing);
            }
        }
        warn!(error = %err, "Order insert hit a unique index");
        Err(ServiceError::Conflict(
            "order could not be created, please retry".to_string(),
        ))
    }

    async fn find_by_idempotency_key(
        &self,
        user_id: Uuid,
        key: &str,
    ) -> Result<Option<PlacedOrder>, ServiceError> {
        let Some(existing) = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .filter(order::Column::IdempotencyKey.eq(key))
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(existing.id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(Some(PlacedOrder {
            order: existing,
            items,
            replayed: true,
        }))
    }

    async fn emit_low_stock(&self, levels: &[(Uuid, i32)]) {
        let threshold = self.config.low_stock_threshold;
        for &(perfume_id, remaining) in levels {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn address() -> Address {
        Address {
            street: " 1 Place Vendome ".into(),
            city: "Paris".into(),
            state: None,
            postal_code: "75001".into(),
            country: "France".into(),
        }
    }

    fn input(items: Vec<OrderLineInput>) -> PlaceOrderInput {
        PlaceOrderInput {
            items,
            shipping_address: address(),
            billing_address: None,
            payment_method: PaymentMethod::CreditCard,
            notes: Some("   ".into()),
            idempotency_key: None,
        }
    }

    #[test]
    fn duplicate_lines_are_merged_in_first_seen_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let normalized = normalize(input(vec![
            OrderLineInput { perfume_id: a, quantity: 1 },
            OrderLineInput { perfume_id: b, quantity: 1 },
            OrderLineInput { perfume_id: a, quantity: 2 },
        ]))
        .unwrap();

        assert_eq!(normalized.lines.len(), 2);
        assert_eq!(normalized.lines[0].perfume_id, a);
        assert_eq!(normalized.lines[0].quantity, 3);
        assert_eq!(normalized.lines[1].perfume_id, b);
    }

    #[test]
    fn billing_defaults_to_trimmed_shipping() {
        let normalized = normalize(input(vec![OrderLineInput {
            perfume_id: Uuid::new_v4(),
            quantity: 1,
        }]))
        .unwrap();
        assert_eq!(normalized.shipping_address.street, "1 Place Vendome");
        assert_eq!(normalized.billing_address, normalized.shipping_address);
        assert_eq!(normalized.notes, None);
    }

    #[test]
    fn empty_order_is_rejected() {
        assert_matches!(normalize(input(vec![])), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn quantity_out_of_range_is_rejected() {
        let err = normalize(input(vec![OrderLineInput {
            perfume_id: Uuid::new_v4(),
            quantity: 0,
        }]));
        assert_matches!(err, Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn blank_address_fields_are_rejected() {
        let mut bad = input(vec![OrderLineInput {
            perfume_id: Uuid::new_v4(),
            quantity: 1,
        }]);
        bad.shipping_address.city = "   ".into();
        assert_matches!(normalize(bad), Err(ServiceError::ValidationError(msg)) if msg.contains("city"));
    }
}
