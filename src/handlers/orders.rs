use crate::{
    auth::{AdminUser, AuthUser},
    entities::{order, OrderStatus, PaymentStatus},
    errors::{ErrorResponse, ServiceError},
    handlers::common::{
        created_response, parse_enum_filter, success_response, ApiJson, ApiQuery,
        PaginatedResponse,
    },
    services::{
        commerce::{PlaceOrderInput, PlacedOrder},
        orders::{OrderFilter, OrderWithItems, StatusUpdate, USER_DEFAULT_LIMIT},
    },
    AppState,
};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    response::Response,
    routing::{get, patch},
    Router,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Header carrying the client's checkout retry key
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
/// Set to `true` on responses that replay an earlier checkout
pub const IDEMPOTENT_REPLAYED_HEADER: &str = "idempotent-replayed";

/// Creates the router for the signed-in user's orders
pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/:id", get(get_order))
        .route("/:id/cancel", patch(cancel_order))
        .route("/:id/status", patch(update_order_status))
        .route("/:id/payment-status", patch(update_payment_status))
}

/// Creates the router for admin order views
pub fn admin_orders_routes() -> Router<AppState> {
    Router::new().route("/", get(list_all_orders))
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserOrdersQuery {
    pub page: Option<u64>,
    /// Default 10, at most 50
    pub limit: Option<u64>,
    /// Order status name
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AdminOrdersQuery {
    pub status: Option<String>,
    pub payment_status: Option<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD`
    pub start_date: Option<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD` (inclusive, whole day)
    pub end_date: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    /// Target status, e.g. `shipped`
    pub status: Option<String>,
    pub reason: Option<String>,
    pub tracking_number: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentStatusRequest {
    /// `pending`, `paid` or `failed`
    pub payment_status: Option<String>,
}

impl From<PlacedOrder> for OrderWithItems {
    fn from(placed: PlacedOrder) -> Self {
        OrderWithItems {
            order: placed.order,
            items: placed.items,
        }
    }
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, ServiceError> {
    match headers.get(IDEMPOTENCY_KEY_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.to_string()))
            .map_err(|_| {
                ServiceError::ValidationError(
                    "Idempotency-Key must be visible ASCII".to_string(),
                )
            }),
    }
}

/// Parses a date filter. A bare date means midnight UTC, or the last
/// instant of that day when it is an upper bound.
fn parse_date_bound(
    field: &str,
    value: Option<&str>,
    end_of_day: bool,
) -> Result<Option<DateTime<Utc>>, ServiceError> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        ServiceError::ValidationError(format!("{}: expected RFC 3339 or YYYY-MM-DD", field))
    })?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        Some(NaiveTime::MIN)
    };
    Ok(time.map(|t| date.and_time(t).and_utc()))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    tag = "Orders",
    request_body = PlaceOrderInput,
    params(("Idempotency-Key" = Option<String>, Header, description = "Client retry key, at most 255 characters")),
    responses(
        (status = 201, description = "Order placed", body = OrderWithItems),
        (status = 200, description = "Earlier order replayed for the same Idempotency-Key", body = OrderWithItems,
            headers(("Idempotent-Replayed" = String, description = "Always `true`"))
        ),
        (status = 400, description = "Invalid order or insufficient stock", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Perfume not found", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    ApiJson(mut input): ApiJson<PlaceOrderInput>,
) -> Result<Response, ServiceError> {
    input.idempotency_key = idempotency_key(&headers)?;

    let placed = state
        .services
        .checkout
        .place_order(user.user_id, input)
        .await?;

    if placed.replayed {
        let mut response = success_response(OrderWithItems::from(placed));
        response.headers_mut().insert(
            HeaderName::from_static(IDEMPOTENT_REPLAYED_HEADER),
            HeaderValue::from_static("true"),
        );
        Ok(response)
    } else {
        Ok(created_response(OrderWithItems::from(placed)))
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    tag = "Orders",
    params(UserOrdersQuery),
    responses(
        (status = 200, description = "The caller's orders, newest first"),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<UserOrdersQuery>,
) -> Result<Response, ServiceError> {
    let status = parse_enum_filter::<OrderStatus>("status", query.status.as_deref())?;
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(USER_DEFAULT_LIMIT);

    let (orders, total) = state
        .services
        .orders
        .list_user_orders(user.user_id, query.page, query.limit, status)
        .await?;

    Ok(success_response(PaginatedResponse::new(
        orders, page, limit, total,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    tag = "Orders",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "The order with its items", body = OrderWithItems),
        (status = 404, description = "Not found or not yours", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.get_order(&user.actor(), id).await?;
    Ok(success_response(order))
}

#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/cancel",
    tag = "Orders",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body(content = CancelOrderRequest, description = "Optional cancellation reason"),
    responses(
        (status = 200, description = "Order cancelled and stock restored", body = OrderWithItems),
        (status = 400, description = "Order can no longer be cancelled", body = ErrorResponse),
        (status = 404, description = "Not found or not yours", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    body: Option<ApiJson<CancelOrderRequest>>,
) -> Result<Response, ServiceError> {
    let reason = body.and_then(|ApiJson(b)| b.reason);
    let order = state
        .services
        .orders
        .cancel_order(&user.actor(), id, reason)
        .await?;
    Ok(success_response(order))
}

#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/status",
    tag = "Orders",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = OrderWithItems),
        (status = 400, description = "Unknown status or illegal transition", body = ErrorResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    ApiJson(request): ApiJson<UpdateStatusRequest>,
) -> Result<Response, ServiceError> {
    let update = StatusUpdate {
        status: parse_enum_filter::<OrderStatus>("status", request.status.as_deref())?,
        reason: request.reason,
        tracking_number: request.tracking_number,
        estimated_delivery: request.estimated_delivery,
    };
    let order = state
        .services
        .orders
        .update_status(&admin.actor(), id, update)
        .await?;
    Ok(success_response(order))
}

#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/payment-status",
    tag = "Orders",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdatePaymentStatusRequest,
    responses(
        (status = 200, description = "Payment status changed", body = order::Model),
        (status = 400, description = "Unknown or unchanged payment status", body = ErrorResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_payment_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    ApiJson(request): ApiJson<UpdatePaymentStatusRequest>,
) -> Result<Response, ServiceError> {
    let payment_status =
        parse_enum_filter::<PaymentStatus>("paymentStatus", request.payment_status.as_deref())?
            .ok_or_else(|| {
                ServiceError::ValidationError("paymentStatus: payment status is required".to_string())
            })?;
    let order = state
        .services
        .orders
        .update_payment_status(&admin.actor(), id, payment_status)
        .await?;
    Ok(success_response(order))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/orders",
    tag = "Admin",
    params(AdminOrdersQuery),
    responses(
        (status = 200, description = "Orders matching the filter, newest first"),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_all_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<AdminOrdersQuery>,
) -> Result<Response, ServiceError> {
    let filter = OrderFilter {
        status: parse_enum_filter::<OrderStatus>("status", query.status.as_deref())?,
        payment_status: parse_enum_filter::<PaymentStatus>(
            "paymentStatus",
            query.payment_status.as_deref(),
        )?,
        start_date: parse_date_bound("startDate", query.start_date.as_deref(), false)?,
        end_date: parse_date_bound("endDate", query.end_date.as_deref(), true)?,
        page: query.page,
        limit: query.limit,
    };
    let page = filter.page.unwrap_or(1);
    let limit = filter
        .limit
        .unwrap_or_else(|| u64::from(state.config.api_default_page_size));

    let (orders, total) = state.services.orders.list_all_orders(filter).await?;
    Ok(success_response(PaginatedResponse::new(
        orders, page, limit, total,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn date_bounds_accept_dates_and_timestamps() {
        let start = parse_date_bound("startDate", Some("2024-03-01"), false)
            .unwrap()
            .unwrap();
        assert_eq!((start.day(), start.hour()), (1, 0));

        let end = parse_date_bound("endDate", Some("2024-03-01"), true)
            .unwrap()
            .unwrap();
        assert_eq!((end.hour(), end.minute(), end.second()), (23, 59, 59));

        let ts = parse_date_bound("startDate", Some("2024-03-01T10:30:00+02:00"), false)
            .unwrap()
            .unwrap();
        assert_eq!(ts.hour(), 8);

        assert!(parse_date_bound("startDate", None, false).unwrap().is_none());
        assert!(matches!(
            parse_date_bound("startDate", Some("March 1st"), false),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn idempotency_key_is_optional() {
        let mut headers = HeaderMap::new();
        assert_eq!(idempotency_key(&headers).unwrap(), None);
        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_static("retry-1"));
        assert_eq!(idempotency_key(&headers).unwrap().as_deref(), Some("retry-1"));
    }
}
