use crate::{
    auth::AuthUser,
    errors::{ErrorResponse, ServiceError},
    handlers::common::{created_response, success_response, validate_input, ApiJson},
    services::commerce::{CartLineView, CartSummary},
    AppState,
};
use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for the signed-in user's cart
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/items", post(add_to_cart))
        .route(
            "/items/:perfume_id",
            put(update_cart_item).delete(remove_cart_item),
        )
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub perfume_id: Uuid,
    #[validate(range(min = 1, max = 99, message = "quantity must be between 1 and 99"))]
    pub quantity: i32,
}

/// A quantity of zero or less removes the line.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

#[utoipa::path(
    get,
    path = "/api/v1/cart",
    tag = "Cart",
    responses(
        (status = 200, description = "Cart lines with live totals", body = CartSummary),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ServiceError> {
    let cart = state.services.cart.get_cart(user.user_id).await?;
    Ok(success_response(cart))
}

#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    tag = "Cart",
    request_body = AddItemRequest,
    responses(
        (status = 201, description = "New cart line", body = CartLineView),
        (status = 200, description = "Quantity merged into an existing line", body = CartLineView),
        (status = 400, description = "Invalid quantity or not enough stock", body = ErrorResponse),
        (status = 404, description = "Perfume not found", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<AddItemRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let (line, created) = state
        .services
        .cart
        .add_item(user.user_id, payload.perfume_id, payload.quantity)
        .await?;

    Ok(if created {
        created_response(line)
    } else {
        success_response(line)
    })
}

#[utoipa::path(
    put,
    path = "/api/v1/cart/items/{perfume_id}",
    tag = "Cart",
    params(("perfume_id" = Uuid, Path, description = "Perfume id of the line")),
    request_body = UpdateQuantityRequest,
    responses(
        (status = 200, description = "Line updated or removed"),
        (status = 400, description = "Not enough stock", body = ErrorResponse),
        (status = 404, description = "No such line", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(perfume_id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateQuantityRequest>,
) -> Result<Response, ServiceError> {
    let line = state
        .services
        .cart
        .update_quantity(user.user_id, perfume_id, payload.quantity)
        .await?;

    Ok(match line {
        Some(line) => success_response(line),
        None => success_response(serde_json::json!({
            "perfumeId": perfume_id,
            "removed": true
        })),
    })
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/{perfume_id}",
    tag = "Cart",
    params(("perfume_id" = Uuid, Path, description = "Perfume id of the line")),
    responses(
        (status = 200, description = "Line removed"),
        (status = 404, description = "No such line", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(perfume_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state
        .services
        .cart
        .remove_item(user.user_id, perfume_id)
        .await?;

    Ok(success_response(serde_json::json!({
        "perfumeId": perfume_id,
        "removed": true
    })))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    tag = "Cart",
    responses((status = 200, description = "Cart emptied")),
    security(("Bearer" = []))
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ServiceError> {
    let removed = state.services.cart.clear(user.user_id).await?;
    Ok(success_response(serde_json::json!({
        "message": "Cart cleared successfully",
        "linesRemoved": removed
    })))
}
