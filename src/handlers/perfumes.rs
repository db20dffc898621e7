use crate::{
    auth::AdminUser,
    entities::commerce::PerfumeModel,
    errors::{ErrorResponse, ServiceError},
    handlers::common::{created_response, success_response, ApiJson, ApiQuery, PaginatedResponse},
    services::commerce::{
        catalog_service::DEFAULT_LIMIT, CreatePerfumeInput, ProductQuery, UpdatePerfumeInput,
    },
    AppState,
};
use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, patch},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Creates the router for catalog endpoints
pub fn perfumes_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_perfumes).post(create_perfume))
        .route("/featured", get(featured_perfumes))
        .route("/low-stock", get(low_stock_perfumes))
        .route(
            "/:id",
            get(get_perfume).put(update_perfume).delete(delete_perfume),
        )
        .route("/:id/stock", patch(adjust_stock))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FeaturedQuery {
    /// Number of perfumes, default 8, at most 50
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LowStockQuery {
    /// Stock level at or below which a perfume is listed
    pub threshold: Option<i32>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct StockAdjustmentRequest {
    /// Units to add (positive) or remove (negative)
    pub delta: i32,
}

#[utoipa::path(
    get,
    path = "/api/v1/perfumes",
    tag = "Perfumes",
    params(ProductQuery),
    responses(
        (status = 200, description = "Page of active perfumes"),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
    )
)]
pub async fn list_perfumes(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ProductQuery>,
) -> Result<Response, ServiceError> {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let (items, total) = state.services.catalog.list_products(query).await?;
    Ok(success_response(PaginatedResponse::new(items, page, limit, total)))
}

#[utoipa::path(
    get,
    path = "/api/v1/perfumes/featured",
    tag = "Perfumes",
    params(FeaturedQuery),
    responses((status = 200, description = "Featured perfumes, newest first"))
)]
pub async fn featured_perfumes(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<FeaturedQuery>,
) -> Result<Response, ServiceError> {
    let perfumes = state.services.catalog.featured_products(query.limit).await?;
    Ok(success_response(perfumes))
}

#[utoipa::path(
    get,
    path = "/api/v1/perfumes/low-stock",
    tag = "Perfumes",
    params(LowStockQuery),
    responses(
        (status = 200, description = "Perfumes at or below the threshold"),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn low_stock_perfumes(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<LowStockQuery>,
) -> Result<Response, ServiceError> {
    let perfumes = state.services.catalog.low_stock(query.threshold).await?;
    Ok(success_response(perfumes))
}

#[utoipa::path(
    get,
    path = "/api/v1/perfumes/{id}",
    tag = "Perfumes",
    params(("id" = Uuid, Path, description = "Perfume id")),
    responses(
        (status = 200, description = "The perfume", body = PerfumeModel),
        (status = 404, description = "Not found or inactive", body = ErrorResponse),
    )
)]
pub async fn get_perfume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let perfume = state.services.catalog.get_product(id).await?;
    Ok(success_response(perfume))
}

#[utoipa::path(
    post,
    path = "/api/v1/perfumes",
    tag = "Perfumes",
    request_body = CreatePerfumeInput,
    responses(
        (status = 201, description = "Perfume created", body = PerfumeModel),
        (status = 400, description = "Invalid perfume", body = ErrorResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_perfume(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiJson(input): ApiJson<CreatePerfumeInput>,
) -> Result<Response, ServiceError> {
    let perfume = state.services.catalog.create_product(input).await?;
    Ok(created_response(perfume))
}

#[utoipa::path(
    put,
    path = "/api/v1/perfumes/{id}",
    tag = "Perfumes",
    params(("id" = Uuid, Path, description = "Perfume id")),
    request_body = UpdatePerfumeInput,
    responses(
        (status = 200, description = "Perfume updated", body = PerfumeModel),
        (status = 400, description = "Invalid update", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_perfume(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<UpdatePerfumeInput>,
) -> Result<Response, ServiceError> {
    let perfume = state.services.catalog.update_product(id, input).await?;
    Ok(success_response(perfume))
}

#[utoipa::path(
    delete,
    path = "/api/v1/perfumes/{id}",
    tag = "Perfumes",
    params(("id" = Uuid, Path, description = "Perfume id")),
    responses(
        (status = 200, description = "Perfume deactivated"),
        (status = 404, description = "Not found", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn delete_perfume(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.catalog.deactivate_product(id).await?;
    Ok(success_response(serde_json::json!({
        "id": id,
        "message": "Perfume deactivated"
    })))
}

#[utoipa::path(
    patch,
    path = "/api/v1/perfumes/{id}/stock",
    tag = "Perfumes",
    params(("id" = Uuid, Path, description = "Perfume id")),
    request_body = StockAdjustmentRequest,
    responses(
        (status = 200, description = "Stock adjusted", body = PerfumeModel),
        (status = 400, description = "Zero delta or not enough stock", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    ApiJson(request): ApiJson<StockAdjustmentRequest>,
) -> Result<Response, ServiceError> {
    let perfume = state.services.catalog.adjust_stock(id, request.delta).await?;
    Ok(success_response(perfume))
}
