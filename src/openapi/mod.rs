use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Perfume Store API",
        version = "1.0.0",
        description = r#"
# Perfume Store API

Backend for the perfume storefront: browse the catalog, keep a cart, check out and follow an order until delivery.

## Authentication

Cart and order endpoints need a bearer token issued by the identity service:

```
Authorization: Bearer <your-jwt-token>
```

Admin endpoints additionally require the `admin` role.

## Idempotent checkout

`POST /api/v1/orders` accepts an `Idempotency-Key` header. Repeating a request with the same key returns the original order with `Idempotent-Replayed: true` instead of placing a second one.

## Error Handling

Every failure uses the same body:

```json
{
  "error": "Bad Request",
  "message": "Insufficient stock: only 1 unit(s) of 'Sauvage' available",
  "request_id": "9b2f...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Perfumes", description = "Catalog browsing and administration"),
        (name = "Cart", description = "The signed-in user's cart"),
        (name = "Orders", description = "Checkout and order lifecycle"),
        (name = "Admin", description = "Administrative endpoints")
    ),
    paths(
        // Perfumes
        crate::handlers::perfumes::list_perfumes,
        crate::handlers::perfumes::featured_perfumes,
        crate::handlers::perfumes::low_stock_perfumes,
        crate::handlers::perfumes::get_perfume,
        crate::handlers::perfumes::create_perfume,
        crate::handlers::perfumes::update_perfume,
        crate::handlers::perfumes::delete_perfume,
        crate::handlers::perfumes::adjust_stock,

        // Cart
        crate::handlers::carts::get_cart,
        crate::handlers::carts::add_to_cart,
        crate::handlers::carts::update_cart_item,
        crate::handlers::carts::remove_cart_item,
        crate::handlers::carts::clear_cart,

        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::update_payment_status,
        crate::handlers::orders::list_all_orders,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::handlers::common::PaginationMeta,
            crate::entities::commerce::PerfumeModel,
            crate::services::commerce::CreatePerfumeInput,
            crate::services::commerce::UpdatePerfumeInput,
            crate::handlers::perfumes::StockAdjustmentRequest,
            crate::services::commerce::CartSummary,
            crate::services::commerce::CartLineView,
            crate::handlers::carts::AddItemRequest,
            crate::handlers::carts::UpdateQuantityRequest,
            crate::services::commerce::PlaceOrderInput,
            crate::services::commerce::OrderLineInput,
            crate::services::orders::OrderWithItems,
            crate::services::pricing::OrderTotals,
            crate::handlers::orders::CancelOrderRequest,
            crate::handlers::orders::UpdateStatusRequest,
            crate::handlers::orders::UpdatePaymentStatusRequest,
            crate::entities::Address,
            crate::entities::OrderStatus,
            crate::entities::PaymentStatus,
            crate::entities::PaymentMethod,
        )
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDocV1;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route_group() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Perfume Store API"));
        assert!(json.contains("/api/v1/perfumes/{id}/stock"));
        assert!(json.contains("/api/v1/cart/items"));
        assert!(json.contains("/api/v1/admin/orders"));
        assert!(json.contains("Bearer"));
    }
}
