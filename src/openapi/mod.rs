use axum::{routing::get, Json, Router};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront API

Catalog with size and color variants, cart, checkout (direct or through a hosted
payment provider), a stock movement ledger and return settlement.

## Authentication

Customer and admin endpoints require a bearer token issued by the account service:

```
Authorization: Bearer <your-jwt-token>
```

The payment provider callback is authenticated by its keyed hash instead.

## Error Handling

Failures use a single error body:

```json
{
  "error": "Conflict",
  "message": "Insufficient stock: requested 4, available 2",
  "details": "2",
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
        (name = "Products", description = "Catalog and variants"),
        (name = "Stock", description = "Stock adjustments, history and reconciliation"),
        (name = "Orders", description = "Order placement and fulfilment"),
        (name = "Payments", description = "Hosted payment provider flow"),
        (name = "Returns", description = "Return requests and refunds"),
        (name = "Account", description = "Saved addresses"),
        (name = "Cart", description = "Persistent cart and cart checkout")
    ),
    paths(
        // Products
        crate::handlers::products::get_product,
        crate::handlers::products::create_product,
        crate::handlers::products::remove_size,

        // Stock
        crate::handlers::stock::adjust_product_stock,
        crate::handlers::stock::adjust_size_stock,
        crate::handlers::stock::adjust_color_stock,
        crate::handlers::stock::product_history,
        crate::handlers::stock::product_reconciliation,

        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::update_order_status,

        // Payments
        crate::handlers::payments::start_payment,
        crate::handlers::payments::payment_callback,

        // Returns
        crate::handlers::returns::create_return,
        crate::handlers::returns::list_returns,
        crate::handlers::returns::update_return_status,

        // Account
        crate::handlers::addresses::list_addresses,
        crate::handlers::addresses::create_address,

        // Cart
        crate::handlers::cart::get_cart,
        crate::handlers::cart::add_cart_item,
        crate::handlers::cart::checkout_cart,
    ),
    components(
        schemas(
            crate::ResponseMeta,
            crate::errors::ErrorResponse,
            crate::entities::order::OrderStatus,
            crate::entities::return_request::ReturnStatus,
            crate::entities::address::Model,
            crate::entities::stock_movement::Model,
            crate::services::catalog::CreateProductRequest,
            crate::services::catalog::VariantInput,
            crate::services::catalog::ProductResponse,
            crate::services::inventory::VariantRef,
            crate::services::inventory::StockReconciliation,
            crate::services::orders::PlaceOrderRequest,
            crate::services::orders::OrderLineRequest,
            crate::services::orders::ShippingInput,
            crate::services::orders::OrderResponse,
            crate::services::orders::UpdateOrderStatusRequest,
            crate::services::checkout::CartCheckoutRequest,
            crate::services::checkout::PaymentSession,
            crate::services::payment_provider::CallbackForm,
            crate::services::returns::CreateReturnRequest,
            crate::services::returns::UpdateReturnStatusRequest,
            crate::services::returns::ReturnResponse,
            crate::services::addresses::AddressInput,
            crate::services::cart::AddCartItemRequest,
            crate::services::cart::UpdateCartItemRequest,
            crate::services::cart::CartResponse,
            crate::handlers::stock::AdjustStockRequest,
            crate::handlers::cart::ClearedCart,
        )
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDocV1;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Serves the generated document at `/api-docs/openapi.json`.
pub fn openapi_routes() -> Router<AppState> {
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDocV1::openapi()) }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_lists_storefront_paths() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Storefront API"));
        assert!(json.contains("/api/v1/orders"));
        assert!(json.contains("/api/v1/payments/callback"));
        assert!(json.contains("Bearer"));
    }
}
