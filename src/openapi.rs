use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = r#"
# Storefront Checkout & Order API

Turns a cart into a priced, stock-checked, coupon-adjusted order and
drives it through its lifecycle via payment confirmation and webhooks.

## Error Handling

Errors use a consistent response shape with appropriate HTTP status codes:

```json
{
  "error": "Not Found",
  "message": "Product 'widget' not found",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

## Pagination

List endpoints accept `page` and `per_page` query parameters.
"#
    ),
    paths(
        crate::handlers::checkout::create_checkout,
        crate::handlers::orders::get_order,
        crate::handlers::orders::get_order_by_number,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::ship_order,
        crate::handlers::orders::archive_order,
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::payments::create_intent,
        crate::handlers::payments::confirm_payment,
        crate::handlers::payments::verify_payment,
        crate::handlers::payment_webhooks::payment_webhook,
        crate::handlers::health::health_check,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::services::checkout::CreateOrderRequest,
        crate::services::checkout::CartItemInput,
        crate::services::checkout::CustomerInput,
        crate::services::checkout::CheckoutResponse,
        crate::services::orders::OrderResponse,
        crate::services::orders::OrderItemResponse,
        crate::services::orders::OrderListResponse,
        crate::services::catalog::ProductResponse,
        crate::services::catalog::ProductListResponse,
        crate::services::payments::CreateIntentResponse,
        crate::services::payments::VerifyPaymentResponse,
        crate::handlers::payments::CreateIntentRequest,
        crate::handlers::payments::ConfirmPaymentRequest,
        crate::handlers::payments::VerifyPaymentRequest,
        crate::handlers::health::HealthResponse,
        crate::entities::order::OrderStatus,
        crate::entities::order::PaymentMethod,
        crate::entities::coupon::CouponKind,
        crate::entities::coupon::CouponStatus,
    )),
    tags(
        (name = "Checkout", description = "Cart to order conversion"),
        (name = "Orders", description = "Order lifecycle"),
        (name = "Products", description = "Catalog reads"),
        (name = "Payments", description = "Payment confirmation"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;

/// Swagger UI mounted at `/swagger-ui` with the generated document.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
