use axum::{
    extract::{Json, State},
    http::StatusCode,
};
use tracing::instrument;

use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::checkout::{CheckoutResponse, CreateOrderRequest};
use crate::ApiResponse;

/// Create an order from a cart
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = crate::ApiResponse<CheckoutResponse>),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
#[instrument(skip(state, request))]
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResponse>>), ServiceError> {
    let response = state.services.checkout.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}
