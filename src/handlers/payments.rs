use axum::extract::{Json, State};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::order::PaymentMethod;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::orders::OrderResponse;
use crate::services::payments::{CreateIntentResponse, VerifyPaymentResponse};
use crate::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CreateIntentRequest {
    pub order_id: Uuid,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct ConfirmPaymentRequest {
    pub order_id: Uuid,
    #[validate(length(min = 1, message = "Payment intent id is required"))]
    pub payment_intent_id: String,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct VerifyPaymentRequest {
    pub order_id: Uuid,
    #[validate(length(min = 1, message = "Transaction id is required"))]
    pub transaction_id: String,
    pub payment_method: PaymentMethod,
}

/// Create a card payment intent for an order
#[utoipa::path(
    post,
    path = "/api/v1/payments/create-intent",
    request_body = CreateIntentRequest,
    responses(
        (status = 200, description = "Intent created", body = crate::ApiResponse<CreateIntentResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Provider unconfigured", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
#[instrument(skip(state))]
pub async fn create_intent(
    State(state): State<AppState>,
    Json(request): Json<CreateIntentRequest>,
) -> ApiResult<CreateIntentResponse> {
    let response = state
        .services
        .payments
        .create_intent(request.order_id)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Confirm a card payment against the provider
#[utoipa::path(
    post,
    path = "/api/v1/payments/confirm",
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Payment confirmed", body = crate::ApiResponse<OrderResponse>),
        (status = 402, description = "Provider reports non-success", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order or payment intent not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
#[instrument(skip(state, request), fields(order_id = %request.order_id))]
pub async fn confirm_payment(
    State(state): State<AppState>,
    Json(request): Json<ConfirmPaymentRequest>,
) -> ApiResult<OrderResponse> {
    request.validate().map_err(ServiceError::from)?;

    let order = state
        .services
        .payments
        .confirm(request.order_id, &request.payment_intent_id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Verify a mobile-money payment
#[utoipa::path(
    post,
    path = "/api/v1/payments/verify",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Verification outcome", body = crate::ApiResponse<VerifyPaymentResponse>),
        (status = 402, description = "Gateway did not verify", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
#[instrument(skip(state, request), fields(order_id = %request.order_id))]
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> ApiResult<VerifyPaymentResponse> {
    request.validate().map_err(ServiceError::from)?;

    let response = state
        .services
        .payments
        .verify(
            request.order_id,
            &request.transaction_id,
            request.payment_method,
        )
        .await?;
    Ok(Json(ApiResponse::success(response)))
}
