use axum::extract::{Json, Path, Query, State};
use tracing::instrument;

use crate::handlers::common::PaginationParams;
use crate::handlers::AppState;
use crate::services::catalog::{ProductListResponse, ProductResponse};
use crate::{ApiResponse, ApiResult};

/// List catalog products
#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(PaginationParams),
    responses(
        (status = 200, description = "Products", body = crate::ApiResponse<ProductListResponse>)
    ),
    tag = "Products"
)]
#[instrument(skip(state))]
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<ProductListResponse> {
    let products = state
        .services
        .catalog
        .list(params.page, params.per_page)
        .await?;
    Ok(Json(ApiResponse::success(products)))
}

/// Get a product by slug
#[utoipa::path(
    get,
    path = "/api/v1/products/{slug}",
    params(("slug" = String, Path, description = "Product slug")),
    responses(
        (status = 200, description = "Product", body = crate::ApiResponse<ProductResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
#[instrument(skip(state))]
pub async fn get_product(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<ProductResponse> {
    let product = state.services.catalog.get_by_slug(&slug).await?;
    Ok(Json(ApiResponse::success(product)))
}
