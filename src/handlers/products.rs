use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    handlers::common::created,
    services::catalog::{CreateProductRequest, ProductResponse, VariantInput},
    ApiResponse, ApiResult, AppState,
};

#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    summary = "Get product",
    description = "Returns a product with its size and color variants",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product", body = ApiResponse<ProductResponse>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ProductResponse> {
    let product = state.services.catalog.get_product(id).await?;
    Ok(Json(ApiResponse::success(product)))
}

#[utoipa::path(
    post,
    path = "/api/v1/products",
    summary = "Create product",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = ApiResponse<ProductResponse>),
        (status = 400, description = "Invalid product", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ProductResponse>>), ServiceError> {
    let product = state.services.catalog.create_product(payload).await?;
    Ok(created(product))
}

pub async fn add_size(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VariantInput>,
) -> Result<(StatusCode, Json<ApiResponse<ProductResponse>>), ServiceError> {
    let product = state.services.catalog.add_size(id, payload).await?;
    Ok(created(product))
}

pub async fn add_color(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VariantInput>,
) -> Result<(StatusCode, Json<ApiResponse<ProductResponse>>), ServiceError> {
    let product = state.services.catalog.add_color(id, payload).await?;
    Ok(created(product))
}

#[utoipa::path(
    delete,
    path = "/api/v1/products/{id}/sizes/{size_id}",
    summary = "Remove a size",
    params(
        ("id" = Uuid, Path, description = "Product id"),
        ("size_id" = Uuid, Path, description = "Size id"),
    ),
    responses(
        (status = 200, description = "Size removed", body = ApiResponse<ProductResponse>),
        (status = 409, description = "Size is referenced by orders", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn remove_size(
    State(state): State<AppState>,
    Path((id, size_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<ProductResponse> {
    let product = state.services.catalog.remove_size(id, size_id).await?;
    Ok(Json(ApiResponse::success(product)))
}

pub async fn remove_color(
    State(state): State<AppState>,
    Path((id, color_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<ProductResponse> {
    let product = state.services.catalog.remove_color(id, color_id).await?;
    Ok(Json(ApiResponse::success(product)))
}
