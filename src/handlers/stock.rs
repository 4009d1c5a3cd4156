use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::stock_movement,
    services::inventory::{StockReconciliation, VariantRef},
    ApiResponse, ApiResult, AppState,
};

/// Signed stock change. Positive adds stock, negative removes it.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AdjustStockRequest {
    pub delta: i32,
    #[serde(default)]
    pub note: Option<String>,
}

/// Stock administration routes, nested under `/stock`.
pub fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/products/:id/adjust", post(adjust_product_stock))
        .route("/sizes/:id/adjust", post(adjust_size_stock))
        .route("/colors/:id/adjust", post(adjust_color_stock))
        .route("/products/:id/history", get(product_history))
        .route("/sizes/:id/history", get(size_history))
        .route("/colors/:id/history", get(color_history))
        .route("/products/:id/reconciliation", get(product_reconciliation))
}

#[utoipa::path(
    post,
    path = "/api/v1/stock/products/{id}/adjust",
    summary = "Adjust product stock",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = AdjustStockRequest,
    responses(
        (status = 200, description = "Movement recorded", body = ApiResponse<stock_movement::Model>),
        (status = 400, description = "Zero delta", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Stock would go negative", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Stock"
)]
pub async fn adjust_product_stock(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<AdjustStockRequest>,
) -> ApiResult<stock_movement::Model> {
    let movement = state
        .services
        .inventory
        .adjust(product_id, None, payload.delta, payload.note)
        .await?;
    Ok(Json(ApiResponse::success(movement)))
}

#[utoipa::path(
    post,
    path = "/api/v1/stock/sizes/{id}/adjust",
    summary = "Adjust size stock",
    params(("id" = Uuid, Path, description = "Size id")),
    request_body = AdjustStockRequest,
    responses(
        (status = 200, description = "Movement recorded", body = ApiResponse<stock_movement::Model>),
        (status = 404, description = "Size not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Stock"
)]
pub async fn adjust_size_stock(
    State(state): State<AppState>,
    Path(size_id): Path<Uuid>,
    Json(payload): Json<AdjustStockRequest>,
) -> ApiResult<stock_movement::Model> {
    let inventory = &state.services.inventory;
    let product_id = inventory.product_of_size(size_id).await?;
    let movement = inventory
        .adjust(
            product_id,
            Some(VariantRef::Size(size_id)),
            payload.delta,
            payload.note,
        )
        .await?;
    Ok(Json(ApiResponse::success(movement)))
}

#[utoipa::path(
    post,
    path = "/api/v1/stock/colors/{id}/adjust",
    summary = "Adjust color stock",
    params(("id" = Uuid, Path, description = "Color id")),
    request_body = AdjustStockRequest,
    responses(
        (status = 200, description = "Movement recorded", body = ApiResponse<stock_movement::Model>),
        (status = 404, description = "Color not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Stock"
)]
pub async fn adjust_color_stock(
    State(state): State<AppState>,
    Path(color_id): Path<Uuid>,
    Json(payload): Json<AdjustStockRequest>,
) -> ApiResult<stock_movement::Model> {
    let inventory = &state.services.inventory;
    let product_id = inventory.product_of_color(color_id).await?;
    let movement = inventory
        .adjust(
            product_id,
            Some(VariantRef::Color(color_id)),
            payload.delta,
            payload.note,
        )
        .await?;
    Ok(Json(ApiResponse::success(movement)))
}

#[utoipa::path(
    get,
    path = "/api/v1/stock/products/{id}/history",
    summary = "Product stock movements, newest first",
    params(("id" = Uuid, Path, description = "Product id")),
    responses((status = 200, description = "Movements", body = ApiResponse<Vec<stock_movement::Model>>)),
    security(("Bearer" = [])),
    tag = "Stock"
)]
pub async fn product_history(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> ApiResult<Vec<stock_movement::Model>> {
    let movements = state.services.inventory.history(product_id, None).await?;
    Ok(Json(ApiResponse::success(movements)))
}

pub async fn size_history(
    State(state): State<AppState>,
    Path(size_id): Path<Uuid>,
) -> ApiResult<Vec<stock_movement::Model>> {
    let inventory = &state.services.inventory;
    let product_id = inventory.product_of_size(size_id).await?;
    let movements = inventory
        .history(product_id, Some(VariantRef::Size(size_id)))
        .await?;
    Ok(Json(ApiResponse::success(movements)))
}

pub async fn color_history(
    State(state): State<AppState>,
    Path(color_id): Path<Uuid>,
) -> ApiResult<Vec<stock_movement::Model>> {
    let inventory = &state.services.inventory;
    let product_id = inventory.product_of_color(color_id).await?;
    let movements = inventory
        .history(product_id, Some(VariantRef::Color(color_id)))
        .await?;
    Ok(Json(ApiResponse::success(movements)))
}

#[utoipa::path(
    get,
    path = "/api/v1/stock/products/{id}/reconciliation",
    summary = "Compare stock counters with their movement sums",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Drift report", body = ApiResponse<StockReconciliation>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Stock"
)]
pub async fn product_reconciliation(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> ApiResult<StockReconciliation> {
    let report = state.services.inventory.reconcile(product_id).await?;
    Ok(Json(ApiResponse::success(report)))
}
