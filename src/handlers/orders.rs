use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::order::OrderStatus,
    errors::ServiceError,
    handlers::common::created,
    services::orders::{OrderDraft, OrderResponse, PlaceOrderRequest, UpdateOrderStatusRequest},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct OrderListQuery {
    /// Optional status filter, e.g. `PAID`
    pub status: Option<OrderStatus>,
}

pub(crate) fn draft_for(user: &AuthUser, request: PlaceOrderRequest) -> OrderDraft {
    OrderDraft {
        user_id: user.user_id,
        contact_email: user.email.clone(),
        request,
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Place a paid order",
    description = "Validates the lines against live stock, allocates the next order number and decrements stock in one transaction",
    request_body = PlaceOrderRequest,
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<OrderResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product, variant or address not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Insufficient stock", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    let committed = state
        .services
        .checkout
        .place_direct(draft_for(&user, payload))
        .await?;
    let order = state.dispatcher.settle(committed).await;
    Ok(created(order))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/mine",
    summary = "List the caller's orders",
    responses((status = 200, description = "Orders, newest first", body = ApiResponse<Vec<OrderResponse>>)),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<OrderResponse>> {
    let orders = state.services.orders.list_for_user(user.user_id).await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthUser,
) -> ApiResult<OrderResponse> {
    let order = state
        .services
        .orders
        .get_order(id, user.user_id, user.is_admin())
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List all orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders, newest first", body = ApiResponse<Vec<OrderResponse>>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> ApiResult<Vec<OrderResponse>> {
    let orders = state.services.orders.list_all(query.status).await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/status",
    summary = "Update order status",
    description = "Moves an order to SHIPPED, DELIVERED or CANCELED",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Order updated", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Illegal transition", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> ApiResult<OrderResponse> {
    let committed = state.services.orders.update_status(id, payload).await?;
    let order = state.dispatcher.settle(committed).await;
    Ok(Json(ApiResponse::success(order)))
}
