use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::created,
    services::{
        cart::{AddCartItemRequest, CartResponse, UpdateCartItemRequest},
        checkout::CartCheckoutRequest,
        orders::OrderResponse,
    },
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct ClearedCart {
    pub removed: u64,
}

#[utoipa::path(
    get,
    path = "/api/v1/cart",
    summary = "Get the caller's cart",
    description = "Lines are priced with the live product price",
    responses((status = 200, description = "Cart", body = ApiResponse<CartResponse>)),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn get_cart(State(state): State<AppState>, user: AuthUser) -> ApiResult<CartResponse> {
    let cart = state.services.cart.get(user.user_id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    summary = "Add a cart line",
    description = "Merges with an existing line for the same product and variant",
    request_body = AddCartItemRequest,
    responses(
        (status = 200, description = "Updated cart", body = ApiResponse<CartResponse>),
        (status = 404, description = "Product or variant not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Insufficient stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn add_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddCartItemRequest>,
) -> ApiResult<CartResponse> {
    let cart = state.services.cart.add_item(user.user_id, payload).await?;
    Ok(Json(ApiResponse::success(cart)))
}

pub async fn update_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> ApiResult<CartResponse> {
    let cart = state
        .services
        .cart
        .update_item(user.user_id, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

pub async fn remove_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<CartResponse> {
    let cart = state.services.cart.remove_item(user.user_id, id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

pub async fn clear_cart(State(state): State<AppState>, user: AuthUser) -> ApiResult<ClearedCart> {
    let removed = state.services.cart.clear(user.user_id).await?;
    Ok(Json(ApiResponse::success(ClearedCart { removed })))
}

#[utoipa::path(
    post,
    path = "/api/v1/cart/checkout",
    summary = "Check out the cart",
    description = "Places a paid order from the cart lines and empties the cart in the same transaction",
    request_body = CartCheckoutRequest,
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Empty cart or missing shipping", body = crate::errors::ErrorResponse),
        (status = 409, description = "Insufficient stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn checkout_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CartCheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    let committed = state
        .services
        .checkout
        .checkout_cart(user.user_id, user.email.clone(), payload)
        .await?;
    let order = state.dispatcher.settle(committed).await;
    Ok(created(order))
}
