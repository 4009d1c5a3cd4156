use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::address,
    errors::ServiceError,
    handlers::common::created,
    services::addresses::AddressInput,
    ApiResponse, ApiResult, AppState,
};

#[utoipa::path(
    get,
    path = "/api/v1/account/addresses",
    summary = "List saved addresses",
    description = "Default address first, then newest",
    responses((status = 200, description = "Addresses", body = ApiResponse<Vec<address::Model>>)),
    security(("Bearer" = [])),
    tag = "Account"
)]
pub async fn list_addresses(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<address::Model>> {
    let addresses = state.services.addresses.list(user.user_id).await?;
    Ok(Json(ApiResponse::success(addresses)))
}

#[utoipa::path(
    post,
    path = "/api/v1/account/addresses",
    summary = "Save an address",
    request_body = AddressInput,
    responses(
        (status = 201, description = "Address saved", body = ApiResponse<address::Model>),
        (status = 400, description = "Missing required fields", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Account"
)]
pub async fn create_address(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddressInput>,
) -> Result<(StatusCode, Json<ApiResponse<address::Model>>), ServiceError> {
    let saved = state.services.addresses.create(user.user_id, payload).await?;
    Ok(created(saved))
}

pub async fn update_address(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddressInput>,
) -> ApiResult<address::Model> {
    let saved = state
        .services
        .addresses
        .update(user.user_id, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(saved)))
}

pub async fn set_default_address(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<address::Model> {
    let saved = state.services.addresses.set_default(user.user_id, id).await?;
    Ok(Json(ApiResponse::success(saved)))
}

pub async fn delete_address(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Uuid> {
    state.services.addresses.delete(user.user_id, id).await?;
    Ok(Json(ApiResponse::success(id)))
}
