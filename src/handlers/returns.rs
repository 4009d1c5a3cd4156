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
    entities::return_request::ReturnStatus,
    errors::ServiceError,
    handlers::common::created,
    services::returns::{CreateReturnRequest, ReturnResponse, UpdateReturnStatusRequest},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ReturnListQuery {
    /// Optional status filter, e.g. `PENDING`
    pub status: Option<ReturnStatus>,
}

#[utoipa::path(
    post,
    path = "/api/v1/returns",
    summary = "Request a return",
    description = "Opens a return for items of a delivered order inside the return window",
    request_body = CreateReturnRequest,
    responses(
        (status = 201, description = "Return requested", body = ApiResponse<ReturnResponse>),
        (status = 400, description = "Order not returnable or quantities invalid", body = crate::errors::ErrorResponse),
        (status = 403, description = "Order belongs to another customer", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Returns"
)]
pub async fn create_return(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateReturnRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ReturnResponse>>), ServiceError> {
    let created_return = state.services.returns.create(user.user_id, payload).await?;
    Ok(created(created_return))
}

pub async fn list_my_returns(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<ReturnResponse>> {
    let returns = state.services.returns.list_for_user(user.user_id).await?;
    Ok(Json(ApiResponse::success(returns)))
}

#[utoipa::path(
    get,
    path = "/api/v1/returns",
    summary = "List all returns",
    params(ReturnListQuery),
    responses((status = 200, description = "Returns, newest first", body = ApiResponse<Vec<ReturnResponse>>)),
    security(("Bearer" = [])),
    tag = "Returns"
)]
pub async fn list_returns(
    State(state): State<AppState>,
    Query(query): Query<ReturnListQuery>,
) -> ApiResult<Vec<ReturnResponse>> {
    let returns = state.services.returns.list_all(query.status).await?;
    Ok(Json(ApiResponse::success(returns)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/returns/{id}/status",
    summary = "Update return status",
    description = "REFUNDED credits the returned quantities back to stock exactly once",
    params(("id" = Uuid, Path, description = "Return request id")),
    request_body = UpdateReturnStatusRequest,
    responses(
        (status = 200, description = "Return updated", body = ApiResponse<ReturnResponse>),
        (status = 400, description = "Illegal transition", body = crate::errors::ErrorResponse),
        (status = 404, description = "Return not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Returns"
)]
pub async fn update_return_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateReturnStatusRequest>,
) -> ApiResult<ReturnResponse> {
    let committed = state
        .services
        .returns
        .update_status(id, payload.status, payload.admin_note)
        .await?;
    let updated = state.dispatcher.settle(committed).await;
    Ok(Json(ApiResponse::success(updated)))
}
