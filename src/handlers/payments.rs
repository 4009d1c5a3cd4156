use axum::{
    extract::{rejection::FormRejection, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    Form,
};
use tracing::{error, warn};

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::{common::client_ip, orders::draft_for},
    services::{
        checkout::PaymentSession, orders::PlaceOrderRequest, payment_provider::CallbackForm,
    },
    ApiResponse, AppState,
};

/// Body the provider expects on every callback it delivers.
pub const CALLBACK_ACK: &str = "OK";

#[utoipa::path(
    post,
    path = "/api/v1/payments/start",
    summary = "Start a provider payment",
    description = "Creates a PENDING order and requests a hosted payment token for it",
    request_body = PlaceOrderRequest,
    responses(
        (status = 200, description = "Payment session", body = ApiResponse<PaymentSession>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 409, description = "Insufficient stock", body = crate::errors::ErrorResponse),
        (status = 502, description = "Provider refused the token request", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub async fn start_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: AuthUser,
    Json(payload): Json<PlaceOrderRequest>,
) -> Result<Json<ApiResponse<PaymentSession>>, ServiceError> {
    let session = state
        .services
        .checkout
        .start_payment(draft_for(&user, payload), client_ip(&headers))
        .await?;
    Ok(Json(ApiResponse::success(session)))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/callback",
    summary = "Provider payment callback",
    description = "Signed form post from the payment provider. Answers `OK` unless the outcome could not be stored.",
    request_body(content = CallbackForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Acknowledged", body = String),
        (status = 500, description = "Outcome not stored; the provider retries", body = crate::errors::ErrorResponse),
    ),
    tag = "Payments"
)]
pub async fn payment_callback(
    State(state): State<AppState>,
    form: Result<Form<CallbackForm>, FormRejection>,
) -> Result<(StatusCode, &'static str), ServiceError> {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => {
            warn!(error = %rejection, "malformed payment callback");
            return Ok((StatusCode::OK, CALLBACK_ACK));
        }
    };

    match state.services.checkout.handle_callback(form).await {
        Ok(committed) => {
            state.dispatcher.settle(committed).await;
            Ok((StatusCode::OK, CALLBACK_ACK))
        }
        Err(err) => {
            error!(error = %err, "payment callback could not be applied");
            Err(err)
        }
    }
}
