//! Storefront API Library
//!
//! Catalog, cart, checkout, stock ledger and returns for a single storefront.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod notifications;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    response::Json,
    routing::{get, patch, post, put},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::{AuthRouterExt, JwtVerifier};
use crate::db::DbPool;
use crate::notifications::{LogNotifier, NotificationDispatcher, Notifier};
use crate::services::factory::{ServiceContainer, ServiceFactory};
use crate::services::payment_provider::PaymentGateway;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: config::AppConfig,
    pub services: ServiceContainer,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub verifier: Arc<JwtVerifier>,
}

impl AppState {
    /// Wires the configured payment provider and log-based notifications.
    pub fn from_config(db: Arc<DbPool>, config: config::AppConfig) -> Result<Self, errors::ServiceError> {
        let factory = ServiceFactory::new(db.clone(), &config)?;
        Ok(Self::assemble(db, config, &factory, Arc::new(LogNotifier)))
    }

    /// Wires explicit collaborators; used by tests and alternative deployments.
    pub fn with_collaborators(
        db: Arc<DbPool>,
        config: config::AppConfig,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let factory = ServiceFactory::with_gateway(db.clone(), &config, gateway);
        Self::assemble(db, config, &factory, notifier)
    }

    fn assemble(
        db: Arc<DbPool>,
        config: config::AppConfig,
        factory: &ServiceFactory,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            notifier,
            config.event_channel_capacity,
        ));
        let verifier = Arc::new(JwtVerifier::from_config(&config));
        Self {
            db,
            services: ServiceContainer::new(factory),
            dispatcher,
            verifier,
            config,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn error_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-err"), async {
                ApiResponse::<()>::error("oops".into())
            })
            .await;

        assert!(!response.success);
        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-err"));
        assert!(!meta.timestamp.is_empty());
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Routes mounted under `/api/v1`.
pub fn api_v1_routes(verifier: Arc<JwtVerifier>) -> Router<AppState> {
    // Anonymous: catalog reads and the signed provider callback
    let public = Router::new()
        .route("/products/:id", get(handlers::products::get_product))
        .route(
            "/payments/callback",
            post(handlers::payments::payment_callback),
        );

    // Any authenticated customer
    let customer = Router::new()
        .route("/orders", post(handlers::orders::create_order))
        .route("/orders/mine", get(handlers::orders::list_my_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/payments/start", post(handlers::payments::start_payment))
        .route("/returns", post(handlers::returns::create_return))
        .route("/returns/mine", get(handlers::returns::list_my_returns))
        .route(
            "/account/addresses",
            get(handlers::addresses::list_addresses).post(handlers::addresses::create_address),
        )
        .route(
            "/account/addresses/:id",
            put(handlers::addresses::update_address).delete(handlers::addresses::delete_address),
        )
        .route(
            "/account/addresses/:id/default",
            post(handlers::addresses::set_default_address),
        )
        .route(
            "/cart",
            get(handlers::cart::get_cart).delete(handlers::cart::clear_cart),
        )
        .route("/cart/items", post(handlers::cart::add_cart_item))
        .route(
            "/cart/items/:id",
            patch(handlers::cart::update_cart_item).delete(handlers::cart::remove_cart_item),
        )
        .route("/cart/checkout", post(handlers::cart::checkout_cart))
        .with_auth(verifier.clone());

    // Admin role required
    let admin = Router::new()
        .route("/orders", get(handlers::orders::list_orders))
        .route(
            "/orders/:id/status",
            patch(handlers::orders::update_order_status),
        )
        .route("/returns", get(handlers::returns::list_returns))
        .route(
            "/returns/:id/status",
            patch(handlers::returns::update_return_status),
        )
        .route("/products", post(handlers::products::create_product))
        .route("/products/:id/sizes", post(handlers::products::add_size))
        .route("/products/:id/colors", post(handlers::products::add_color))
        .route(
            "/products/:id/sizes/:size_id",
            axum::routing::delete(handlers::products::remove_size),
        )
        .route(
            "/products/:id/colors/:color_id",
            axum::routing::delete(handlers::products::remove_color),
        )
        .nest("/stock", handlers::stock::stock_routes())
        .with_admin(verifier);

    Router::new().merge(public).merge(customer).merge(admin)
}

/// Full application router without the transport-level layers (CORS,
/// compression, timeouts) that `main` adds.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes(state.verifier.clone()))
        .merge(health::health_routes())
        .merge(openapi::openapi_routes())
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
