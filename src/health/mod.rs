/*!
 * # Health Check Module
 *
 * `GET /health` reports whether the service can reach its database. It is
 * mounted outside `/api/v1` and needs no authentication.
 */

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::error;

use crate::AppState;

/// Basic health status
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

/// Health check detail
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthDetail {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Overall health information
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub details: HashMap<String, HealthDetail>,
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Pings the database; 503 when it is unreachable.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match crate::db::check_connection(state.db.as_ref()).await {
        Ok(()) => HealthDetail {
            status: HealthStatus::Up,
            message: None,
        },
        Err(e) => {
            error!("Database health check failed: {}", e);
            HealthDetail {
                status: HealthStatus::Down,
                message: Some(e.response_message()),
            }
        }
    };

    let status = database.status;
    let mut details = HashMap::new();
    details.insert("database".to_string(), database);

    let status_code = match status {
        HealthStatus::Up => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        status_code,
        Json(HealthInfo {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            details,
        }),
    )
}
