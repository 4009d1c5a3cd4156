use axum::{
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;

use crate::ApiResponse;

pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub const FALLBACK_CLIENT_IP: &str = "127.0.0.1";

/// 201 with the standard envelope.
pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::success(data)))
}

/// First hop of `x-forwarded-for`, or the loopback address.
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(FALLBACK_CLIENT_IP)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_uses_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR_HEADER,
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers), "203.0.113.7");
    }

    #[test]
    fn client_ip_falls_back_to_loopback() {
        assert_eq!(client_ip(&HeaderMap::new()), FALLBACK_CLIENT_IP);

        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR_HEADER, HeaderValue::from_static(" "));
        assert_eq!(client_ip(&headers), FALLBACK_CLIENT_IP);
    }
}
