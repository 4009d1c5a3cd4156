#![allow(dead_code)]

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::{json, Value};
use storefront_api::{
    auth::{Claims, ADMIN_ROLE},
    config::AppConfig,
    db,
    entities::{order, product},
    notifications::{Notification, NotificationError, Notifier},
    services::{
        catalog::{CreateProductRequest, ProductResponse, VariantInput},
        payment_provider::{CallbackForm, PaytrGateway},
    },
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::MockServer;

pub const JWT_SECRET: &str = "integration_test_secret_that_is_long_enough";
pub const MERCHANT_ID: &str = "100200";
pub const MERCHANT_KEY: &str = "test-merchant-key";
pub const MERCHANT_SALT: &str = "test-merchant-salt";
pub const TOKEN_PATH: &str = "/odeme/api/get-token";

/// Records every job instead of delivering it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent
            .lock()
            .map(|sent| sent.iter().map(Notification::kind_name).collect())
            .unwrap_or_default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification.clone());
        }
        Ok(())
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub token: String,
}

/// Application backed by in-memory SQLite with the payment provider faked by
/// a local wiremock server.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub provider: MockServer,
    pub gateway: PaytrGateway,
    pub notifier: Arc<RecordingNotifier>,
    pub customer: TestUser,
    pub other_customer: TestUser,
    pub admin: TestUser,
}

fn mint_user(cfg: &AppConfig, email: &str, roles: &[&str]) -> TestUser {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let claims = Claims {
        sub: id.to_string(),
        email: Some(email.to_string()),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        iat: now.timestamp(),
        exp: (now + Duration::hours(1)).timestamp(),
        iss: cfg.auth_issuer.clone(),
        aud: cfg.auth_audience.clone(),
    };
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(cfg.jwt_secret.as_bytes()),
    )
    .expect("encode access token");
    TestUser {
        id,
        email: email.to_string(),
        token,
    }
}

impl TestApp {
    pub async fn new() -> Self {
        let provider = MockServer::start().await;

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // A single connection keeps the in-memory database alive and shared.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payment.merchant_id = MERCHANT_ID.to_string();
        cfg.payment.merchant_key = MERCHANT_KEY.to_string();
        cfg.payment.merchant_salt = MERCHANT_SALT.to_string();
        cfg.payment.api_url = format!("{}{}", provider.uri(), TOKEN_PATH);
        cfg.payment.ok_url = "https://shop.test/payment/ok".to_string();
        cfg.payment.fail_url = "https://shop.test/payment/fail".to_string();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let notifier = Arc::new(RecordingNotifier::default());
        let gateway = PaytrGateway::new(cfg.payment.clone()).expect("gateway");
        let state = AppState::with_collaborators(
            Arc::new(pool),
            cfg.clone(),
            Arc::new(PaytrGateway::new(cfg.payment.clone()).expect("gateway")),
            notifier.clone(),
        );

        let customer = mint_user(&cfg, "ada@example.com", &[]);
        let other_customer = mint_user(&cfg, "grace@example.com", &[]);
        let admin = mint_user(&cfg, "ops@example.com", &[ADMIN_ROLE]);

        Self {
            router: storefront_api::app_router(state.clone()),
            state,
            provider,
            gateway,
            notifier,
            customer,
            other_customer,
            admin,
        }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        self.request_with_headers(method, uri, body, token, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn as_customer(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        read_json(self.request(method, uri, body, Some(&self.customer.token)).await).await
    }

    pub async fn as_admin(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        read_json(self.request(method, uri, body, Some(&self.admin.token)).await).await
    }

    /// Posts a url-encoded form, the way the payment provider calls back.
    pub async fn post_form(&self, uri: &str, fields: &[(&str, String)]) -> (StatusCode, String) {
        let body = fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .expect("failed to build request");
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    /// Callback fields signed with the test merchant credentials.
    pub fn signed_callback(&self, merchant_oid: &str, status: &str, total_amount: i64) -> Vec<(&'static str, String)> {
        let form = CallbackForm {
            merchant_oid: merchant_oid.to_string(),
            status: status.to_string(),
            total_amount: total_amount.to_string(),
            hash: String::new(),
        };
        let hash = self.gateway.callback_signature(&form).expect("sign callback");
        vec![
            ("merchant_oid", form.merchant_oid),
            ("status", form.status),
            ("total_amount", form.total_amount),
            ("hash", hash),
        ]
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> ProductResponse {
        self.state
            .services
            .catalog
            .create_product(CreateProductRequest {
                name: name.to_string(),
                price,
                stock,
                sizes: vec![],
                colors: vec![],
            })
            .await
            .expect("seed product")
    }

    pub async fn seed_product_with_variants(
        &self,
        name: &str,
        price: Decimal,
        sizes: &[(&str, i32)],
        colors: &[(&str, i32)],
    ) -> ProductResponse {
        let variants = |list: &[(&str, i32)]| {
            list.iter()
                .map(|(label, stock)| VariantInput {
                    label: label.to_string(),
                    stock: *stock,
                })
                .collect::<Vec<_>>()
        };
        self.state
            .services
            .catalog
            .create_product(CreateProductRequest {
                name: name.to_string(),
                price,
                stock: 0,
                sizes: variants(sizes),
                colors: variants(colors),
            })
            .await
            .expect("seed product with variants")
    }

    pub async fn product_stock(&self, product_id: Uuid) -> i32 {
        product::Entity::find_by_id(product_id)
            .one(self.state.db.as_ref())
            .await
            .expect("load product")
            .expect("product exists")
            .stock
    }

    pub async fn order(&self, order_id: Uuid) -> order::Model {
        order::Entity::find_by_id(order_id)
            .one(self.state.db.as_ref())
            .await
            .expect("load order")
            .expect("order exists")
    }

    /// Rewinds the last status change of an order by `days`.
    pub async fn age_order(&self, order_id: Uuid, days: i64) {
        let current = self.order(order_id).await;
        let changed_at = current.status_changed_at - Duration::days(days);
        let mut active: order::ActiveModel = current.into();
        active.status_changed_at = Set(changed_at);
        active.update(self.state.db.as_ref()).await.expect("age order");
    }

    /// Places a paid order for the customer and returns its JSON.
    pub async fn place_order(&self, items: Value) -> Value {
        let (status, body) = self
            .as_customer(Method::POST, "/api/v1/orders", Some(order_body(items)))
            .await;
        assert_eq!(status, StatusCode::CREATED, "place order failed: {body}");
        body["data"].clone()
    }

    /// Walks an order through SHIPPED and DELIVERED as an admin.
    pub async fn deliver(&self, order_id: &str) {
        for status in ["SHIPPED", "DELIVERED"] {
            let (code, body) = self
                .as_admin(
                    Method::PATCH,
                    &format!("/api/v1/orders/{}/status", order_id),
                    Some(json!({ "status": status, "carrier": "Aras", "tracking_number": "TRK-1" })),
                )
                .await;
            assert_eq!(code, StatusCode::OK, "{status} failed: {body}");
        }
    }
}

pub fn shipping() -> Value {
    json!({
        "full_name": "Ada Lovelace",
        "phone": "+90 555 000 0000",
        "city": "Izmir",
        "district": "Konak",
        "address_line": "1 Kordon St"
    })
}

pub fn order_body(items: Value) -> Value {
    json!({ "items": items, "shipping": shipping() })
}

pub async fn read_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };
    (status, value)
}

/// Decimal fields serialize as strings.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("not a decimal: {other}"),
    }
}

fn urlencode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect()
}
