mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, TOKEN_PATH};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use storefront_api::entities::order::OrderStatus;
use uuid::Uuid;
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, ResponseTemplate,
};

const CALLBACK: &str = "/api/v1/payments/callback";

async fn issue_token(app: &TestApp, order_number: i32) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains(format!("merchant_oid=SP{}R", order_number)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "success", "token": "tok-123"})),
        )
        .expect(1)
        .mount(&app.provider)
        .await;
}

async fn start(app: &TestApp, product_id: Uuid, quantity: i32) -> (StatusCode, Value) {
    app.as_customer(
        Method::POST,
        "/api/v1/payments/start",
        Some(common::order_body(json!([
            { "product_id": product_id, "quantity": quantity }
        ]))),
    )
    .await
}

fn order_id(session: &Value) -> Uuid {
    session["data"]["order_id"]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .expect("order id")
}

#[tokio::test]
async fn start_leaves_stock_untouched_until_the_callback() {
    let app = TestApp::new().await;
    let product = app.seed_product("Jacket", dec!(25.00), 5).await;
    issue_token(&app, 4758).await;

    let (status, session) = start(&app, product.id, 2).await;
    assert_eq!(status, StatusCode::OK, "{session}");
    assert_eq!(session["data"]["token"], "tok-123");
    assert_eq!(session["data"]["order_number"], 4758);
    let merchant_oid = session["data"]["merchant_oid"].as_str().unwrap().to_string();
    assert!(merchant_oid.starts_with("SP4758R"));

    let id = order_id(&session);
    let order = app.order(id).await;
    assert_eq!(order.status, OrderStatus::AwaitingPayment);
    assert_eq!(order.payment_reference.as_deref(), Some(merchant_oid.as_str()));
    assert_eq!(app.product_stock(product.id).await, 5);

    let (status, body) = app
        .post_form(CALLBACK, &app.signed_callback(&merchant_oid, "success", 5000))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
    assert_eq!(app.order(id).await.status, OrderStatus::Paid);
    assert_eq!(app.product_stock(product.id).await, 3);

    // The provider retries; nothing moves twice.
    let (status, body) = app
        .post_form(CALLBACK, &app.signed_callback(&merchant_oid, "success", 5000))
        .await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "OK"));
    assert_eq!(app.product_stock(product.id).await, 3);
    assert_eq!(app.notifier.kinds(), vec!["order_confirmed"]);

    let (_, history) = app
        .as_admin(
            Method::GET,
            &format!("/api/v1/stock/products/{}/history", product.id),
            None,
        )
        .await;
    let payments = history["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|m| m["note"] == "Order #4758 (payment)")
        .count();
    assert_eq!(payments, 1);
}

#[tokio::test]
async fn unverifiable_callbacks_are_acknowledged_and_ignored() {
    let app = TestApp::new().await;
    let product = app.seed_product("Gloves", dec!(10.00), 4).await;
    issue_token(&app, 4758).await;

    let (_, session) = start(&app, product.id, 1).await;
    let merchant_oid = session["data"]["merchant_oid"].as_str().unwrap().to_string();
    let id = order_id(&session);

    let mut forged = app.signed_callback(&merchant_oid, "success", 1000);
    forged[3].1 = "bm90LWEtcmVhbC1zaWduYXR1cmU=".to_string();
    let (status, body) = app.post_form(CALLBACK, &forged).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "OK"));

    // Correctly signed, but for less than the order total.
    let (status, body) = app
        .post_form(CALLBACK, &app.signed_callback(&merchant_oid, "success", 1))
        .await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "OK"));

    let (status, body) = app
        .post_form(CALLBACK, &app.signed_callback("SP9999R0001", "success", 1000))
        .await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "OK"));

    let (status, body) = app.post_form(CALLBACK, &[("garbage", "1".to_string())]).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "OK"));

    assert_eq!(app.order(id).await.status, OrderStatus::AwaitingPayment);
    assert_eq!(app.product_stock(product.id).await, 4);
    assert!(app.notifier.kinds().is_empty());
}

#[tokio::test]
async fn installment_surcharge_still_settles_the_order() {
    let app = TestApp::new().await;
    let product = app.seed_product("Boots", dec!(50.00), 5).await;
    issue_token(&app, 4758).await;

    let (status, session) = start(&app, product.id, 1).await;
    assert_eq!(status, StatusCode::OK, "{session}");
    let merchant_oid = session["data"]["merchant_oid"].as_str().unwrap().to_string();
    let id = order_id(&session);

    let (status, body) = app
        .post_form(CALLBACK, &app.signed_callback(&merchant_oid, "success", 5150))
        .await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "OK"));
    assert_eq!(app.order(id).await.status, OrderStatus::Paid);
    assert_eq!(app.product_stock(product.id).await, 4);
    assert_eq!(app.notifier.kinds(), vec!["order_confirmed"]);
}

#[tokio::test]
async fn failed_payment_cancels_without_moving_stock() {
    let app = TestApp::new().await;
    let product = app.seed_product("Umbrella", dec!(12.50), 3).await;
    issue_token(&app, 4758).await;

    let (_, session) = start(&app, product.id, 2).await;
    let merchant_oid = session["data"]["merchant_oid"].as_str().unwrap().to_string();
    let id = order_id(&session);

    let (status, _) = app
        .post_form(CALLBACK, &app.signed_callback(&merchant_oid, "failed", 2500))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.order(id).await.status, OrderStatus::Canceled);
    assert_eq!(app.product_stock(product.id).await, 3);

    // A late success for a canceled order is an illegal transition.
    let (status, _) = app
        .post_form(CALLBACK, &app.signed_callback(&merchant_oid, "success", 2500))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.order(id).await.status, OrderStatus::Canceled);
    assert_eq!(app.product_stock(product.id).await, 3);
}

#[tokio::test]
async fn provider_refusal_is_a_bad_gateway_and_the_order_stays_pending() {
    let app = TestApp::new().await;
    let product = app.seed_product("Beanie", dec!(9.90), 2).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "failed", "reason": "merchant suspended"})),
        )
        .mount(&app.provider)
        .await;

    let (status, body) = start(&app, product.id, 1).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY, "{body}");

    let (_, mine) = app.as_customer(Method::GET, "/api/v1/orders/mine", None).await;
    let orders = mine["data"].as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["status"], "PENDING");
    assert_eq!(app.product_stock(product.id).await, 2);
}

#[tokio::test]
async fn start_checks_stock_before_calling_the_provider() {
    let app = TestApp::new().await;
    let product = app.seed_product("Poncho", dec!(30), 1).await;

    let (status, body) = start(&app, product.id, 2).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["details"], "1");
    assert!(app.provider.received_requests().await.unwrap_or_default().is_empty());
}
