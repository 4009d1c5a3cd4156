mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

struct Delivered {
    order_id: String,
    item_id: String,
    product_id: Uuid,
}

async fn delivered_order(app: &TestApp, stock: i32, quantity: i32) -> Delivered {
    let product = app.seed_product("Trail Shoe", dec!(60), stock).await;
    let order = app
        .place_order(json!([{ "product_id": product.id, "quantity": quantity }]))
        .await;
    let order_id = order["id"].as_str().unwrap().to_string();
    app.deliver(&order_id).await;
    Delivered {
        item_id: order["items"][0]["id"].as_str().unwrap().to_string(),
        order_id,
        product_id: product.id,
    }
}

fn return_body(delivered: &Delivered, quantity: i32) -> Value {
    json!({
        "order_id": delivered.order_id,
        "reason": "Does not fit",
        "items": [{ "order_item_id": delivered.item_id, "quantity": quantity }]
    })
}

async fn refund(app: &TestApp, return_id: &str) -> (StatusCode, Value) {
    app.as_admin(
        Method::PATCH,
        &format!("/api/v1/returns/{}/status", return_id),
        Some(json!({ "status": "REFUNDED", "admin_note": "Inspected" })),
    )
    .await
}

#[tokio::test]
async fn refund_credits_stock_exactly_once() {
    let app = TestApp::new().await;
    let delivered = delivered_order(&app, 5, 3).await;
    assert_eq!(app.product_stock(delivered.product_id).await, 2);

    let (status, created) = app
        .as_customer(Method::POST, "/api/v1/returns", Some(return_body(&delivered, 3)))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["data"]["order_number"], 4758);
    let return_id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, first) = refund(&app, &return_id).await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["data"]["admin_note"], "Inspected");
    assert_eq!(app.product_stock(delivered.product_id).await, 5);

    let (status, second) = refund(&app, &return_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["data"]["status"], "REFUNDED");
    assert_eq!(app.product_stock(delivered.product_id).await, 5);

    let refunds = app
        .notifier
        .kinds()
        .into_iter()
        .filter(|k| *k == "refund_issued")
        .count();
    assert_eq!(refunds, 1);
}

#[tokio::test]
async fn rejected_return_cannot_be_refunded_later() {
    let app = TestApp::new().await;
    let delivered = delivered_order(&app, 4, 1).await;
    let (_, created) = app
        .as_customer(Method::POST, "/api/v1/returns", Some(return_body(&delivered, 1)))
        .await;
    let return_id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .as_admin(
            Method::PATCH,
            &format!("/api/v1/returns/{}/status", return_id),
            Some(json!({ "status": "REJECTED" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = refund(&app, &return_id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.product_stock(delivered.product_id).await, 3);
}

#[tokio::test]
async fn undelivered_orders_cannot_be_returned() {
    let app = TestApp::new().await;
    let product = app.seed_product("Sandal", dec!(35), 3).await;
    let order = app
        .place_order(json!([{ "product_id": product.id, "quantity": 1 }]))
        .await;

    let (status, body) = app
        .as_customer(
            Method::POST,
            "/api/v1/returns",
            Some(json!({
                "order_id": order["id"],
                "reason": "Changed my mind",
                "items": [{ "order_item_id": order["items"][0]["id"], "quantity": 1 }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
}

#[tokio::test]
async fn return_window_closes_after_thirty_days() {
    let app = TestApp::new().await;
    let late = delivered_order(&app, 5, 1).await;
    app.age_order(Uuid::parse_str(&late.order_id).unwrap(), 31).await;
    let (status, _) = app
        .as_customer(Method::POST, "/api/v1/returns", Some(return_body(&late, 1)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let on_time = delivered_order(&app, 5, 1).await;
    app.age_order(Uuid::parse_str(&on_time.order_id).unwrap(), 29).await;
    let (status, _) = app
        .as_customer(Method::POST, "/api/v1/returns", Some(return_body(&on_time, 1)))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn returned_quantity_cannot_exceed_what_remains() {
    let app = TestApp::new().await;
    let delivered = delivered_order(&app, 6, 3).await;

    let (status, _) = app
        .as_customer(Method::POST, "/api/v1/returns", Some(return_body(&delivered, 4)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .as_customer(Method::POST, "/api/v1/returns", Some(return_body(&delivered, 2)))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .as_customer(Method::POST, "/api/v1/returns", Some(return_body(&delivered, 2)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (_, mine) = app.as_customer(Method::GET, "/api/v1/returns/mine", None).await;
    assert_eq!(mine["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn only_the_order_owner_may_request_a_return() {
    let app = TestApp::new().await;
    let delivered = delivered_order(&app, 2, 1).await;

    let (status, _) = common::read_json(
        app.request(
            Method::POST,
            "/api/v1/returns",
            Some(return_body(&delivered, 1)),
            Some(&app.other_customer.token),
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .as_customer(
            Method::PATCH,
            "/api/v1/returns/00000000-0000-0000-0000-000000000000/status",
            Some(json!({ "status": "REFUNDED" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
