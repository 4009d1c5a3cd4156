mod common;

use axum::http::{Method, StatusCode};
use common::{decimal, TestApp};
use futures::future::join_all;
use rust_decimal_macros::dec;
use serde_json::json;
use storefront_api::services::orders::{
    OrderDraft, OrderLineRequest, PlaceOrderRequest, PlacementMode, ShippingInput,
};

#[tokio::test]
async fn order_then_refund_moves_stock_through_the_ledger() {
    let app = TestApp::new().await;
    let product = app.seed_product("Linen Shirt", dec!(25.00), 10).await;

    let order = app
        .place_order(json!([{ "product_id": product.id, "quantity": 4 }]))
        .await;
    assert_eq!(order["status"], "PAID");
    assert_eq!(order["order_number"], 4758);
    assert_eq!(decimal(&order["total"]), dec!(100));
    assert_eq!(app.product_stock(product.id).await, 6);

    let (status, history) = app
        .as_admin(
            Method::GET,
            &format!("/api/v1/stock/products/{}/history", product.id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let sale: Vec<_> = history["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|m| m["note"] == "Order #4758 sale")
        .collect();
    assert_eq!(sale.len(), 1);
    assert_eq!(sale[0]["delta"], -4);

    let order_id = order["id"].as_str().unwrap();
    app.deliver(order_id).await;

    let item_id = order["items"][0]["id"].as_str().unwrap();
    let (status, created) = app
        .as_customer(
            Method::POST,
            "/api/v1/returns",
            Some(json!({
                "order_id": order_id,
                "reason": "Too small",
                "items": [{ "order_item_id": item_id, "quantity": 2 }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["data"]["status"], "PENDING");

    let return_id = created["data"]["id"].as_str().unwrap();
    let (status, refunded) = app
        .as_admin(
            Method::PATCH,
            &format!("/api/v1/returns/{}/status", return_id),
            Some(json!({ "status": "REFUNDED" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{refunded}");
    assert_eq!(refunded["data"]["status"], "REFUNDED");
    assert_eq!(app.product_stock(product.id).await, 8);

    let (_, history) = app
        .as_admin(
            Method::GET,
            &format!("/api/v1/stock/products/{}/history", product.id),
            None,
        )
        .await;
    let credits: Vec<_> = history["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|m| m["note"].as_str().unwrap_or_default().starts_with("Return credit"))
        .collect();
    assert_eq!(credits.len(), 1);
    assert_eq!(credits[0]["delta"], 2);

    assert_eq!(
        app.notifier.kinds(),
        vec![
            "order_confirmed",
            "order_shipped",
            "order_delivered",
            "refund_issued"
        ]
    );
}

#[tokio::test]
async fn over_quantity_line_rolls_back_every_line() {
    let app = TestApp::new().await;
    let plenty = app.seed_product("Mug", dec!(8.50), 20).await;
    let sized = app
        .seed_product_with_variants("Hoodie", dec!(40), &[("M", 3), ("L", 1)], &[])
        .await;
    let large = &sized.sizes[1];

    let (status, body) = app
        .as_customer(
            Method::POST,
            "/api/v1/orders",
            Some(common::order_body(json!([
                { "product_id": plenty.id, "quantity": 5 },
                { "product_id": sized.id, "size_id": large.id, "quantity": 2 }
            ]))),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["details"], "1");

    assert_eq!(app.product_stock(plenty.id).await, 20);
    assert_eq!(app.product_stock(sized.id).await, 4);
    let after = app.state.services.catalog.get_product(sized.id).await.unwrap();
    assert_eq!(
        after.sizes.iter().map(|s| s.stock).collect::<Vec<_>>(),
        vec![3, 1]
    );

    let (_, mine) = app.as_customer(Method::GET, "/api/v1/orders/mine", None).await;
    assert_eq!(mine["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn repeated_lines_are_checked_cumulatively() {
    let app = TestApp::new().await;
    let product = app.seed_product("Scarf", dec!(12), 3).await;

    let (status, _) = app
        .as_customer(
            Method::POST,
            "/api/v1/orders",
            Some(common::order_body(json!([
                { "product_id": product.id, "quantity": 2 },
                { "product_id": product.id, "quantity": 2 }
            ]))),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.product_stock(product.id).await, 3);
}

#[tokio::test]
async fn order_numbers_increase_from_the_floor() {
    let app = TestApp::new().await;
    let product = app.seed_product("Sock", dec!(3), 10).await;

    let first = app
        .place_order(json!([{ "product_id": product.id, "quantity": 1 }]))
        .await;
    let second = app
        .place_order(json!([{ "product_id": product.id, "quantity": 1 }]))
        .await;
    assert_eq!(first["order_number"], 4758);
    assert_eq!(second["order_number"], 4759);
}

#[tokio::test]
async fn concurrent_placements_get_distinct_numbers() {
    let app = TestApp::new().await;
    let product = app.seed_product("Cap", dec!(15), 50).await;

    let drafts: Vec<OrderDraft> = (0..6)
        .map(|_| OrderDraft {
            user_id: app.customer.id,
            contact_email: Some(app.customer.email.clone()),
            request: PlaceOrderRequest {
                items: vec![OrderLineRequest {
                    product_id: product.id,
                    quantity: 1,
                    size_id: None,
                    color_id: None,
                }],
                shipping_address_id: None,
                shipping: Some(ShippingInput {
                    full_name: "Ada Lovelace".into(),
                    phone: "555".into(),
                    city: "Izmir".into(),
                    district: "Konak".into(),
                    neighborhood: None,
                    address_line: "1 Kordon St".into(),
                    postal_code: None,
                }),
                customer_note: None,
            },
        })
        .collect();

    let orders = &app.state.services.orders;
    let results = join_all(
        drafts
            .iter()
            .map(|draft| orders.place(draft, PlacementMode::Direct, false)),
    )
    .await;

    let mut numbers: Vec<i32> = results
        .into_iter()
        .map(|r| r.expect("placement").order_number())
        .collect();
    numbers.sort_unstable();
    assert_eq!(numbers, (4758..4764).collect::<Vec<_>>());
    assert_eq!(app.product_stock(product.id).await, 44);
}

#[tokio::test]
async fn size_and_color_line_draws_from_the_size() {
    let app = TestApp::new().await;
    let product = app
        .seed_product_with_variants("Tee", dec!(20), &[("S", 3), ("M", 5)], &[("Red", 4)])
        .await;
    let small = &product.sizes[0];
    let red = &product.colors[0];

    let order = app
        .place_order(json!([{
            "product_id": product.id,
            "size_id": small.id,
            "color_id": red.id,
            "quantity": 2
        }]))
        .await;
    assert_eq!(order["items"][0]["size_label"], "S");
    assert_eq!(order["items"][0]["color_label"], "Red");

    let after = app.state.services.catalog.get_product(product.id).await.unwrap();
    assert_eq!(after.sizes[0].stock, 1);
    assert_eq!(after.colors[0].stock, 4);
    assert_eq!(after.stock, 6);
}

#[tokio::test]
async fn foreign_variant_is_not_found() {
    let app = TestApp::new().await;
    let tee = app
        .seed_product_with_variants("Tee", dec!(20), &[("S", 3)], &[])
        .await;
    let mug = app.seed_product("Mug", dec!(8), 5).await;

    let (status, _) = app
        .as_customer(
            Method::POST,
            "/api/v1/orders",
            Some(common::order_body(json!([
                { "product_id": mug.id, "size_id": tee.sizes[0].id, "quantity": 1 }
            ]))),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.product_stock(mug.id).await, 5);
}

#[tokio::test]
async fn orders_are_visible_to_owner_and_admin_only() {
    let app = TestApp::new().await;
    let product = app.seed_product("Belt", dec!(30), 5).await;
    let order = app
        .place_order(json!([{ "product_id": product.id, "quantity": 1 }]))
        .await;
    let uri = format!("/api/v1/orders/{}", order["id"].as_str().unwrap());

    let (status, _) = common::read_json(
        app.request(Method::GET, &uri, None, Some(&app.other_customer.token))
            .await,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.as_admin(Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["shipping"]["city"], "Izmir");

    let (status, _) = app.as_customer(Method::GET, "/api/v1/orders", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .as_admin(Method::GET, "/api/v1/orders?status=PAID", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn admin_status_changes_follow_the_state_machine() {
    let app = TestApp::new().await;
    let product = app.seed_product("Boots", dec!(90), 2).await;
    let order = app
        .place_order(json!([{ "product_id": product.id, "quantity": 1 }]))
        .await;
    let uri = format!("/api/v1/orders/{}/status", order["id"].as_str().unwrap());

    let (status, _) = app
        .as_admin(Method::PATCH, &uri, Some(json!({ "status": "CANCELED" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .as_admin(Method::PATCH, &uri, Some(json!({ "status": "DELIVERED" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .as_admin(
            Method::PATCH,
            &uri,
            Some(json!({ "status": "SHIPPED", "carrier": "Yurtici", "tracking_number": "YT-9" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["carrier"], "Yurtici");

    // Repeating the target is a no-op and sends nothing new.
    let (status, _) = app
        .as_admin(Method::PATCH, &uri, Some(json!({ "status": "SHIPPED" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        app.notifier
            .kinds()
            .iter()
            .filter(|k| **k == "order_shipped")
            .count(),
        1
    );
}
