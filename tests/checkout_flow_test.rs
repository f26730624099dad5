//! End-to-end checkout tests over the HTTP surface: pricing, coupons,
//! stock validation, and the order state machine.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use storefront_api::entities::coupon::CouponKind;

fn widget_cart(quantity: i64) -> Value {
    json!({
        "items": [{ "slug": "widget", "quantity": quantity }],
        "customer": {
            "name": "Test Customer",
            "email": "customer@example.com",
            "phone": "+8801700000000",
            "address": "1 Main St",
            "city": "Dhaka",
            "country": "BD"
        },
        "payment_method": "cash_on_delivery"
    })
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn checkout_prices_widget_cart() {
    let app = TestApp::new().await;
    app.seed_product("widget", dec!(10.00), 5).await;

    let response = app
        .request(Method::POST, "/api/v1/checkout", Some(widget_cart(2)))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response).await;
    let data = &body["data"];
    assert_eq!(data["subtotal"], "20.00");
    assert_eq!(data["tax"], "1.60");
    assert_eq!(data["total"], "31.60");
    assert_eq!(data["status"], "awaiting_payment");

    // Stock reserved atomically at creation.
    assert_eq!(app.product_stock("widget").await, 3);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn checkout_applies_percentage_coupon() {
    let app = TestApp::new().await;
    app.seed_product("widget", dec!(10.00), 5).await;
    app.seed_coupon("SAVE10", CouponKind::Percentage, dec!(10))
        .await;

    let mut payload = widget_cart(2);
    payload["coupon_code"] = json!("save10");

    let response = app
        .request(Method::POST, "/api/v1/checkout", Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response).await;
    let data = &body["data"];
    assert_eq!(data["discount_amount"], "2.00");
    assert_eq!(data["total"], "29.60");
    assert_eq!(data["coupon_code"], "SAVE10");

    assert_eq!(app.coupon_used_count("SAVE10").await, 1);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn invalid_coupon_degrades_to_zero_discount() {
    let app = TestApp::new().await;
    app.seed_product("widget", dec!(10.00), 5).await;

    let mut payload = widget_cart(2);
    payload["coupon_code"] = json!("NOSUCHCODE");

    let response = app
        .request(Method::POST, "/api/v1/checkout", Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response).await;
    assert_eq!(body["data"]["discount_amount"], "0");
    assert_eq!(body["data"]["total"], "31.60");
    assert!(body["data"]["coupon_code"].is_null());
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn checkout_rejects_insufficient_stock_without_side_effects() {
    let app = TestApp::new().await;
    app.seed_product("widget", dec!(10.00), 3).await;

    let response = app
        .request(Method::POST, "/api/v1/checkout", Some(widget_cart(10)))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = response_json(response).await;
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("widget"));
    assert!(message.contains("available 3"));

    // No order created, no stock mutated.
    assert_eq!(app.product_stock("widget").await, 3);
    let list = app.request(Method::GET, "/api/v1/orders", None).await;
    let list_body = response_json(list).await;
    assert_eq!(list_body["data"]["total"], 0);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn checkout_rejects_unknown_slug() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::POST, "/api/v1/checkout", Some(widget_cart(1)))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = response_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("widget"));
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn checkout_rejects_empty_cart_and_missing_customer_fields() {
    let app = TestApp::new().await;
    app.seed_product("widget", dec!(10.00), 5).await;

    let empty_cart = json!({
        "items": [],
        "customer": {
            "name": "Test",
            "email": "customer@example.com",
            "address": "1 Main St"
        },
        "payment_method": "cash_on_delivery"
    });
    let response = app
        .request(Method::POST, "/api/v1/checkout", Some(empty_cart))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut payload = widget_cart(1);
    payload["customer"]["name"] = json!("");
    let response = app
        .request(Method::POST, "/api/v1/checkout", Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn concurrent_checkouts_for_last_unit_admit_exactly_one() {
    let app = TestApp::new().await;
    app.seed_product("widget", dec!(10.00), 1).await;

    let (a, b) = tokio::join!(
        app.request(Method::POST, "/api/v1/checkout", Some(widget_cart(1))),
        app.request(Method::POST, "/api/v1/checkout", Some(widget_cart(1))),
    );

    let statuses = [a.status(), b.status()];
    let created = statuses
        .iter()
        .filter(|s| **s == StatusCode::CREATED)
        .count();
    let rejected = statuses
        .iter()
        .filter(|s| **s == StatusCode::UNPROCESSABLE_ENTITY)
        .count();

    assert_eq!(created, 1, "exactly one checkout should win the last unit");
    assert_eq!(rejected, 1, "the loser should see insufficient stock");
    assert_eq!(app.product_stock("widget").await, 0);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn order_lifecycle_cancel_is_terminal() {
    let app = TestApp::new().await;
    app.seed_product("widget", dec!(10.00), 5).await;

    let response = app
        .request(Method::POST, "/api/v1/checkout", Some(widget_cart(1)))
        .await;
    let body = response_json(response).await;
    let order_id = body["data"]["order_id"].as_str().unwrap().to_string();

    // Shipping an unpaid order is an illegal transition.
    let ship = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/ship"),
            None,
        )
        .await;
    assert_eq!(ship.status(), StatusCode::BAD_REQUEST);

    // awaiting_payment -> cancelled
    let cancel = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/cancel"),
            None,
        )
        .await;
    assert_eq!(cancel.status(), StatusCode::OK);
    let cancel_body = response_json(cancel).await;
    assert_eq!(cancel_body["data"]["status"], "cancelled");

    // Terminal states admit nothing further.
    let cancel_again = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/cancel"),
            None,
        )
        .await;
    assert_eq!(cancel_again.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn order_lookup_by_id_and_number() {
    let app = TestApp::new().await;
    app.seed_product("widget", dec!(10.00), 5).await;

    let response = app
        .request(Method::POST, "/api/v1/checkout", Some(widget_cart(2)))
        .await;
    let body = response_json(response).await;
    let order_id = body["data"]["order_id"].as_str().unwrap().to_string();
    let order_number = body["data"]["order_number"].as_str().unwrap().to_string();

    let by_id = app
        .request(Method::GET, &format!("/api/v1/orders/{order_id}"), None)
        .await;
    assert_eq!(by_id.status(), StatusCode::OK);
    let by_id_body = response_json(by_id).await;
    assert_eq!(by_id_body["data"]["order_number"], order_number.as_str());
    assert_eq!(by_id_body["data"]["items"][0]["slug"], "widget");
    assert_eq!(by_id_body["data"]["items"][0]["quantity"], 2);

    let by_number = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/by-number/{order_number}"),
            None,
        )
        .await;
    assert_eq!(by_number.status(), StatusCode::OK);

    let missing = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", uuid::Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn line_item_snapshots_survive_catalog_edits() {
    use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
    use storefront_api::entities::product;

    let app = TestApp::new().await;
    app.seed_product("widget", dec!(10.00), 5).await;

    let response = app
        .request(Method::POST, "/api/v1/checkout", Some(widget_cart(1)))
        .await;
    let body = response_json(response).await;
    let order_id = body["data"]["order_id"].as_str().unwrap().to_string();

    // Reprice the catalog after the order exists.
    let model = product::Entity::find()
        .filter(product::Column::Slug.eq("widget"))
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let mut active: product::ActiveModel = model.into();
    active.price = Set(dec!(99.99));
    active.update(&*app.state.db).await.unwrap();

    let order = app
        .request(Method::GET, &format!("/api/v1/orders/{order_id}"), None)
        .await;
    let order_body = response_json(order).await;
    assert_eq!(order_body["data"]["items"][0]["unit_price"], "10.00");
    assert_eq!(order_body["data"]["subtotal"], "10.00");
}
