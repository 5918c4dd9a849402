//! Integration tests for the fulfillment webhook route.
//!
//! These drive `POST /webhooks/orders-fulfilled` through the router and check
//! what lands in the email queue.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use chrono::TimeDelta;
use yay_reviews_core::{OrderId, QueueStatus, WebhookTopic};
use yay_reviews_integration_tests::{
    FULFILLED_AT, ORDER_ID, TestContext, at, order_payload, sign, webhook_request,
};
use yay_reviews_server::shopify::EmailSettings;

// =============================================================================
// Accepted webhooks
// =============================================================================

#[tokio::test]
async fn test_orders_fulfilled_enqueues_review_request() {
    let ctx = TestContext::new();

    let (status, body) = ctx.deliver("ORDERS_FULFILLED", ORDER_ID).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Webhook processed successfully");

    let items = ctx.queue.items();
    assert_eq!(items.len(), 1);
    let item = items.first().unwrap();
    assert_eq!(item.order_id, OrderId::from(ORDER_ID));
    assert_eq!(item.topic, WebhookTopic::OrdersFulfilled);
    assert_eq!(item.status, QueueStatus::Pending);
    assert_eq!(item.fulfillment_at, at(FULFILLED_AT));
    assert_eq!(item.send_schedule_at, at(FULFILLED_AT) + TimeDelta::days(5));
    assert!(item.last_error.is_none());
}

#[tokio::test]
async fn test_day_send_setting_moves_schedule() {
    let ctx = TestContext::with_settings(Some(EmailSettings {
        day_send: Some(10),
        ..EmailSettings::default()
    }));

    let (status, _) = ctx.deliver("orders/fulfilled", ORDER_ID).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        ctx.queue.items().first().unwrap().send_schedule_at,
        at(FULFILLED_AT) + TimeDelta::days(10)
    );
}

#[tokio::test]
async fn test_rest_fulfillment_topic_reads_order_id() {
    let ctx = TestContext::new();
    let body = serde_json::json!({ "id": 255_858_046, "order_id": ORDER_ID })
        .to_string()
        .into_bytes();
    let signature = sign(&body);

    let (status, _) = ctx
        .send(webhook_request("fulfillments/create", &signature, body))
        .await;

    assert_eq!(status, StatusCode::OK);
    let item = ctx.queue.items().into_iter().next().unwrap();
    assert_eq!(item.order_id, OrderId::from(ORDER_ID));
    assert_eq!(item.topic, WebhookTopic::FulfillmentsCreate);
}

#[tokio::test]
async fn test_duplicate_delivery_keeps_one_row() {
    let ctx = TestContext::new();

    let (first, _) = ctx.deliver("ORDERS_FULFILLED", ORDER_ID).await;
    ctx.clock.advance(TimeDelta::minutes(3));
    let (second, body) = ctx.deliver("ORDERS_FULFILLED", ORDER_ID).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(body, "Webhook already processed");

    let items = ctx.queue.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items.first().unwrap().fulfillment_at, at(FULFILLED_AT));
}

#[tokio::test]
async fn test_missing_email_settings_acknowledged_without_row() {
    let ctx = TestContext::with_settings(None);

    let (status, body) = ctx.deliver("ORDERS_FULFILLED", ORDER_ID).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "No email settings configured");
    assert!(ctx.queue.items().is_empty());
}

// =============================================================================
// Rejected webhooks
// =============================================================================

#[tokio::test]
async fn test_unrelated_topic_is_bad_request() {
    let ctx = TestContext::new();

    let (status, _) = ctx.deliver("CARTS_UPDATE", ORDER_ID).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(ctx.queue.items().is_empty());
    assert!(ctx.shopify.connections().is_empty());
}

#[tokio::test]
async fn test_bad_signature_is_unauthorized() {
    let ctx = TestContext::new();
    let body = order_payload(ORDER_ID);
    let forged = sign(b"some other body");

    let (status, _) = ctx
        .send(webhook_request("ORDERS_FULFILLED", &forged, body))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(ctx.queue.items().is_empty());
}

#[tokio::test]
async fn test_tampered_body_is_unauthorized() {
    let ctx = TestContext::new();
    let signature = sign(&order_payload(ORDER_ID));

    let (status, _) = ctx
        .send(webhook_request(
            "ORDERS_FULFILLED",
            &signature,
            order_payload(ORDER_ID + 1),
        ))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(ctx.queue.items().is_empty());
}

#[tokio::test]
async fn test_missing_signature_is_unauthorized() {
    let ctx = TestContext::new();
    let mut request = webhook_request("ORDERS_FULFILLED", "", order_payload(ORDER_ID));
    request.headers_mut().remove("x-shopify-hmac-sha256");

    let (status, _) = ctx.send(request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_shop_header_is_bad_request() {
    let ctx = TestContext::new();
    let body = order_payload(ORDER_ID);
    let signature = sign(&body);
    let mut request = webhook_request("ORDERS_FULFILLED", &signature, body);
    request.headers_mut().remove("x-shopify-shop-domain");

    let (status, _) = ctx.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(ctx.queue.items().is_empty());
}

#[tokio::test]
async fn test_shop_without_session_is_bad_request() {
    let ctx = TestContext::without_session();

    let (status, _) = ctx.deliver("ORDERS_FULFILLED", ORDER_ID).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(ctx.queue.items().is_empty());
}

// =============================================================================
// Backend failures
// =============================================================================

#[tokio::test]
async fn test_shopify_outage_is_server_error() {
    let ctx = TestContext::new();
    ctx.shopify.set_failing(true);

    let (status, body) = ctx.deliver("ORDERS_FULFILLED", ORDER_ID).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Internal server error");
    assert!(ctx.queue.items().is_empty());
}

#[tokio::test]
async fn test_queue_outage_is_server_error() {
    let ctx = TestContext::new();
    ctx.queue.set_unavailable(true);

    let (status, body) = ctx.deliver("ORDERS_FULFILLED", ORDER_ID).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Internal server error");
}
