//! End-to-end tests from fulfillment webhook to sent review request.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use chrono::TimeDelta;
use yay_reviews_core::{OrderId, QueueStatus};
use yay_reviews_integration_tests::{
    CUSTOMER_EMAIL, ORDER_ID, TestContext, at, customer_order, shop,
};
use yay_reviews_server::services::SweepReport;
use yay_reviews_server::shopify::EmailSettings;

/// 01:00 UTC on the day the default webhook's email falls due.
const SEND_DAY_TRIGGER: &str = "2025-07-09T01:00:00Z";

#[tokio::test]
async fn test_fulfilled_order_gets_review_request_on_send_day() {
    let ctx = TestContext::new();
    let (status, _) = ctx.deliver("ORDERS_FULFILLED", ORDER_ID).await;
    assert_eq!(status, StatusCode::OK);

    ctx.clock.set(at(SEND_DAY_TRIGGER));
    let report = ctx.sweeper.run_once().await.unwrap();

    assert_eq!(
        report,
        SweepReport {
            due: 1,
            sent: 1,
            failed: 0,
            skipped: 0
        }
    );

    let sent = ctx.mailer.sent();
    assert_eq!(sent.len(), 1);
    let email = sent.first().unwrap();
    assert_eq!(email.to, [CUSTOMER_EMAIL]);
    assert_eq!(email.subject, "Reminder email for you");
    assert!(email.html.contains("Hi Jane Roe"));
    assert!(email.html.contains("t-neck"));
    assert!(email.html.contains("Leave a review"));

    let item = ctx.queue.items().into_iter().next().unwrap();
    assert_eq!(item.status, QueueStatus::Sent);
    assert!(item.last_error.is_none());
}

#[tokio::test]
async fn test_nothing_sent_before_send_day() {
    let ctx = TestContext::new();
    ctx.deliver("ORDERS_FULFILLED", ORDER_ID).await;

    ctx.clock.set(at(SEND_DAY_TRIGGER) - TimeDelta::days(1));
    let report = ctx.sweeper.run_once().await.unwrap();

    assert_eq!(report.due, 0);
    assert!(ctx.mailer.sent().is_empty());
    assert_eq!(
        ctx.queue.items().first().unwrap().status,
        QueueStatus::Pending
    );
}

#[tokio::test]
async fn test_missed_day_is_not_picked_up_later() {
    let ctx = TestContext::new();
    ctx.deliver("ORDERS_FULFILLED", ORDER_ID).await;

    ctx.clock.set(at(SEND_DAY_TRIGGER) + TimeDelta::days(1));
    let report = ctx.sweeper.run_once().await.unwrap();

    assert_eq!(report.due, 0);
    assert!(ctx.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_second_sweep_same_day_sends_nothing() {
    let ctx = TestContext::new();
    ctx.deliver("ORDERS_FULFILLED", ORDER_ID).await;

    ctx.clock.set(at(SEND_DAY_TRIGGER));
    ctx.sweeper.run_once().await.unwrap();
    ctx.clock.advance(TimeDelta::hours(6));
    let again = ctx.sweeper.run_once().await.unwrap();

    assert_eq!(again.sent, 0);
    assert_eq!(ctx.mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_custom_subject_and_heading_are_used() {
    let ctx = TestContext::with_settings(Some(EmailSettings {
        email_subject: Some("How was your order, {customer_name}?".to_string()),
        email_heading: Some("Thanks from {site_title}".to_string()),
        ..EmailSettings::default()
    }));
    ctx.deliver("ORDERS_FULFILLED", ORDER_ID).await;

    ctx.clock.set(at(SEND_DAY_TRIGGER));
    ctx.sweeper.run_once().await.unwrap();

    let email = ctx.mailer.sent().into_iter().next().unwrap();
    assert_eq!(email.subject, "How was your order, Jane Roe?");
    assert!(email.html.contains(&format!("Thanks from {}", shop())));
}

#[tokio::test]
async fn test_order_without_email_is_marked_failed() {
    let ctx = TestContext::new();
    let guest_order = 1002_u64;
    let _ = ctx
        .shopify
        .clone()
        .with_order(&shop(), &OrderId::from(guest_order), customer_order(None));
    ctx.deliver("ORDERS_FULFILLED", ORDER_ID).await;
    ctx.deliver("ORDERS_FULFILLED", guest_order).await;

    ctx.clock.set(at(SEND_DAY_TRIGGER));
    let report = ctx.sweeper.run_once().await.unwrap();

    assert_eq!(report.due, 2);
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 1);

    let guest = ctx
        .queue
        .items()
        .into_iter()
        .find(|item| item.order_id == OrderId::from(guest_order))
        .unwrap();
    assert_eq!(guest.status, QueueStatus::Failed);
    assert!(guest.last_error.unwrap().starts_with("NoRecipient"));
}

#[tokio::test]
async fn test_transport_failure_is_recorded() {
    let ctx = TestContext::new();
    ctx.deliver("ORDERS_FULFILLED", ORDER_ID).await;
    ctx.mailer.fail_with(Some("550 mailbox unavailable"));

    ctx.clock.set(at(SEND_DAY_TRIGGER));
    let report = ctx.sweeper.run_once().await.unwrap();

    assert_eq!(report.failed, 1);
    let item = ctx.queue.items().into_iter().next().unwrap();
    assert_eq!(item.status, QueueStatus::Failed);
    assert_eq!(
        item.last_error.as_deref(),
        Some("Send: send failed: 550 mailbox unavailable")
    );

    // FAILED rows are never retried
    ctx.mailer.fail_with(None);
    ctx.clock.advance(TimeDelta::hours(1));
    assert_eq!(ctx.sweeper.run_once().await.unwrap().due, 0);
}

#[tokio::test]
async fn test_uninstalled_shop_fails_at_send_time() {
    let ctx = TestContext::new();
    ctx.deliver("ORDERS_FULFILLED", ORDER_ID).await;
    ctx.credentials.revoke(&shop());

    ctx.clock.set(at(SEND_DAY_TRIGGER));
    let report = ctx.sweeper.run_once().await.unwrap();

    assert_eq!(report.failed, 1);
    let item = ctx.queue.items().into_iter().next().unwrap();
    assert_eq!(item.status, QueueStatus::Failed);
    assert!(item.last_error.unwrap().starts_with("NoAccessToken"));
    assert!(ctx.mailer.sent().is_empty());
}
