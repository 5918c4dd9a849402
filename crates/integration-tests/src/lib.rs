//! Integration tests for Yay Reviews.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p yay-reviews-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `webhook_intake` - The fulfillment webhook route over HTTP
//! - `review_sweep` - Webhook to queue to sweep to email
//!
//! Every test runs on the in-memory doubles behind the server's store, Shopify
//! and mail seams, so no database or network is needed.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tower::ServiceExt;
use yay_reviews_core::{FixedClock, OrderId, ShopDomain};
use yay_reviews_server::config::SweepConfig;
use yay_reviews_server::db::memory::{MemoryCredentials, MemoryEmailQueue};
use yay_reviews_server::routes::{WEBHOOK_PATH, webhook_routes};
use yay_reviews_server::services::email::RecordingMailer;
use yay_reviews_server::services::template::sample_order;
use yay_reviews_server::services::{Sweeper, WebhookIntake};
use yay_reviews_server::shopify::stub::StubShopify;
use yay_reviews_server::shopify::webhooks::{
    HMAC_HEADER, SHOP_DOMAIN_HEADER, TOPIC_HEADER, WebhookVerifier,
};
use yay_reviews_server::shopify::{EmailSettings, OrderCustomer, OrderInfo};
use yay_reviews_server::state::AppState;

/// Shop every test installs the app on.
pub const SHOP: &str = "demo.myshopify.com";
/// Webhook signing secret shared by the app and the test client.
pub const SECRET: &str = "shpss_integration_secret";
/// Order the default payload refers to.
pub const ORDER_ID: u64 = 450_789_469;
/// Email on the default order's customer.
pub const CUSTOMER_EMAIL: &str = "jane@example.com";
/// When the default webhook arrives.
pub const FULFILLED_AT: &str = "2025-07-04T12:00:00Z";

/// Sweeper over the in-memory doubles.
pub type TestSweeper = Sweeper<MemoryEmailQueue, MemoryCredentials, StubShopify, RecordingMailer>;

/// Parse an RFC 3339 timestamp.
///
/// # Panics
///
/// Panics if `s` is not a valid timestamp.
#[must_use]
pub fn at(s: &str) -> DateTime<Utc> {
    s.parse().expect("valid RFC 3339 timestamp")
}

/// The test shop's domain.
///
/// # Panics
///
/// Never; [`SHOP`] is a valid domain.
#[must_use]
pub fn shop() -> ShopDomain {
    ShopDomain::parse(SHOP).expect("valid shop domain")
}

/// Signature Shopify would send for `body`.
#[must_use]
pub fn sign(body: &[u8]) -> String {
    WebhookVerifier::new(SecretString::from(SECRET)).sign(body)
}

/// An `orders/fulfilled` payload for `order_id`.
#[must_use]
pub fn order_payload(order_id: u64) -> Vec<u8> {
    serde_json::json!({
        "id": order_id,
        "name": "#1001",
        "fulfillment_status": "fulfilled",
    })
    .to_string()
    .into_bytes()
}

/// The sample order bought by Jane Roe, optionally without any email.
#[must_use]
pub fn customer_order(email: Option<&str>) -> OrderInfo {
    let mut order = sample_order();
    order.email = None;
    order.customer = Some(OrderCustomer {
        first_name: Some("Jane".to_string()),
        last_name: Some("Roe".to_string()),
        email: email.map(str::to_string),
    });
    order
}

/// A signed webhook request as Shopify would deliver it.
///
/// # Panics
///
/// Panics if the request cannot be built.
#[must_use]
pub fn webhook_request(topic: &str, signature: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header("content-type", "application/json")
        .header(TOPIC_HEADER, topic)
        .header(HMAC_HEADER, signature)
        .header(SHOP_DOMAIN_HEADER, SHOP)
        .body(Body::from(body))
        .expect("valid request")
}

/// The app wired to in-memory doubles, with a controllable clock.
pub struct TestContext {
    /// Email queue shared by the router and the sweeper.
    pub queue: MemoryEmailQueue,
    /// Stored shop sessions.
    pub credentials: MemoryCredentials,
    /// Admin API double.
    pub shopify: StubShopify,
    /// Captures sent emails.
    pub mailer: RecordingMailer,
    /// Clock shared by intake and sweep.
    pub clock: FixedClock,
    /// Webhook routes.
    pub router: Router,
    /// Sweeper over the same doubles.
    pub sweeper: TestSweeper,
}

impl TestContext {
    /// Installed shop with default email settings and one known order.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(Some(EmailSettings::default()))
    }

    /// Installed shop with `settings` (or none saved) and one known order.
    #[must_use]
    pub fn with_settings(settings: Option<EmailSettings>) -> Self {
        Self::build(settings, true)
    }

    /// Shop with settings but no stored session (app uninstalled).
    #[must_use]
    pub fn without_session() -> Self {
        Self::build(Some(EmailSettings::default()), false)
    }

    fn build(settings: Option<EmailSettings>, installed: bool) -> Self {
        let queue = MemoryEmailQueue::new();
        let mut credentials = MemoryCredentials::new();
        if installed {
            credentials = credentials.with_token(&shop(), "shpat_integration");
        }
        let mut shopify = StubShopify::new().with_order(
            &shop(),
            &OrderId::from(ORDER_ID),
            customer_order(Some(CUSTOMER_EMAIL)),
        );
        if let Some(settings) = settings {
            shopify = shopify.with_settings(&shop(), settings);
        }
        let mailer = RecordingMailer::new();
        let clock = FixedClock::new(at(FULFILLED_AT));

        let intake = WebhookIntake::new(
            queue.clone(),
            credentials.clone(),
            shopify.clone(),
            WebhookVerifier::new(SecretString::from(SECRET)),
            Arc::new(clock.clone()),
        );
        let router = webhook_routes(AppState::new(intake));

        let sweeper = Sweeper::new(
            queue.clone(),
            credentials.clone(),
            shopify.clone(),
            mailer.clone(),
            Arc::new(clock.clone()),
            &SweepConfig::default(),
        );

        Self {
            queue,
            credentials,
            shopify,
            mailer,
            clock,
            router,
            sweeper,
        }
    }

    /// Send `request` through the router and collect the status and body.
    ///
    /// # Panics
    ///
    /// Panics if the router fails or the body cannot be read.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("readable body");
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Deliver a correctly signed webhook for `order_id`.
    pub async fn deliver(&self, topic: &str, order_id: u64) -> (StatusCode, String) {
        let body = order_payload(order_id);
        let signature = sign(&body);
        self.send(webhook_request(topic, &signature, body)).await
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
