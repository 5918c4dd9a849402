//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                     - Liveness check
//! GET  /health/ready               - Readiness check (database)
//!
//! # Webhooks (HMAC-verified)
//! POST /webhooks/orders-fulfilled  - Fulfillment notifications from Shopify
//! ```

pub mod health;
pub mod webhooks;

use axum::{
    Router,
    routing::{get, post},
};
use sqlx::PgPool;

use crate::db::{CredentialStore, EmailQueueStore};
use crate::shopify::StoreApiFactory;
use crate::state::AppState;

/// Path Shopify delivers fulfillment webhooks to.
pub const WEBHOOK_PATH: &str = "/webhooks/orders-fulfilled";

/// Webhook routes with their state applied.
pub fn webhook_routes<Q, C, F>(state: AppState<Q, C, F>) -> Router
where
    Q: EmailQueueStore + 'static,
    C: CredentialStore + 'static,
    F: StoreApiFactory + 'static,
{
    Router::new()
        .route(WEBHOOK_PATH, post(webhooks::orders_fulfilled::<Q, C, F>))
        .with_state(state)
}

/// Liveness and readiness checks.
pub fn health_routes(pool: PgPool) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .with_state(pool)
}
