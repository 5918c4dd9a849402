//! Database operations for the review-request pipeline.
//!
//! ## Tables
//!
//! - `email_queue` - Durable review-request send tasks (`PENDING` / `SENT` / `FAILED`)
//! - `shop_sessions` - Shopify sessions written by the app's OAuth flow (read-only here)
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p yay-reviews-cli -- migrate
//! ```
//!
//! # Storage seams
//!
//! The intake and sweep services are generic over [`EmailQueueStore`] and
//! [`CredentialStore`] so they can run against Postgres in production and
//! against the in-memory stores in [`memory`] under test.

pub mod email_queue;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod shop_sessions;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use email_queue::{EmailQueueItem, EmailQueueRepository, EmailQueueStore, NewEmailQueueItem};
pub use shop_sessions::{CredentialStore, ShopSessionRepository};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique key).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
