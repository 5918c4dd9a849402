//! Shopify Admin API access for the review pipeline.
//!
//! # Architecture
//!
//! - One [`ShopifyClient`] per tenant, built by [`ShopifyClientFactory`] from
//!   the shop domain and its stored access token
//! - Requests use the `graphql_client` request body shape over `reqwest`
//! - Reads the merchant's email settings metaobject and order details
//! - Registers the fulfillment webhook subscription
//!
//! The intake and sweep services only see the [`StoreApi`] and
//! [`StoreApiFactory`] traits so they can be exercised without network access.

mod client;
pub mod queries;
#[cfg(any(test, feature = "test-utils"))]
pub mod stub;
pub mod types;
pub mod webhooks;

use std::future::Future;

use secrecy::SecretString;
use thiserror::Error;
use yay_reviews_core::{OrderId, ShopDomain};

pub use client::{ShopifyClient, ShopifyClientFactory};
pub use types::{DiscountTrigger, EmailSettings, EmailTemplate, OrderCustomer, OrderInfo, ReviewProduct};

/// Errors that can occur when interacting with Shopify Admin API.
#[derive(Debug, Error)]
pub enum AdminShopifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// GraphQL query returned errors.
    #[error("GraphQL errors: {}", format_graphql_errors(.0))]
    GraphQL(Vec<GraphQLError>),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by Shopify.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Authentication/authorization failed.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User error from mutation (e.g., invalid input).
    #[error("User error: {0}")]
    UserError(String),
}

/// A GraphQL error returned by the Shopify Admin API.
#[derive(Debug, Clone)]
pub struct GraphQLError {
    /// Error message.
    pub message: String,
    /// Path to the error in the response.
    pub path: Vec<serde_json::Value>,
}

fn format_graphql_errors(errors: &[GraphQLError]) -> String {
    errors
        .iter()
        .map(|e| e.message.clone())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Per-tenant reads the review pipeline makes against the Admin API.
pub trait StoreApi: Send + Sync {
    /// The merchant's `$app:email_settings` metaobject, if one was saved.
    fn email_settings(
        &self,
    ) -> impl Future<Output = Result<Option<EmailSettings>, AdminShopifyError>> + Send;

    /// Customer, recipient and line-item products of an order.
    fn order_info(
        &self,
        order_id: &OrderId,
    ) -> impl Future<Output = Result<Option<OrderInfo>, AdminShopifyError>> + Send;
}

/// Builds a [`StoreApi`] for a shop from its stored credential.
pub trait StoreApiFactory: Send + Sync {
    /// Client type handed out per shop.
    type Api: StoreApi;

    /// Client scoped to `shop`, authenticated with `access_token`.
    fn connect(&self, shop: &ShopDomain, access_token: SecretString) -> Self::Api;
}
