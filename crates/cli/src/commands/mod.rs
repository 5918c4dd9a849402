//! Subcommand implementations.

pub mod migrate;
pub mod sweep;
pub mod test_email;
pub mod webhooks;

use yay_reviews_core::ShopDomain;
use yay_reviews_server::db::{CredentialStore, ShopSessionRepository};
use yay_reviews_server::shopify::{ShopifyClient, ShopifyClientFactory, StoreApiFactory};

/// Admin API client for `shop` using its stored session token.
async fn connect_shop(
    credentials: &ShopSessionRepository,
    shopify: &ShopifyClientFactory,
    shop: &ShopDomain,
) -> Result<ShopifyClient, Box<dyn std::error::Error>> {
    let token = credentials
        .access_token(shop)
        .await?
        .ok_or_else(|| format!("No access token stored for {shop}"))?;
    Ok(shopify.connect(shop, token))
}
