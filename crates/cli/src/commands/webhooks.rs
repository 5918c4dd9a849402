//! Webhook subscription command.
//!
//! Subscribes to `ORDERS_FULFILLED` when the app has protected customer data
//! access (`SHOPIFY_USE_PII=true`), otherwise to REST `fulfillments/create`.

use yay_reviews_core::ShopDomain;
use yay_reviews_server::config::ServerConfig;
use yay_reviews_server::db::{self, ShopSessionRepository};
use yay_reviews_server::shopify::ShopifyClientFactory;
use yay_reviews_server::shopify::webhooks::{RegisteredWebhook, register_review_webhook};

use super::connect_shop;

/// Register the fulfillment webhook for `shop`.
///
/// # Errors
///
/// Returns an error if the shop has no session or Shopify rejects both
/// subscription attempts.
pub async fn register(shop: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;
    let shop = ShopDomain::parse(shop)?;
    let pool = db::create_pool(&config.database_url).await?;

    let client = connect_shop(
        &ShopSessionRepository::new(pool),
        &ShopifyClientFactory::new(&config.shopify.api_version),
        &shop,
    )
    .await?;

    let callback_url = config.webhook_callback_url();
    let registered =
        register_review_webhook(&client, &callback_url, config.shopify.use_pii).await?;

    match &registered {
        RegisteredWebhook::GraphQL { id } => tracing::info!(
            %shop,
            subscription_id = %id,
            topic = registered.topic().as_str(),
            "Webhook registered"
        ),
        RegisteredWebhook::Rest => tracing::info!(
            %shop,
            topic = registered.topic().rest_name(),
            "Webhook registered"
        ),
    }
    Ok(())
}
