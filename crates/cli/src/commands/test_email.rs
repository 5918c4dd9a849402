//! Test email command.
//!
//! Renders the shop's saved template with a sample order so a merchant can
//! preview it without waiting for a real fulfillment.

use yay_reviews_core::ShopDomain;
use yay_reviews_server::config::ServerConfig;
use yay_reviews_server::db::{self, ShopSessionRepository};
use yay_reviews_server::services::{EmailKind, SmtpMailer, send_test_email};
use yay_reviews_server::shopify::{ShopifyClientFactory, StoreApi};

use super::connect_shop;

/// Send `kind` to `to` using `shop`'s email settings.
///
/// # Errors
///
/// Returns an error if the shop has no session or saved settings, the
/// recipient list is empty or longer than five, or delivery fails.
pub async fn send(
    shop: &str,
    kind: EmailKind,
    to: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;
    let shop = ShopDomain::parse(shop)?;
    let pool = db::create_pool(&config.database_url).await?;

    let api = connect_shop(
        &ShopSessionRepository::new(pool),
        &ShopifyClientFactory::new(&config.shopify.api_version),
        &shop,
    )
    .await?;
    let settings = api
        .email_settings()
        .await?
        .ok_or_else(|| format!("No email settings saved for {shop}"))?;

    let mailer = SmtpMailer::new(&config.email)?;
    send_test_email(&mailer, &shop, &settings, kind, to).await?;

    tracing::info!(%shop, ?kind, recipients = to.len(), "Test email sent");
    Ok(())
}
