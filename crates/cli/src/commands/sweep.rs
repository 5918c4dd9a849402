//! One-off review request sweep.
//!
//! Runs the same processing as the server's daily trigger. Items already
//! claimed by a running server are skipped, so running both is safe.

use std::sync::Arc;

use chrono::NaiveDate;
use yay_reviews_core::{Clock, SystemClock};
use yay_reviews_server::config::ServerConfig;
use yay_reviews_server::db::{self, EmailQueueRepository, ShopSessionRepository};
use yay_reviews_server::services::{SmtpMailer, Sweeper};
use yay_reviews_server::shopify::ShopifyClientFactory;

/// Sweep items scheduled on `date`, or today (UTC) when `None`.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the database is unreachable,
/// or the due items cannot be listed. Per-item failures are recorded on the
/// queue rows instead.
pub async fn run(date: Option<NaiveDate>) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;
    let pool = db::create_pool(&config.database_url).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let day = date.unwrap_or_else(|| clock.today());
    let sweeper = Sweeper::new(
        EmailQueueRepository::new(pool.clone()),
        ShopSessionRepository::new(pool),
        ShopifyClientFactory::new(&config.shopify.api_version),
        SmtpMailer::new(&config.email)?,
        clock,
        &config.sweep,
    );

    tracing::info!(%day, "Running review request sweep");
    let report = sweeper.run_for(day).await?;
    tracing::info!(
        due = report.due,
        sent = report.sent,
        failed = report.failed,
        skipped = report.skipped,
        "Sweep complete"
    );
    Ok(())
}
