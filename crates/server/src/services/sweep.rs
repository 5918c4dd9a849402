//! Daily sweep over due queue items.
//!
//! Items are processed one at a time. Each is leased before any work so a
//! second sweeper skips it, bounded by a per-item timeout, and finished with
//! a conditional `PENDING -> SENT | FAILED` update. A failed item never stops
//! the batch and nothing is retried.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, TimeDelta};
use tracing::{debug, error, info, instrument, warn};
use yay_reviews_core::{Clock, QueueStatus};

use crate::config::SweepConfig;
use crate::db::{CredentialStore, EmailQueueItem, EmailQueueStore, RepositoryError};
use crate::shopify::StoreApiFactory;

use super::dispatch::{DispatchError, dispatch_review_request};
use super::email::MailTransport;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Pending items scheduled for the day.
    pub due: usize,
    /// Items marked `SENT`.
    pub sent: usize,
    /// Items marked `FAILED`.
    pub failed: usize,
    /// Items left `PENDING` (leased elsewhere or storage trouble).
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Sent,
    Failed,
    Skipped,
}

/// Sweep service.
pub struct Sweeper<Q, C, F, M> {
    queue: Q,
    credentials: C,
    shopify: F,
    mailer: M,
    clock: Arc<dyn Clock>,
    item_timeout: Duration,
    lease: TimeDelta,
}

impl<Q, C, F, M> std::fmt::Debug for Sweeper<Q, C, F, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper")
            .field("item_timeout", &self.item_timeout)
            .field("lease", &self.lease)
            .finish_non_exhaustive()
    }
}

impl<Q, C, F, M> Sweeper<Q, C, F, M>
where
    Q: EmailQueueStore,
    C: CredentialStore,
    F: StoreApiFactory,
    M: MailTransport,
{
    /// Create a sweeper using the timeout and lease from `config`.
    pub fn new(
        queue: Q,
        credentials: C,
        shopify: F,
        mailer: M,
        clock: Arc<dyn Clock>,
        config: &SweepConfig,
    ) -> Self {
        Self {
            queue,
            credentials,
            shopify,
            mailer,
            clock,
            item_timeout: config.item_timeout,
            lease: TimeDelta::from_std(config.lease).unwrap_or(TimeDelta::minutes(15)),
        }
    }

    /// Sweep items due today (UTC).
    ///
    /// # Errors
    ///
    /// Returns an error only if the due items cannot be listed.
    pub async fn run_once(&self) -> Result<SweepReport, RepositoryError> {
        self.run_for(self.clock.today()).await
    }

    /// Sweep items whose `send_schedule_at` falls on `day` (UTC).
    ///
    /// # Errors
    ///
    /// Returns an error only if the due items cannot be listed.
    #[instrument(skip(self))]
    pub async fn run_for(&self, day: NaiveDate) -> Result<SweepReport, RepositoryError> {
        let items = self.queue.find_due_on(day).await?;
        let mut report = SweepReport {
            due: items.len(),
            ..SweepReport::default()
        };

        for item in &items {
            match self.process(item).await {
                ItemOutcome::Sent => report.sent += 1,
                ItemOutcome::Failed => report.failed += 1,
                ItemOutcome::Skipped => report.skipped += 1,
            }
        }

        info!(
            due = report.due,
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            "Review request sweep finished"
        );
        Ok(report)
    }

    #[instrument(skip_all, fields(queue_item_id = %item.id, shop = %item.shop, order_id = %item.order_id))]
    async fn process(&self, item: &EmailQueueItem) -> ItemOutcome {
        let now = self.clock.now();
        match self.queue.claim(item.id, now, now + self.lease).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Queue item leased elsewhere, skipping");
                return ItemOutcome::Skipped;
            }
            Err(e) => {
                warn!(error = %e, "Failed to claim queue item");
                return ItemOutcome::Skipped;
            }
        }

        let dispatched = tokio::time::timeout(
            self.item_timeout,
            dispatch_review_request(&self.credentials, &self.shopify, &self.mailer, item),
        )
        .await
        .unwrap_or(Err(DispatchError::Timeout(self.item_timeout)));

        let (status, last_error, outcome) = match dispatched {
            Ok(()) => (QueueStatus::Sent, None, ItemOutcome::Sent),
            Err(DispatchError::Storage(e)) => {
                // Row stays PENDING; the lease expires before the next sweep
                warn!(error = %e, "Storage error while dispatching, leaving item pending");
                return ItemOutcome::Skipped;
            }
            Err(e) => {
                warn!(code = e.code(), error = %e, "Review request failed");
                (QueueStatus::Failed, Some(e.last_error()), ItemOutcome::Failed)
            }
        };

        match self
            .queue
            .update_status(item.id, status, last_error.as_deref())
            .await
        {
            Ok(true) => outcome,
            Ok(false) => {
                warn!(status = %status, "Queue item was no longer pending");
                ItemOutcome::Skipped
            }
            Err(e) => {
                error!(error = %e, status = %status, "Failed to record queue item status");
                outcome
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{DateTime, Utc};
    use yay_reviews_core::{FixedClock, OrderId, ShopDomain, WebhookTopic};

    use super::*;
    use crate::db::NewEmailQueueItem;
    use crate::db::memory::{MemoryCredentials, MemoryEmailQueue};
    use crate::services::email::RecordingMailer;
    use crate::services::template::sample_order;
    use crate::shopify::stub::StubShopify;
    use crate::shopify::{EmailSettings, OrderCustomer, OrderInfo};

    fn shop() -> ShopDomain {
        ShopDomain::parse("demo.myshopify.com").unwrap()
    }

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn order(email: Option<&str>) -> OrderInfo {
        let mut order = sample_order();
        order.customer = Some(OrderCustomer {
            first_name: Some("Jane".to_string()),
            last_name: Some("Doe".to_string()),
            email: email.map(str::to_string),
        });
        order
    }

    fn config(timeout: Duration) -> SweepConfig {
        SweepConfig {
            enabled: true,
            hour: 1,
            minute: 0,
            item_timeout: timeout,
            lease: Duration::from_secs(900),
        }
    }

    struct Harness {
        queue: MemoryEmailQueue,
        shopify: StubShopify,
        mailer: RecordingMailer,
        clock: FixedClock,
        sweeper: Sweeper<MemoryEmailQueue, MemoryCredentials, StubShopify, RecordingMailer>,
    }

    fn harness(timeout: Duration) -> Harness {
        let queue = MemoryEmailQueue::new();
        let credentials = MemoryCredentials::new().with_token(&shop(), "shpat_demo");
        let shopify = StubShopify::new()
            .with_settings(&shop(), EmailSettings::default())
            .with_order(&shop(), &OrderId::from(1_u64), order(Some("one@example.com")))
            .with_order(&shop(), &OrderId::from(2_u64), order(Some("two@example.com")))
            .with_order(&shop(), &OrderId::from(3_u64), order(None));
        let mailer = RecordingMailer::new();
        let clock = FixedClock::new(at("2025-07-09T01:00:00Z"));
        let sweeper = Sweeper::new(
            queue.clone(),
            credentials,
            shopify.clone(),
            mailer.clone(),
            Arc::new(clock.clone()),
            &config(timeout),
        );
        Harness {
            queue,
            shopify,
            mailer,
            clock,
            sweeper,
        }
    }

    async fn enqueue(queue: &MemoryEmailQueue, order: u64, send_at: &str) -> EmailQueueItem {
        queue
            .insert(NewEmailQueueItem {
                shop: shop(),
                order_id: OrderId::from(order),
                topic: WebhookTopic::OrdersFulfilled,
                fulfillment_at: at("2025-07-04T12:00:00Z"),
                send_schedule_at: at(send_at),
            })
            .await
            .unwrap()
            .unwrap()
    }

    async fn status_of(queue: &MemoryEmailQueue, item: &EmailQueueItem) -> EmailQueueItem {
        queue.find_by_id(item.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_sends_due_items_once() {
        let h = harness(Duration::from_secs(60));
        let item = enqueue(&h.queue, 1, "2025-07-09T12:00:00Z").await;

        let report = h.sweeper.run_once().await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                due: 1,
                sent: 1,
                failed: 0,
                skipped: 0
            }
        );
        assert_eq!(status_of(&h.queue, &item).await.status, QueueStatus::Sent);

        h.clock.advance(TimeDelta::hours(2));
        let again = h.sweeper.run_once().await.unwrap();
        assert_eq!(again.due, 0);
        assert_eq!(h.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_only_items_scheduled_today_are_due() {
        let h = harness(Duration::from_secs(60));
        enqueue(&h.queue, 1, "2025-07-08T23:59:59Z").await;
        let today = enqueue(&h.queue, 2, "2025-07-09T23:59:59Z").await;
        enqueue(&h.queue, 3, "2025-07-10T00:00:00Z").await;

        let report = h.sweeper.run_once().await.unwrap();
        assert_eq!(report.due, 1);
        assert_eq!(status_of(&h.queue, &today).await.status, QueueStatus::Sent);
        assert_eq!(h.mailer.sent()[0].to, ["two@example.com"]);
    }

    #[tokio::test]
    async fn test_transport_failure_is_recorded_and_sweep_continues() {
        let h = harness(Duration::from_secs(60));
        let failing = enqueue(&h.queue, 1, "2025-07-09T08:00:00Z").await;
        let ok = enqueue(&h.queue, 2, "2025-07-09T09:00:00Z").await;
        h.mailer.fail_for("one@example.com");

        let report = h.sweeper.run_once().await.unwrap();
        assert_eq!((report.sent, report.failed), (1, 1));

        let failed = status_of(&h.queue, &failing).await;
        assert_eq!(failed.status, QueueStatus::Failed);
        assert!(failed.last_error.unwrap().starts_with("Send: "));
        assert_eq!(status_of(&h.queue, &ok).await.status, QueueStatus::Sent);
    }

    #[tokio::test]
    async fn test_missing_recipient_fails_item() {
        let h = harness(Duration::from_secs(60));
        let item = enqueue(&h.queue, 3, "2025-07-09T08:00:00Z").await;

        h.sweeper.run_once().await.unwrap();
        let stored = status_of(&h.queue, &item).await;
        assert_eq!(stored.status, QueueStatus::Failed);
        assert!(stored.last_error.unwrap().starts_with("NoRecipient"));
        assert!(h.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_hung_send_times_out() {
        let h = harness(Duration::from_millis(50));
        let item = enqueue(&h.queue, 1, "2025-07-09T08:00:00Z").await;
        h.mailer.set_delay(Some(Duration::from_secs(5)));

        let report = h.sweeper.run_once().await.unwrap();
        assert_eq!(report.failed, 1);
        let stored = status_of(&h.queue, &item).await;
        assert_eq!(stored.status, QueueStatus::Failed);
        assert!(stored.last_error.unwrap().starts_with("Timeout"));
    }

    #[tokio::test]
    async fn test_leased_item_is_skipped() {
        let h = harness(Duration::from_secs(60));
        let item = enqueue(&h.queue, 1, "2025-07-09T08:00:00Z").await;
        let now = h.clock.now();
        assert!(h.queue.claim(item.id, now, now + TimeDelta::minutes(15)).await.unwrap());

        let report = h.sweeper.run_once().await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(status_of(&h.queue, &item).await.status, QueueStatus::Pending);
        assert!(h.shopify.connections().is_empty());
    }

    #[tokio::test]
    async fn test_shopify_failure_fails_item() {
        let h = harness(Duration::from_secs(60));
        let item = enqueue(&h.queue, 1, "2025-07-09T08:00:00Z").await;
        h.shopify.set_failing(true);

        h.sweeper.run_once().await.unwrap();
        let stored = status_of(&h.queue, &item).await;
        assert_eq!(stored.status, QueueStatus::Failed);
        assert!(stored.last_error.unwrap().starts_with("Shopify"));
    }

    #[tokio::test]
    async fn test_listing_failure_is_an_error() {
        let h = harness(Duration::from_secs(60));
        h.queue.set_unavailable(true);
        assert!(h.sweeper.run_once().await.is_err());
    }
}
