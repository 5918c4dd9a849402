//! Email queue repository: durable review-request send tasks.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use yay_reviews_core::{OrderId, QueueItemId, QueueStatus, ShopDomain, WebhookTopic, day_window};

use super::RepositoryError;

// =============================================================================
// Types
// =============================================================================

/// A scheduled review-request email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailQueueItem {
    /// Row ID.
    pub id: QueueItemId,
    /// Tenant that owns the order.
    pub shop: ShopDomain,
    /// Numeric Shopify order ID.
    pub order_id: OrderId,
    /// Webhook topic that created the row.
    pub topic: WebhookTopic,
    /// When the fulfillment webhook was accepted.
    pub fulfillment_at: DateTime<Utc>,
    /// When the email becomes due. Never changes after insert.
    pub send_schedule_at: DateTime<Utc>,
    /// Delivery status.
    pub status: QueueStatus,
    /// Error code and message recorded with `FAILED`.
    pub last_error: Option<String>,
    /// Claim held by a sweep instance, if any.
    pub leased_until: Option<DateTime<Utc>>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a queue row.
#[derive(Debug, Clone)]
pub struct NewEmailQueueItem {
    /// Tenant that owns the order.
    pub shop: ShopDomain,
    /// Numeric Shopify order ID.
    pub order_id: OrderId,
    /// Webhook topic that produced the event.
    pub topic: WebhookTopic,
    /// When the fulfillment webhook was accepted.
    pub fulfillment_at: DateTime<Utc>,
    /// When the email becomes due.
    pub send_schedule_at: DateTime<Utc>,
}

/// Internal row type for `PostgreSQL` queries.
#[derive(Debug, sqlx::FromRow)]
struct EmailQueueRow {
    id: QueueItemId,
    shop: ShopDomain,
    order_id: OrderId,
    topic: String,
    fulfillment_at: DateTime<Utc>,
    send_schedule_at: DateTime<Utc>,
    status: QueueStatus,
    last_error: Option<String>,
    leased_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EmailQueueRow> for EmailQueueItem {
    type Error = RepositoryError;

    fn try_from(row: EmailQueueRow) -> Result<Self, Self::Error> {
        let topic = WebhookTopic::from_header(&row.topic).ok_or_else(|| {
            RepositoryError::DataCorruption(format!(
                "email_queue {} has unknown topic {:?}",
                row.id, row.topic
            ))
        })?;

        Ok(Self {
            id: row.id,
            shop: row.shop,
            order_id: row.order_id,
            topic,
            fulfillment_at: row.fulfillment_at,
            send_schedule_at: row.send_schedule_at,
            status: row.status,
            last_error: row.last_error,
            leased_until: row.leased_until,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// =============================================================================
// Store trait
// =============================================================================

/// Storage operations the intake and sweep services need.
///
/// Every status write is conditional on the row still being `PENDING`, so
/// terminal rows are never revisited regardless of how many sweeps run.
pub trait EmailQueueStore: Send + Sync {
    /// Create a `PENDING` row.
    ///
    /// Returns `None` when a row for the same `(shop, order_id, topic)`
    /// already exists, so redelivered webhooks are absorbed.
    fn insert(
        &self,
        item: NewEmailQueueItem,
    ) -> impl Future<Output = Result<Option<EmailQueueItem>, RepositoryError>> + Send;

    /// `PENDING` rows whose `send_schedule_at` falls on `day` (UTC).
    fn find_due_on(
        &self,
        day: NaiveDate,
    ) -> impl Future<Output = Result<Vec<EmailQueueItem>, RepositoryError>> + Send;

    /// Take a lease on a `PENDING` row that is unleased or whose lease expired
    /// at or before `now`. Returns whether the lease was acquired.
    fn claim(
        &self,
        id: QueueItemId,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Move a `PENDING` row to `status`, clearing its lease.
    ///
    /// Returns `false` without touching the row if it is no longer `PENDING`.
    fn update_status(
        &self,
        id: QueueItemId,
        status: QueueStatus,
        last_error: Option<&str>,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Look up a single row.
    fn find_by_id(
        &self,
        id: QueueItemId,
    ) -> impl Future<Output = Result<Option<EmailQueueItem>, RepositoryError>> + Send;

    /// Most recent rows for a shop, optionally filtered by status.
    fn list_for_shop(
        &self,
        shop: &ShopDomain,
        status: Option<QueueStatus>,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<EmailQueueItem>, RepositoryError>> + Send;
}

// =============================================================================
// Repository
// =============================================================================

const COLUMNS: &str = "id, shop, order_id, topic, fulfillment_at, send_schedule_at, status, \
                       last_error, leased_until, created_at, updated_at";

/// `PostgreSQL`-backed [`EmailQueueStore`].
#[derive(Debug, Clone)]
pub struct EmailQueueRepository {
    pool: PgPool,
}

impl EmailQueueRepository {
    /// Create a new email queue repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_items(rows: Vec<EmailQueueRow>) -> Result<Vec<EmailQueueItem>, RepositoryError> {
    rows.into_iter().map(EmailQueueItem::try_from).collect()
}

impl EmailQueueStore for EmailQueueRepository {
    async fn insert(
        &self,
        item: NewEmailQueueItem,
    ) -> Result<Option<EmailQueueItem>, RepositoryError> {
        let row = sqlx::query_as::<_, EmailQueueRow>(&format!(
            r"
            INSERT INTO email_queue (id, shop, order_id, topic, fulfillment_at, send_schedule_at, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'PENDING')
            ON CONFLICT (shop, order_id, topic) DO NOTHING
            RETURNING {COLUMNS}
            "
        ))
        .bind(QueueItemId::generate())
        .bind(&item.shop)
        .bind(&item.order_id)
        .bind(item.topic.as_str())
        .bind(item.fulfillment_at)
        .bind(item.send_schedule_at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EmailQueueItem::try_from).transpose()
    }

    async fn find_due_on(&self, day: NaiveDate) -> Result<Vec<EmailQueueItem>, RepositoryError> {
        let (start, end) = day_window(day);

        let rows = sqlx::query_as::<_, EmailQueueRow>(&format!(
            r"
            SELECT {COLUMNS}
            FROM email_queue
            WHERE status = 'PENDING'
              AND send_schedule_at >= $1
              AND send_schedule_at < $2
            ORDER BY send_schedule_at, created_at
            "
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        into_items(rows)
    }

    async fn claim(
        &self,
        id: QueueItemId,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE email_queue
            SET leased_until = $3, updated_at = $2
            WHERE id = $1
              AND status = 'PENDING'
              AND (leased_until IS NULL OR leased_until <= $2)
            ",
        )
        .bind(id)
        .bind(now)
        .bind(lease_until)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_status(
        &self,
        id: QueueItemId,
        status: QueueStatus,
        last_error: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE email_queue
            SET status = $2, last_error = $3, leased_until = NULL, updated_at = now()
            WHERE id = $1 AND status = 'PENDING'
            ",
        )
        .bind(id)
        .bind(status)
        .bind(last_error)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_id(&self, id: QueueItemId) -> Result<Option<EmailQueueItem>, RepositoryError> {
        let row = sqlx::query_as::<_, EmailQueueRow>(&format!(
            "SELECT {COLUMNS} FROM email_queue WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EmailQueueItem::try_from).transpose()
    }

    async fn list_for_shop(
        &self,
        shop: &ShopDomain,
        status: Option<QueueStatus>,
        limit: i64,
    ) -> Result<Vec<EmailQueueItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, EmailQueueRow>(&format!(
            r"
            SELECT {COLUMNS}
            FROM email_queue
            WHERE shop = $1
              AND ($2::email_queue_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3
            "
        ))
        .bind(shop)
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        into_items(rows)
    }
}
