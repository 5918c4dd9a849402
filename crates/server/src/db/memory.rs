//! In-memory stores for tests.
//!
//! Clones share state, so a test can hand one clone to the service under test
//! and inspect rows through another.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use secrecy::SecretString;
use yay_reviews_core::{QueueItemId, QueueStatus, ShopDomain, day_window};

use super::{
    CredentialStore, EmailQueueItem, EmailQueueStore, NewEmailQueueItem, RepositoryError,
};

fn unavailable() -> RepositoryError {
    RepositoryError::Database(sqlx::Error::PoolTimedOut)
}

/// [`EmailQueueStore`] backed by a `Vec`.
#[derive(Debug, Clone, Default)]
pub struct MemoryEmailQueue {
    rows: Arc<Mutex<Vec<EmailQueueItem>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryEmailQueue {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row in insertion order.
    #[must_use]
    pub fn items(&self) -> Vec<EmailQueueItem> {
        self.rows().clone()
    }

    /// Make every subsequent call fail with a database error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn rows(&self) -> MutexGuard<'_, Vec<EmailQueueItem>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }
}

impl EmailQueueStore for MemoryEmailQueue {
    async fn insert(
        &self,
        item: NewEmailQueueItem,
    ) -> Result<Option<EmailQueueItem>, RepositoryError> {
        self.check_available()?;
        let mut rows = self.rows();

        if rows.iter().any(|row| {
            row.shop == item.shop && row.order_id == item.order_id && row.topic == item.topic
        }) {
            return Ok(None);
        }

        let row = EmailQueueItem {
            id: QueueItemId::generate(),
            shop: item.shop,
            order_id: item.order_id,
            topic: item.topic,
            fulfillment_at: item.fulfillment_at,
            send_schedule_at: item.send_schedule_at,
            status: QueueStatus::Pending,
            last_error: None,
            leased_until: None,
            created_at: item.fulfillment_at,
            updated_at: item.fulfillment_at,
        };
        rows.push(row.clone());
        Ok(Some(row))
    }

    async fn find_due_on(&self, day: NaiveDate) -> Result<Vec<EmailQueueItem>, RepositoryError> {
        self.check_available()?;
        let (start, end) = day_window(day);

        let mut due: Vec<EmailQueueItem> = self
            .rows()
            .iter()
            .filter(|row| {
                row.status == QueueStatus::Pending
                    && row.send_schedule_at >= start
                    && row.send_schedule_at < end
            })
            .cloned()
            .collect();
        due.sort_by_key(|row| (row.send_schedule_at, row.created_at));
        Ok(due)
    }

    async fn claim(
        &self,
        id: QueueItemId,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        self.check_available()?;
        let mut rows = self.rows();

        let Some(row) = rows.iter_mut().find(|row| row.id == id) else {
            return Ok(false);
        };
        let free = row.leased_until.is_none_or(|until| until <= now);
        if row.status != QueueStatus::Pending || !free {
            return Ok(false);
        }

        row.leased_until = Some(lease_until);
        row.updated_at = now;
        Ok(true)
    }

    async fn update_status(
        &self,
        id: QueueItemId,
        status: QueueStatus,
        last_error: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        self.check_available()?;
        let mut rows = self.rows();

        let Some(row) = rows.iter_mut().find(|row| row.id == id) else {
            return Ok(false);
        };
        if !row.status.can_transition_to(status) {
            return Ok(false);
        }

        row.status = status;
        row.last_error = last_error.map(str::to_owned);
        row.leased_until = None;
        row.updated_at = Utc::now();
        Ok(true)
    }

    async fn find_by_id(&self, id: QueueItemId) -> Result<Option<EmailQueueItem>, RepositoryError> {
        self.check_available()?;
        Ok(self.rows().iter().find(|row| row.id == id).cloned())
    }

    async fn list_for_shop(
        &self,
        shop: &ShopDomain,
        status: Option<QueueStatus>,
        limit: i64,
    ) -> Result<Vec<EmailQueueItem>, RepositoryError> {
        self.check_available()?;
        let limit = usize::try_from(limit).unwrap_or(0);

        let mut rows: Vec<EmailQueueItem> = self
            .rows()
            .iter()
            .filter(|row| &row.shop == shop && status.is_none_or(|s| row.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }
}

/// [`CredentialStore`] backed by a map of shop to token.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentials {
    tokens: Arc<Mutex<HashMap<ShopDomain, String>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryCredentials {
    /// No stored sessions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `token` for `shop`, replacing any previous one.
    #[must_use]
    pub fn with_token(self, shop: &ShopDomain, token: &str) -> Self {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(shop.clone(), token.to_owned());
        self
    }

    /// Forget `shop`'s session, as an uninstall would.
    pub fn revoke(&self, shop: &ShopDomain) {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(shop);
    }

    /// Make every subsequent lookup fail with a database error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl CredentialStore for MemoryCredentials {
    async fn access_token(&self, shop: &ShopDomain) -> Result<Option<SecretString>, RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(shop)
            .cloned()
            .map(SecretString::from))
    }
}
