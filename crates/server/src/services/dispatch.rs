//! Rendering and sending one review request.

use std::time::Duration;

use thiserror::Error;
use tracing::instrument;
use yay_reviews_core::{OrderId, ShopDomain};

use crate::db::{CredentialStore, EmailQueueItem, RepositoryError};
use crate::shopify::{AdminShopifyError, EmailSettings, StoreApi, StoreApiFactory};

use super::email::{MailTransport, OutgoingEmail, SendOutcome};
use super::template::{EmailKind, RenderError, render_review_request, render_test_email};

/// Most recipients a test email may be sent to.
pub const MAX_TEST_RECIPIENTS: usize = 5;

/// Why a queue item could not be sent.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No stored access token for the shop.
    #[error("no access token for shop")]
    NoAccessToken,

    /// The merchant never saved email settings.
    #[error("shop has no email settings")]
    NoEmailSettings,

    /// Shopify returned no order for the ID.
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// Neither the customer nor the order has an email address.
    #[error("order has no recipient email")]
    NoRecipient,

    /// More recipients than a test email allows.
    #[error("at most 5 recipients allowed, got {0}")]
    TooManyRecipients(usize),

    /// Admin API call failed.
    #[error(transparent)]
    Shopify(#[from] AdminShopifyError),

    /// Template rendering failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The mail transport rejected the email.
    #[error("send failed: {0}")]
    Send(String),

    /// Processing exceeded the per-item bound.
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The queue or credential store failed.
    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

impl DispatchError {
    /// Stable code recorded in `email_queue.last_error`.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoAccessToken => "NoAccessToken",
            Self::NoEmailSettings => "NoEmailSettings",
            Self::OrderNotFound(_) => "OrderNotFound",
            Self::NoRecipient => "NoRecipient",
            Self::TooManyRecipients(_) => "TooManyRecipients",
            Self::Shopify(_) => "Shopify",
            Self::Render(_) => "Render",
            Self::Send(_) => "Send",
            Self::Timeout(_) => "Timeout",
            Self::Storage(_) => "Storage",
        }
    }

    /// `code: message`, as stored with a `FAILED` row.
    #[must_use]
    pub fn last_error(&self) -> String {
        format!("{}: {self}", self.code())
    }
}

/// Send the review request for one queue item.
///
/// # Errors
///
/// Returns the first failure; nothing is retried.
#[instrument(skip_all, fields(shop = %item.shop, order_id = %item.order_id))]
pub async fn dispatch_review_request<C, F, M>(
    credentials: &C,
    shopify: &F,
    mailer: &M,
    item: &EmailQueueItem,
) -> Result<(), DispatchError>
where
    C: CredentialStore,
    F: StoreApiFactory,
    M: MailTransport,
{
    let token = credentials
        .access_token(&item.shop)
        .await?
        .ok_or(DispatchError::NoAccessToken)?;
    let api = shopify.connect(&item.shop, token);

    let settings = api
        .email_settings()
        .await?
        .ok_or(DispatchError::NoEmailSettings)?;
    let order = api
        .order_info(&item.order_id)
        .await?
        .ok_or_else(|| DispatchError::OrderNotFound(item.order_id.clone()))?;
    let recipient = order.recipient().ok_or(DispatchError::NoRecipient)?;

    let rendered = render_review_request(
        &item.shop,
        item.shop.as_str(),
        &settings.reminder(),
        &order,
    )?;

    let email = OutgoingEmail {
        to: vec![recipient.to_string()],
        subject: rendered.subject,
        html: rendered.html,
    };
    deliver(mailer, &email).await
}

/// Send `kind` rendered with sample data to up to five recipients.
///
/// # Errors
///
/// Returns an error for zero or too many recipients, or if rendering or
/// delivery fails.
#[instrument(skip(mailer, settings))]
pub async fn send_test_email<M: MailTransport>(
    mailer: &M,
    shop: &ShopDomain,
    settings: &EmailSettings,
    kind: EmailKind,
    recipients: &[String],
) -> Result<(), DispatchError> {
    if recipients.is_empty() {
        return Err(DispatchError::NoRecipient);
    }
    if recipients.len() > MAX_TEST_RECIPIENTS {
        return Err(DispatchError::TooManyRecipients(recipients.len()));
    }

    let rendered = render_test_email(shop, settings, kind)?;
    let email = OutgoingEmail {
        to: recipients.to_vec(),
        subject: rendered.subject,
        html: rendered.html,
    };
    deliver(mailer, &email).await
}

async fn deliver<M: MailTransport>(mailer: &M, email: &OutgoingEmail) -> Result<(), DispatchError> {
    match mailer.send(email).await {
        SendOutcome::Sent => Ok(()),
        SendOutcome::Failed { message } => Err(DispatchError::Send(message)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeDelta, Utc};
    use yay_reviews_core::{QueueItemId, QueueStatus, WebhookTopic};

    use super::*;
    use crate::db::memory::MemoryCredentials;
    use crate::services::email::RecordingMailer;
    use crate::services::template::sample_order;
    use crate::shopify::OrderCustomer;
    use crate::shopify::stub::StubShopify;

    fn shop() -> ShopDomain {
        ShopDomain::parse("demo.myshopify.com").unwrap()
    }

    fn item() -> EmailQueueItem {
        let now = Utc::now();
        EmailQueueItem {
            id: QueueItemId::generate(),
            shop: shop(),
            order_id: OrderId::from(1001_u64),
            topic: WebhookTopic::OrdersFulfilled,
            fulfillment_at: now,
            send_schedule_at: now + TimeDelta::days(5),
            status: QueueStatus::Pending,
            last_error: None,
            leased_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn order_with_email(email: Option<&str>) -> crate::shopify::OrderInfo {
        let mut order = sample_order();
        order.customer = Some(OrderCustomer {
            first_name: Some("Jane".to_string()),
            last_name: Some("Doe".to_string()),
            email: email.map(str::to_string),
        });
        order
    }

    #[tokio::test]
    async fn test_dispatch_sends_to_customer() {
        let credentials = MemoryCredentials::new().with_token(&shop(), "shpat_demo");
        let shopify = StubShopify::new()
            .with_settings(&shop(), EmailSettings::default())
            .with_order(&shop(), &OrderId::from(1001_u64), order_with_email(Some("jane@example.com")));
        let mailer = RecordingMailer::new();

        dispatch_review_request(&credentials, &shopify, &mailer, &item())
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, ["jane@example.com"]);
        assert!(sent[0].html.contains("Hi Jane Doe"));
        assert_eq!(shopify.connections()[0].1, "shpat_demo");
    }

    #[tokio::test]
    async fn test_dispatch_failure_codes() {
        let mailer = RecordingMailer::new();
        let shopify = StubShopify::new().with_settings(&shop(), EmailSettings::default());

        let err = dispatch_review_request(&MemoryCredentials::new(), &shopify, &mailer, &item())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NoAccessToken");

        let credentials = MemoryCredentials::new().with_token(&shop(), "shpat_demo");
        let err = dispatch_review_request(&credentials, &shopify, &mailer, &item())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "OrderNotFound");

        let shopify = shopify.with_order(&shop(), &OrderId::from(1001_u64), order_with_email(None));
        let err = dispatch_review_request(&credentials, &shopify, &mailer, &item())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NoRecipient");
        assert!(err.last_error().starts_with("NoRecipient: "));
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_reports_transport_failure() {
        let credentials = MemoryCredentials::new().with_token(&shop(), "shpat_demo");
        let shopify = StubShopify::new()
            .with_settings(&shop(), EmailSettings::default())
            .with_order(&shop(), &OrderId::from(1001_u64), order_with_email(Some("jane@example.com")));
        let mailer = RecordingMailer::new();
        mailer.fail_with(Some("Connection reset by peer"));

        let err = dispatch_review_request(&credentials, &shopify, &mailer, &item())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "Send");
        assert_eq!(err.last_error(), "Send: send failed: Connection reset by peer");
    }

    #[tokio::test]
    async fn test_send_test_email_recipient_bounds() {
        let mailer = RecordingMailer::new();
        let settings = EmailSettings::default();
        let recipients = |n: usize| -> Vec<String> {
            (0..n).map(|i| format!("qa{i}@example.com")).collect()
        };

        let err = send_test_email(&mailer, &shop(), &settings, EmailKind::Reminder, &[])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NoRecipient");

        let err = send_test_email(&mailer, &shop(), &settings, EmailKind::Reminder, &recipients(6))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "TooManyRecipients");

        send_test_email(&mailer, &shop(), &settings, EmailKind::Reward, &recipients(5))
            .await
            .unwrap();
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to.len(), 5);
        assert_eq!(sent[0].subject, "Reward for you");
    }
}
