//! Fulfillment webhook intake.
//!
//! Turns an authenticated "order fulfilled" notification into a `PENDING`
//! queue row scheduled `daySend` days out. Checks run in a fixed order and
//! every rejection happens before anything is written.

use std::sync::Arc;

use axum::http::StatusCode;
use chrono::TimeDelta;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument};
use yay_reviews_core::{Clock, OrderId, ShopDomain, WebhookTopic};

use crate::db::{CredentialStore, EmailQueueItem, EmailQueueStore, NewEmailQueueItem, RepositoryError};
use crate::shopify::webhooks::WebhookVerifier;
use crate::shopify::{AdminShopifyError, StoreApi, StoreApiFactory};

/// Why a webhook was rejected.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// Topic header missing or not a fulfillment topic.
    #[error("Invalid webhook topic: {0}")]
    InvalidTopic(String),

    /// Signature header missing or not matching the body.
    #[error("Invalid webhook signature")]
    Unauthorized,

    /// Shop domain header missing or malformed.
    #[error("Missing or invalid shop domain")]
    MissingShopDomain,

    /// No stored credential for the shop.
    #[error("No access token for shop {0}")]
    NoAccessToken(ShopDomain),

    /// Body is not JSON or carries no usable order ID.
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    /// Admin API call failed.
    #[error("Shopify error: {0}")]
    Shopify(#[from] AdminShopifyError),

    /// Queue or credential store failed.
    #[error("Storage error: {0}")]
    Storage(#[from] RepositoryError),
}

impl IntakeError {
    /// HTTP status returned to Shopify.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidTopic(_)
            | Self::MissingShopDomain
            | Self::NoAccessToken(_)
            | Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Shopify(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// What an accepted webhook did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// A new queue row was created.
    Enqueued(EmailQueueItem),
    /// The `(shop, order, topic)` row already exists.
    Duplicate,
    /// The merchant has not configured review emails.
    NoEmailSettings,
}

impl IntakeOutcome {
    /// Plain-text response body.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Enqueued(_) => "Webhook processed successfully",
            Self::Duplicate => "Webhook already processed",
            Self::NoEmailSettings => "No email settings configured",
        }
    }
}

/// Raw request parts of an inbound webhook.
#[derive(Debug, Clone, Copy)]
pub struct InboundWebhook<'a> {
    /// `x-shopify-topic`
    pub topic: Option<&'a str>,
    /// `x-shopify-hmac-sha256`
    pub signature: Option<&'a str>,
    /// `x-shopify-shop-domain`
    pub shop_domain: Option<&'a str>,
    /// Body bytes exactly as received.
    pub body: &'a [u8],
}

/// Webhook intake service.
pub struct WebhookIntake<Q, C, F> {
    queue: Q,
    credentials: C,
    shopify: F,
    verifier: WebhookVerifier,
    clock: Arc<dyn Clock>,
}

impl<Q, C, F> std::fmt::Debug for WebhookIntake<Q, C, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookIntake")
            .field("verifier", &self.verifier)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<Q, C, F> WebhookIntake<Q, C, F>
where
    Q: EmailQueueStore,
    C: CredentialStore,
    F: StoreApiFactory,
{
    /// Create the intake service.
    pub fn new(
        queue: Q,
        credentials: C,
        shopify: F,
        verifier: WebhookVerifier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            queue,
            credentials,
            shopify,
            verifier,
            clock,
        }
    }

    /// Validate `webhook` and enqueue its review request.
    ///
    /// # Errors
    ///
    /// Returns the first failed check; nothing is written on error.
    #[instrument(skip_all, fields(topic = webhook.topic, shop = webhook.shop_domain))]
    pub async fn handle(&self, webhook: InboundWebhook<'_>) -> Result<IntakeOutcome, IntakeError> {
        let raw_topic = webhook.topic.unwrap_or_default();
        let topic = WebhookTopic::from_header(raw_topic)
            .ok_or_else(|| IntakeError::InvalidTopic(raw_topic.to_string()))?;

        let signature = webhook.signature.ok_or(IntakeError::Unauthorized)?;
        if !self.verifier.verify(webhook.body, signature) {
            return Err(IntakeError::Unauthorized);
        }

        let shop = webhook
            .shop_domain
            .and_then(|domain| ShopDomain::parse(domain).ok())
            .ok_or(IntakeError::MissingShopDomain)?;
        let token = self
            .credentials
            .access_token(&shop)
            .await?
            .ok_or_else(|| IntakeError::NoAccessToken(shop.clone()))?;

        let order_id = order_id_from_payload(webhook.body)?;

        let api = self.shopify.connect(&shop, token);
        let Some(settings) = api.email_settings().await? else {
            info!(shop = %shop, "No email settings, skipping review request");
            return Ok(IntakeOutcome::NoEmailSettings);
        };

        let fulfillment_at = self.clock.now();
        let send_schedule_at =
            fulfillment_at + TimeDelta::days(i64::from(settings.days_to_wait()));

        let inserted = self
            .queue
            .insert(NewEmailQueueItem {
                shop,
                order_id,
                topic,
                fulfillment_at,
                send_schedule_at,
            })
            .await?;

        match inserted {
            Some(item) => {
                info!(
                    queue_item_id = %item.id,
                    order_id = %item.order_id,
                    send_schedule_at = %item.send_schedule_at,
                    "Review request scheduled"
                );
                Ok(IntakeOutcome::Enqueued(item))
            }
            None => {
                debug!("Duplicate webhook delivery ignored");
                Ok(IntakeOutcome::Duplicate)
            }
        }
    }
}

/// Order ID from `order_id` (fulfillments) or `id` (orders), number or string.
fn order_id_from_payload(body: &[u8]) -> Result<OrderId, IntakeError> {
    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| IntakeError::InvalidPayload(format!("body is not JSON: {e}")))?;

    let raw = payload
        .get("order_id")
        .filter(|v| !v.is_null())
        .or_else(|| payload.get("id"))
        .ok_or_else(|| IntakeError::InvalidPayload("missing order id".to_string()))?;

    match raw {
        Value::Number(n) => n
            .as_u64()
            .map(OrderId::from)
            .ok_or_else(|| IntakeError::InvalidPayload(format!("invalid order id {n}"))),
        Value::String(s) => {
            OrderId::parse(s).map_err(|e| IntakeError::InvalidPayload(e.to_string()))
        }
        other => Err(IntakeError::InvalidPayload(format!(
            "invalid order id {other}"
        ))),
    }
}
