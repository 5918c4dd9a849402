//! Shopify webhook receiver.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::db::{CredentialStore, EmailQueueStore};
use crate::error::AppError;
use crate::services::InboundWebhook;
use crate::shopify::StoreApiFactory;
use crate::shopify::webhooks::{HMAC_HEADER, SHOP_DOMAIN_HEADER, TOPIC_HEADER};
use crate::state::AppState;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// `POST /webhooks/orders-fulfilled`
///
/// The body is taken as raw bytes so the signature is checked over exactly
/// what Shopify sent.
///
/// # Errors
///
/// Returns 400/401 for rejected webhooks and 500 for backend failures.
pub async fn orders_fulfilled<Q, C, F>(
    State(state): State<AppState<Q, C, F>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), AppError>
where
    Q: EmailQueueStore,
    C: CredentialStore,
    F: StoreApiFactory,
{
    let outcome = state
        .intake()
        .handle(InboundWebhook {
            topic: header(&headers, TOPIC_HEADER),
            signature: header(&headers, HMAC_HEADER),
            shop_domain: header(&headers, SHOP_DOMAIN_HEADER),
            body: &body,
        })
        .await?;

    Ok((StatusCode::OK, outcome.message()))
}
