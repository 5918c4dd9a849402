//! Webhook signatures and subscription registration.

use std::future::Future;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tracing::{info, instrument, warn};
use yay_reviews_core::WebhookTopic;

use super::{AdminShopifyError, ShopifyClient};

/// Header carrying the base64 HMAC-SHA256 of the raw body.
pub const HMAC_HEADER: &str = "x-shopify-hmac-sha256";
/// Header carrying the webhook topic.
pub const TOPIC_HEADER: &str = "x-shopify-topic";
/// Header carrying the sending shop's domain.
pub const SHOP_DOMAIN_HEADER: &str = "x-shopify-shop-domain";

type HmacSha256 = Hmac<Sha256>;

// =============================================================================
// Signature verification
// =============================================================================

/// Signs and verifies webhook bodies with the app's API secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: SecretString,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl WebhookVerifier {
    /// Create a verifier for the app's API secret.
    #[must_use]
    pub const fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Base64 HMAC-SHA256 of `body`, as Shopify sends it.
    #[must_use]
    pub fn sign(&self, body: &[u8]) -> String {
        // HMAC accepts keys of any length
        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
        else {
            return String::new();
        };
        mac.update(body);
        BASE64.encode(mac.finalize().into_bytes())
    }

    /// Whether `signature` is the HMAC of exactly these bytes.
    #[must_use]
    pub fn verify(&self, body: &[u8], signature: &str) -> bool {
        let expected = self.sign(body);
        !expected.is_empty() && constant_time_compare(&expected, signature.trim())
    }
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

// =============================================================================
// Subscription registration
// =============================================================================

/// The two ways the Admin API accepts webhook subscriptions.
pub trait WebhookRegistrar: Send + Sync {
    /// GraphQL `webhookSubscriptionCreate`; returns the subscription ID.
    fn subscribe_graphql(
        &self,
        topic: WebhookTopic,
        callback_url: &str,
    ) -> impl Future<Output = Result<String, AdminShopifyError>> + Send;

    /// REST `POST webhooks.json`.
    fn subscribe_rest(
        &self,
        topic: WebhookTopic,
        address: &str,
    ) -> impl Future<Output = Result<(), AdminShopifyError>> + Send;
}

impl WebhookRegistrar for ShopifyClient {
    async fn subscribe_graphql(
        &self,
        topic: WebhookTopic,
        callback_url: &str,
    ) -> Result<String, AdminShopifyError> {
        self.create_webhook_subscription(topic, callback_url).await
    }

    async fn subscribe_rest(
        &self,
        topic: WebhookTopic,
        address: &str,
    ) -> Result<(), AdminShopifyError> {
        self.create_rest_webhook(topic, address).await
    }
}

/// Which subscription ended up registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisteredWebhook {
    /// `ORDERS_FULFILLED` via GraphQL.
    GraphQL {
        /// Subscription global ID.
        id: String,
    },
    /// `fulfillments/create` via REST.
    Rest,
}

impl RegisteredWebhook {
    /// Topic the subscription delivers.
    #[must_use]
    pub const fn topic(&self) -> WebhookTopic {
        match self {
            Self::GraphQL { .. } => WebhookTopic::OrdersFulfilled,
            Self::Rest => WebhookTopic::FulfillmentsCreate,
        }
    }
}

/// Subscribe the shop to fulfillment notifications at `callback_url`.
///
/// `ORDERS_FULFILLED` carries customer data, so it is only attempted when the
/// app has protected customer data access (`use_pii`). Any GraphQL failure
/// falls back to the REST `fulfillments/create` topic.
///
/// # Errors
///
/// Returns the REST error if the fallback subscription also fails.
#[instrument(skip(registrar))]
pub async fn register_review_webhook<R: WebhookRegistrar>(
    registrar: &R,
    callback_url: &str,
    use_pii: bool,
) -> Result<RegisteredWebhook, AdminShopifyError> {
    if use_pii {
        match registrar
            .subscribe_graphql(WebhookTopic::OrdersFulfilled, callback_url)
            .await
        {
            Ok(id) => {
                info!(subscription_id = %id, "Registered ORDERS_FULFILLED webhook");
                return Ok(RegisteredWebhook::GraphQL { id });
            }
            Err(e) => {
                warn!(error = %e, "GraphQL webhook registration failed, falling back to REST");
            }
        }
    }

    registrar
        .subscribe_rest(WebhookTopic::FulfillmentsCreate, callback_url)
        .await?;
    info!("Registered fulfillments/create webhook");
    Ok(RegisteredWebhook::Rest)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SecretString::from("hush"))
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hell"));
    }

    #[test]
    fn test_sign_known_vector() {
        // RFC 4231 test case 2: key "Jefe"
        let verifier = WebhookVerifier::new(SecretString::from("Jefe"));
        assert_eq!(
            verifier.sign(b"what do ya want for nothing?"),
            "W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM="
        );
    }

    #[test]
    fn test_verify_exact_bytes() {
        let body = br#"{"id":820982911946154508}"#;
        let signature = verifier().sign(body);
        assert!(verifier().verify(body, &signature));
        assert!(!verifier().verify(body, ""));
        assert!(!verifier().verify(body, "bm90IGEgc2lnbmF0dXJl"));
    }

    #[test]
    fn test_any_single_byte_mutation_is_rejected() {
        let body = br#"{"order_id":450789469}"#.to_vec();
        let signature = verifier().sign(&body);

        for i in 0..body.len() {
            let mut mutated = body.clone();
            mutated[i] ^= 0x01;
            assert!(!verifier().verify(&mutated, &signature), "byte {i}");
        }
    }

    #[test]
    fn test_verifier_debug_redacts_secret() {
        assert!(!format!("{:?}", verifier()).contains("hush"));
    }

    #[derive(Default)]
    struct FakeRegistrar {
        graphql_fails: bool,
        calls: Mutex<Vec<(&'static str, WebhookTopic, String)>>,
    }

    impl WebhookRegistrar for FakeRegistrar {
        async fn subscribe_graphql(
            &self,
            topic: WebhookTopic,
            callback_url: &str,
        ) -> Result<String, AdminShopifyError> {
            self.calls
                .lock()
                .unwrap()
                .push(("graphql", topic, callback_url.to_string()));
            if self.graphql_fails {
                return Err(AdminShopifyError::UserError(
                    "This app is not approved to subscribe to webhook topics containing protected customer data."
                        .to_string(),
                ));
            }
            Ok("gid://shopify/WebhookSubscription/1".to_string())
        }

        async fn subscribe_rest(
            &self,
            topic: WebhookTopic,
            address: &str,
        ) -> Result<(), AdminShopifyError> {
            self.calls
                .lock()
                .unwrap()
                .push(("rest", topic, address.to_string()));
            Ok(())
        }
    }

    const CALLBACK: &str = "https://reviews.example.com/webhooks/orders-fulfilled";

    #[tokio::test]
    async fn test_register_with_pii_uses_graphql() {
        let registrar = FakeRegistrar::default();
        let registered = register_review_webhook(&registrar, CALLBACK, true).await.unwrap();

        assert_eq!(registered.topic(), WebhookTopic::OrdersFulfilled);
        let calls = registrar.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "graphql");
    }

    #[tokio::test]
    async fn test_register_falls_back_to_rest() {
        let registrar = FakeRegistrar {
            graphql_fails: true,
            ..FakeRegistrar::default()
        };
        let registered = register_review_webhook(&registrar, CALLBACK, true).await.unwrap();

        assert_eq!(registered, RegisteredWebhook::Rest);
        let calls = registrar.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].0, "rest");
        assert_eq!(calls[1].1, WebhookTopic::FulfillmentsCreate);
        assert_eq!(calls[1].2, CALLBACK);
    }

    #[tokio::test]
    async fn test_register_without_pii_skips_graphql() {
        let registrar = FakeRegistrar::default();
        register_review_webhook(&registrar, CALLBACK, false).await.unwrap();

        let calls = registrar.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "rest");
    }
}
