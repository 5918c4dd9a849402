//! Per-shop Shopify Admin API GraphQL client.

use std::sync::Arc;

use graphql_client::GraphQLQuery;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::instrument;
use yay_reviews_core::{OrderId, ShopDomain, WebhookTopic};

use super::queries::{
    FetchOrderInfo, GetEmailSettings, WebhookSubscriptionCreate, fetch_order_info,
    get_email_settings, webhook_subscription_create,
};
use super::{AdminShopifyError, EmailSettings, GraphQLError, OrderInfo, StoreApi, StoreApiFactory};

/// Shopify Admin API client bound to one shop and its access token.
#[derive(Clone)]
pub struct ShopifyClient {
    inner: Arc<ShopifyClientInner>,
}

struct ShopifyClientInner {
    client: reqwest::Client,
    shop: ShopDomain,
    api_version: String,
    access_token: SecretString,
}

impl std::fmt::Debug for ShopifyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyClient")
            .field("shop", &self.inner.shop)
            .field("api_version", &self.inner.api_version)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// GraphQL response wrapper.
#[derive(Debug, Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQLErrorResponse>>,
}

#[derive(Debug, Deserialize)]
struct GraphQLErrorResponse {
    message: String,
    #[serde(default)]
    path: Vec<serde_json::Value>,
}

/// Wait used when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 2;

/// Whole seconds from a `Retry-After` value such as `2` or `1.5`, rounded up.
///
/// Negative, non-numeric and NaN values yield `None`.
fn parse_retry_after(value: &str) -> Option<u64> {
    let value = value.trim();
    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
    let whole: u64 = whole.parse().ok()?;
    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let round_up = fraction.chars().any(|c| c != '0');
    Some(whole.saturating_add(u64::from(round_up)))
}

impl ShopifyClient {
    /// Create a client for `shop`.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        shop: ShopDomain,
        api_version: &str,
        access_token: SecretString,
    ) -> Self {
        Self {
            inner: Arc::new(ShopifyClientInner {
                client,
                shop,
                api_version: api_version.to_string(),
                access_token,
            }),
        }
    }

    /// Get the shop domain.
    #[must_use]
    pub fn shop(&self) -> &ShopDomain {
        &self.inner.shop
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "https://{}/admin/api/{}/{path}",
            self.inner.shop, self.inner.api_version
        )
    }

    /// Map the status codes Shopify uses for throttling and bad tokens.
    fn check_status(response: &reqwest::Response) -> Result<(), AdminShopifyError> {
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after)
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(AdminShopifyError::RateLimited(retry_after));
        }

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AdminShopifyError::Unauthorized(
                "Invalid or expired access token".to_string(),
            ));
        }

        Ok(())
    }

    // =========================================================================
    // GraphQL Execution
    // =========================================================================

    /// Execute a GraphQL query.
    async fn execute<Q: GraphQLQuery>(
        &self,
        variables: Q::Variables,
    ) -> Result<Q::ResponseData, AdminShopifyError>
    where
        Q::ResponseData: DeserializeOwned,
    {
        let body = Q::build_query(variables);

        let response = self
            .inner
            .client
            .post(self.endpoint("graphql.json"))
            .header("X-Shopify-Access-Token", self.inner.access_token.expose_secret())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        Self::check_status(&response)?;

        let graphql_response: GraphQLResponse<Q::ResponseData> =
            response.error_for_status()?.json().await?;

        if let Some(errors) = graphql_response.errors
            && !errors.is_empty()
        {
            return Err(AdminShopifyError::GraphQL(
                errors
                    .into_iter()
                    .map(|e| GraphQLError {
                        message: e.message,
                        path: e.path,
                    })
                    .collect(),
            ));
        }

        graphql_response.data.ok_or_else(|| {
            AdminShopifyError::GraphQL(vec![GraphQLError {
                message: "No data in response".to_string(),
                path: vec![],
            }])
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fetch the merchant's email settings metaobject.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(shop = %self.inner.shop))]
    pub async fn get_email_settings(&self) -> Result<Option<EmailSettings>, AdminShopifyError> {
        let data = self
            .execute::<GetEmailSettings>(get_email_settings::Variables)
            .await?;

        Ok(data.metaobjects.nodes.first().map(EmailSettings::from))
    }

    /// Fetch the parts of an order a review request needs.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(shop = %self.inner.shop, order_id = %order_id))]
    pub async fn get_order_info(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<OrderInfo>, AdminShopifyError> {
        let data = self
            .execute::<FetchOrderInfo>(fetch_order_info::Variables {
                id: order_id.to_gid(),
            })
            .await?;

        Ok(data.order.map(OrderInfo::from))
    }

    // =========================================================================
    // Webhook subscriptions
    // =========================================================================

    /// Subscribe to `topic` through the GraphQL Admin API.
    ///
    /// Returns the subscription's global ID.
    ///
    /// # Errors
    ///
    /// Returns `AdminShopifyError::UserError` if Shopify rejects the input
    /// (for example when the app lacks protected customer data access).
    #[instrument(skip(self), fields(shop = %self.inner.shop))]
    pub async fn create_webhook_subscription(
        &self,
        topic: WebhookTopic,
        callback_url: &str,
    ) -> Result<String, AdminShopifyError> {
        let data = self
            .execute::<WebhookSubscriptionCreate>(webhook_subscription_create::Variables {
                topic: topic.as_str().to_string(),
                webhook_subscription: webhook_subscription_create::WebhookSubscriptionInput {
                    callback_url: callback_url.to_string(),
                    format: "JSON".to_string(),
                },
            })
            .await?;

        let payload = data.webhook_subscription_create.ok_or_else(|| {
            AdminShopifyError::UserError("webhookSubscriptionCreate returned no payload".to_string())
        })?;

        if !payload.user_errors.is_empty() {
            let message = payload
                .user_errors
                .iter()
                .map(|e| e.message.clone())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(AdminShopifyError::UserError(message));
        }

        payload
            .webhook_subscription
            .map(|subscription| subscription.id)
            .ok_or_else(|| AdminShopifyError::NotFound("webhook subscription".to_string()))
    }

    /// Subscribe to `topic` through the REST Admin API.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Shopify rejects it.
    #[instrument(skip(self), fields(shop = %self.inner.shop))]
    pub async fn create_rest_webhook(
        &self,
        topic: WebhookTopic,
        address: &str,
    ) -> Result<(), AdminShopifyError> {
        let body = serde_json::json!({
            "webhook": {
                "topic": topic.rest_name(),
                "address": address,
                "format": "json",
            }
        });

        let response = self
            .inner
            .client
            .post(self.endpoint("webhooks.json"))
            .header("X-Shopify-Access-Token", self.inner.access_token.expose_secret())
            .json(&body)
            .send()
            .await?;

        Self::check_status(&response)?;

        if response.status() == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            let text = response.text().await.unwrap_or_default();
            return Err(AdminShopifyError::UserError(text));
        }

        response.error_for_status()?;
        Ok(())
    }
}

impl StoreApi for ShopifyClient {
    async fn email_settings(&self) -> Result<Option<EmailSettings>, AdminShopifyError> {
        self.get_email_settings().await
    }

    async fn order_info(&self, order_id: &OrderId) -> Result<Option<OrderInfo>, AdminShopifyError> {
        self.get_order_info(order_id).await
    }
}

/// Builds [`ShopifyClient`]s that share one HTTP connection pool.
#[derive(Debug, Clone)]
pub struct ShopifyClientFactory {
    client: reqwest::Client,
    api_version: String,
}

impl ShopifyClientFactory {
    /// Create a factory for the given Admin API version.
    #[must_use]
    pub fn new(api_version: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_version: api_version.to_string(),
        }
    }
}

impl StoreApiFactory for ShopifyClientFactory {
    type Api = ShopifyClient;

    fn connect(&self, shop: &ShopDomain, access_token: SecretString) -> ShopifyClient {
        ShopifyClient::new(
            self.client.clone(),
            shop.clone(),
            &self.api_version,
            access_token,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ShopifyClient {
        ShopifyClientFactory::new("2025-07").connect(
            &ShopDomain::parse("demo.myshopify.com").unwrap_or_else(|e| panic!("{e}")),
            SecretString::from("shpat_super_secret_token"),
        )
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            client().endpoint("graphql.json"),
            "https://demo.myshopify.com/admin/api/2025-07/graphql.json"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug_output = format!("{:?}", client());
        assert!(debug_output.contains("demo.myshopify.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("shpat_super_secret_token"));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("3"), Some(3));
        assert_eq!(parse_retry_after(" 2.0 "), Some(2));
        assert_eq!(parse_retry_after("1.5"), Some(2));
        assert_eq!(parse_retry_after("-1"), None);
        assert_eq!(parse_retry_after("-0.5"), None);
        assert_eq!(parse_retry_after("NaN"), None);
        assert_eq!(parse_retry_after("inf"), None);
        assert_eq!(parse_retry_after("1.5e3"), None);
        assert_eq!(parse_retry_after(""), None);
    }
}
