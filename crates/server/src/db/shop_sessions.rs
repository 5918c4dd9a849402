//! Shop session repository.
//!
//! Sessions are written by the app's OAuth flow; this service only reads the
//! stored access token for a shop.

use std::future::Future;

use secrecy::SecretString;
use sqlx::PgPool;
use yay_reviews_core::ShopDomain;

use super::RepositoryError;

/// Resolves the Admin API credential for a tenant.
pub trait CredentialStore: Send + Sync {
    /// Access token for `shop`, or `None` if the app has no usable session.
    fn access_token(
        &self,
        shop: &ShopDomain,
    ) -> impl Future<Output = Result<Option<SecretString>, RepositoryError>> + Send;
}

/// `PostgreSQL`-backed [`CredentialStore`] over `shop_sessions`.
#[derive(Debug, Clone)]
pub struct ShopSessionRepository {
    pool: PgPool,
}

impl ShopSessionRepository {
    /// Create a new shop session repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CredentialStore for ShopSessionRepository {
    /// Prefers the offline session; online sessions are only used until they expire.
    async fn access_token(&self, shop: &ShopDomain) -> Result<Option<SecretString>, RepositoryError> {
        let token: Option<String> = sqlx::query_scalar(
            r"
            SELECT access_token
            FROM shop_sessions
            WHERE shop = $1
              AND access_token <> ''
              AND (is_online = false OR expires_at IS NULL OR expires_at > now())
            ORDER BY is_online ASC, updated_at DESC
            LIMIT 1
            ",
        )
        .bind(shop)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token.map(SecretString::from))
    }
}
