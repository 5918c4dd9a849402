//! In-process stand-in for the Admin API, used by tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use yay_reviews_core::{OrderId, ShopDomain};

use super::{AdminShopifyError, EmailSettings, OrderInfo, StoreApi, StoreApiFactory};

#[derive(Debug, Default)]
struct StubState {
    settings: HashMap<ShopDomain, EmailSettings>,
    orders: HashMap<(ShopDomain, OrderId), OrderInfo>,
    tokens: Vec<(ShopDomain, String)>,
    delay: Option<Duration>,
}

/// [`StoreApiFactory`] serving canned settings and orders per shop.
///
/// Clones share state; every `connect` call is recorded with the token used.
#[derive(Debug, Clone, Default)]
pub struct StubShopify {
    state: Arc<Mutex<StubState>>,
    failing: Arc<AtomicBool>,
}

impl StubShopify {
    /// No shops configured.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `settings` for `shop`.
    #[must_use]
    pub fn with_settings(self, shop: &ShopDomain, settings: EmailSettings) -> Self {
        self.state().settings.insert(shop.clone(), settings);
        self
    }

    /// Serve `order` for `(shop, order_id)`.
    #[must_use]
    pub fn with_order(self, shop: &ShopDomain, order_id: &OrderId, order: OrderInfo) -> Self {
        self.state()
            .orders
            .insert((shop.clone(), order_id.clone()), order);
        self
    }

    /// Make every API call fail with an HTTP-level error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Sleep this long before answering each call.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state().delay = delay;
    }

    /// Tokens passed to `connect`, in call order.
    #[must_use]
    pub fn connections(&self) -> Vec<(ShopDomain, String)> {
        self.state().tokens.clone()
    }

    fn state(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StoreApiFactory for StubShopify {
    type Api = StubStoreApi;

    fn connect(&self, shop: &ShopDomain, access_token: SecretString) -> StubStoreApi {
        self.state()
            .tokens
            .push((shop.clone(), access_token.expose_secret().to_owned()));
        StubStoreApi {
            shop: shop.clone(),
            stub: self.clone(),
        }
    }
}

/// [`StoreApi`] for one shop of a [`StubShopify`].
#[derive(Debug, Clone)]
pub struct StubStoreApi {
    shop: ShopDomain,
    stub: StubShopify,
}

impl StubStoreApi {
    async fn before_call(&self) -> Result<(), AdminShopifyError> {
        let delay = self.stub.state().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.stub.failing.load(Ordering::SeqCst) {
            return Err(AdminShopifyError::GraphQL(vec![super::GraphQLError {
                message: "Internal error. Looks like something went wrong on our end.".to_string(),
                path: vec![],
            }]));
        }
        Ok(())
    }
}

impl StoreApi for StubStoreApi {
    async fn email_settings(&self) -> Result<Option<EmailSettings>, AdminShopifyError> {
        self.before_call().await?;
        Ok(self.stub.state().settings.get(&self.shop).cloned())
    }

    async fn order_info(&self, order_id: &OrderId) -> Result<Option<OrderInfo>, AdminShopifyError> {
        self.before_call().await?;
        Ok(self
            .stub
            .state()
            .orders
            .get(&(self.shop.clone(), order_id.clone()))
            .cloned())
    }
}
