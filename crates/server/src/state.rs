//! Application state shared across handlers.

use std::sync::Arc;

use crate::services::WebhookIntake;

/// Application state shared across all handlers.
///
/// Generic over the storage and Admin API seams so the router can be driven
/// against in-memory doubles.
pub struct AppState<Q, C, F> {
    inner: Arc<AppStateInner<Q, C, F>>,
}

struct AppStateInner<Q, C, F> {
    intake: WebhookIntake<Q, C, F>,
}

impl<Q, C, F> Clone for AppState<Q, C, F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Q, C, F> std::fmt::Debug for AppState<Q, C, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("intake", &self.inner.intake)
            .finish()
    }
}

impl<Q, C, F> AppState<Q, C, F> {
    /// Create application state.
    #[must_use]
    pub fn new(intake: WebhookIntake<Q, C, F>) -> Self {
        Self {
            inner: Arc::new(AppStateInner { intake }),
        }
    }

    /// Get the webhook intake service.
    #[must_use]
    pub fn intake(&self) -> &WebhookIntake<Q, C, F> {
        &self.inner.intake
    }
}
