//! Unified error handling for HTTP handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::services::IntakeError;

/// Application-level error type for HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    /// Webhook was rejected.
    #[error(transparent)]
    Intake(#[from] IntakeError),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Intake(e) => e.status_code(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Log server errors with Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        // Don't expose internal error details to clients
        let message = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RepositoryError;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(IntakeError::InvalidTopic("CARTS_UPDATE".to_string()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(IntakeError::Unauthorized.into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(IntakeError::MissingShopDomain.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(IntakeError::Storage(RepositoryError::NotFound).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_app_error_display() {
        let err: AppError = IntakeError::InvalidTopic("CARTS_UPDATE".to_string()).into();
        assert_eq!(err.to_string(), "Invalid webhook topic: CARTS_UPDATE");
    }

    #[tokio::test]
    async fn test_storage_failure_hides_details() {
        let err: AppError =
            IntakeError::Storage(RepositoryError::Database(sqlx::Error::PoolTimedOut)).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(body.as_ref(), b"Internal server error");
    }
}
