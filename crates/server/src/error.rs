//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-side errors to
//! Sentry before responding to the client. All route handlers return
//! `Result<T, AppError>`; the response body is always `{"error": "..."}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use bazaar_core::ReorderError;

use crate::db::RepositoryError;
use crate::models::cart::CartError;
use crate::models::promotion::PromotionError;
use crate::services::{
    AuthError, CartServiceError, CheckoutError, ImageHostError, OrderError, WebhookError,
};

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartServiceError),

    /// Checkout failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Order or delivery lifecycle operation failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Image upload failed.
    #[error("Image host error: {0}")]
    ImageHost(#[from] ImageHostError),

    /// Webhook verification failed.
    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    /// Reorder request was invalid.
    #[error("Reorder error: {0}")]
    Reorder(#[from] ReorderError),

    /// Promotion terms were invalid.
    #[error("Promotion error: {0}")]
    Promotion(#[from] PromotionError),

    /// Session store failure.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but may not act on the resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request conflicts with current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

const fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Conflict(_) => StatusCode::CONFLICT,
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn repository_message(err: &RepositoryError) -> String {
    match err {
        RepositoryError::NotFound => "Not found".to_string(),
        RepositoryError::Conflict(msg) => msg.clone(),
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            "Internal server error".to_string()
        }
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(err) => repository_status(err),
            Self::Auth(err) => match err {
                AuthError::InvalidEmail(_) | AuthError::InvalidName | AuthError::WeakPassword(_) => {
                    StatusCode::BAD_REQUEST
                }
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::Repository(e) => repository_status(e),
                AuthError::PasswordHash => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Cart(err) => match err {
                CartServiceError::Cart(CartError::NotInCart)
                | CartServiceError::ProductNotFound => StatusCode::NOT_FOUND,
                CartServiceError::Cart(_) | CartServiceError::Promotion(_) => {
                    StatusCode::BAD_REQUEST
                }
                CartServiceError::InsufficientStock { .. } => StatusCode::CONFLICT,
                CartServiceError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
                CartServiceError::Repository(e) => repository_status(e),
            },
            Self::Checkout(err) => match err {
                CheckoutError::EmptyCart | CheckoutError::Invalid(_) => StatusCode::BAD_REQUEST,
                CheckoutError::ProductUnavailable(_)
                | CheckoutError::InsufficientStock(_)
                | CheckoutError::Promotion(PromotionError::UsageLimitReached) => {
                    StatusCode::CONFLICT
                }
                CheckoutError::Promotion(_) => StatusCode::BAD_REQUEST,
                CheckoutError::Repository(e) => repository_status(e),
            },
            Self::Order(err) => match err {
                OrderError::Transition(_)
                | OrderError::NotCancellable
                | OrderError::DeliveryNotAllowed(_) => StatusCode::CONFLICT,
                OrderError::MissingCarrier | OrderError::AmountMismatch { .. } => {
                    StatusCode::BAD_REQUEST
                }
                OrderError::NotFound | OrderError::UnknownReference => StatusCode::NOT_FOUND,
                OrderError::Repository(e) => repository_status(e),
            },
            Self::ImageHost(err) => match err {
                ImageHostError::NotConfigured | ImageHostError::InvalidFile(_) => {
                    StatusCode::BAD_REQUEST
                }
                ImageHostError::Request(_)
                | ImageHostError::Status(_)
                | ImageHostError::MissingUrl => StatusCode::BAD_GATEWAY,
            },
            Self::Webhook(err) => match err {
                WebhookError::MissingHeader(_) | WebhookError::InvalidSignature(_) => {
                    StatusCode::UNAUTHORIZED
                }
                WebhookError::Payload(_) => StatusCode::BAD_REQUEST,
            },
            Self::Reorder(_) | Self::Promotion(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Session(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client. Internal details are never exposed.
    #[must_use]
    pub fn public_message(&self) -> String {
        let status = self.status();
        if status.is_server_error() {
            return if status == StatusCode::BAD_GATEWAY {
                "Image host error".to_string()
            } else {
                "Internal server error".to_string()
            };
        }

        match self {
            Self::Database(err) => repository_message(err),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => "Invalid credentials".to_string(),
                AuthError::UserAlreadyExists => {
                    "An account with this email already exists".to_string()
                }
                AuthError::WeakPassword(msg) => msg.clone(),
                AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
                AuthError::Repository(e) => repository_message(e),
                _ => err.to_string(),
            },
            Self::Cart(CartServiceError::Repository(e))
            | Self::Checkout(CheckoutError::Repository(e))
            | Self::Order(OrderError::Repository(e)) => repository_message(e),
            Self::Cart(err) => err.to_string(),
            Self::Checkout(err) => err.to_string(),
            Self::Order(err) => err.to_string(),
            Self::ImageHost(err) => err.to_string(),
            Self::Webhook(err) => err.to_string(),
            Self::Reorder(err) => err.to_string(),
            Self::Promotion(err) => err.to_string(),
            Self::NotFound(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg)
            | Self::Conflict(msg) => msg.clone(),
            Self::RateLimited => "Too many requests".to_string(),
            Self::Session(_) | Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use http_body_util::BodyExt;

    use bazaar_core::{OrderStatus, ProductId};

    use super::*;

    async fn body_of(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product-123".to_string());
        assert_eq!(err.to_string(), "Not found: product-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Unauthorized("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AppError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_domain_error_status_codes() {
        assert_eq!(
            AppError::from(RepositoryError::Conflict("slug taken".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(CheckoutError::InsufficientStock("Mug".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(CheckoutError::ProductUnavailable(ProductId::new(1))).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(CheckoutError::Promotion(PromotionError::Expired)).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(OrderError::Transition(
                OrderStatus::Delivered.transition_to(OrderStatus::Paid).unwrap_err()
            ))
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(ImageHostError::NotConfigured).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(ImageHostError::Status(500)).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::from(WebhookError::MissingHeader("x-bazaar-signature")).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::from(ReorderError::Empty).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(AuthError::InvalidCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_error_body_is_json() {
        let (status, body) = body_of(AppError::Conflict("order already has a delivery".into())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "order already has a delivery");
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let (status, body) =
            body_of(AppError::Internal("connection refused at 10.0.0.3".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");

        let (status, body) = body_of(AppError::from(ImageHostError::Status(503))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Image host error");
    }

    #[tokio::test]
    async fn test_transition_message_is_shown() {
        let err = OrderStatus::Cancelled
            .transition_to(OrderStatus::Shipped)
            .unwrap_err();
        let (_, body) = body_of(AppError::from(OrderError::Transition(err))).await;
        assert_eq!(body["error"], "cannot move order from cancelled to shipped");
    }
}
