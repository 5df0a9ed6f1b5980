use axum::http::StatusCode;
use thiserror::Error;

use crate::store::StoreError;

/// Typed error hierarchy for bookhook.
///
/// Use at module boundaries (payload decoding, webhook auth, dataset access, config).
/// Internal/leaf functions can continue using `anyhow::Result`; the `Internal` variant
/// allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum BookhookError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The payload is not a webhook we handle (no `object` discriminator).
    #[error("Unrecognized payload: {0}")]
    Validation(String),

    /// The body is not JSON at all.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using `BookhookError`.
pub type BookhookResult<T> = std::result::Result<T, BookhookError>;

impl BookhookError {
    /// HTTP status the webhook controller answers with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Config(_) | Self::Store(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
