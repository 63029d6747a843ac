//! Error taxonomy for the posting and storage paths.

use crate::core::model::{Currency, UserId};
use thiserror::Error;

/// Every violation found in an inbound reward request, reported together.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed: {}", .messages.join("; "))]
pub struct ValidationError {
    pub messages: Vec<String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("idempotency key already used: {0}")]
    UniqueViolation(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("row encoding error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures from the external price feed. Absorbed by whoever triggered the fetch.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("price feed failed for {symbol}: {message}")]
    Feed { symbol: String, message: String },

    #[error("price feed has no quote for {0}")]
    NoQuote(String),

    #[error("price feed returned unusable price {price} for {symbol}")]
    InvalidPrice { symbol: String, price: f64 },

    #[error("price feed timed out for {0}")]
    Timeout(String),

    #[error("failed to record price: {0}")]
    Store(#[from] StoreError),
}

/// Read-side failures while valuing a user's rewards.
#[derive(Debug, Error)]
pub enum ValuationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("value of {0} holdings is out of range")]
    Overflow(String),
}

#[derive(Debug, Error)]
pub enum PostingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid user id: {0}")]
    InvalidUserId(String),

    #[error("user not found: {0}")]
    UserNotFound(UserId),

    #[error("stock not found or inactive: {0}")]
    StockUnavailable(String),

    #[error("internal error")]
    Unbalanced(Currency),

    #[error("internal error")]
    Storage(#[from] StoreError),

    /// Quantity times price, or the fees on it, left the `Decimal` range.
    #[error("internal error")]
    Overflow(String),

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl PostingError {
    /// HTTP-equivalent status for callers exposing the engine over a wire.
    pub fn status_code(&self) -> u16 {
        match self {
            PostingError::Validation(_) | PostingError::InvalidUserId(_) => 400,
            PostingError::UserNotFound(_) | PostingError::StockUnavailable(_) => 422,
            PostingError::Unbalanced(_)
            | PostingError::Storage(_)
            | PostingError::Overflow(_)
            | PostingError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            PostingError::Validation(_) => "validation_error",
            PostingError::InvalidUserId(_) => "invalid_user_id",
            PostingError::UserNotFound(_) => "user_not_found",
            PostingError::StockUnavailable(_) => "stock_not_found_or_inactive",
            PostingError::Unbalanced(_)
            | PostingError::Storage(_)
            | PostingError::Overflow(_)
            | PostingError::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_codes_separate_client_and_server_faults() {
        let validation = PostingError::from(ValidationError {
            messages: vec!["user_id is required".to_string()],
        });
        assert_eq!(validation.status_code(), 400);
        assert_eq!(PostingError::InvalidUserId("x".into()).status_code(), 400);
        assert_eq!(PostingError::UserNotFound(Uuid::nil()).status_code(), 422);
        assert_eq!(PostingError::StockUnavailable("TCS.NS".into()).status_code(), 422);

        let storage = PostingError::from(StoreError::Backend("disk full".into()));
        assert_eq!(storage.status_code(), 500);
        assert_eq!(storage.to_string(), "internal error");
        assert_eq!(storage.code(), "internal_error");

        let overflow = PostingError::Overflow("TCS.NS".into());
        assert_eq!(overflow.status_code(), 500);
        assert_eq!(overflow.to_string(), "internal error");
    }

    #[test]
    fn test_validation_error_lists_all_messages() {
        let err = ValidationError {
            messages: vec![
                "user_id is required".to_string(),
                "quantity must be > 0".to_string(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "validation failed: user_id is required; quantity must be > 0"
        );
    }
}
