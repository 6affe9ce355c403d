//! Errors returned by `ReviewWorkflow` operations.

use thiserror::Error;

use review_core::{AppealId, OrderId, ReviewId, StoreId};

use crate::search::SearchError;
use crate::store::StoreError;

/// Coarse classification of a [`ReviewError`], used by callers to decide
/// whether a retry can succeed and by the HTTP layer to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Invalid,
    NotFound,
    Conflict,
    Forbidden,
    Transient,
    /// Stored data the service cannot interpret. Retrying will not help.
    Internal,
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("order {order_id} already has a review")]
    DuplicateReview { order_id: OrderId },

    #[error("review {review_id} not found")]
    ReviewNotFound { review_id: ReviewId },

    #[error("review {review_id} not found for store {store_id}")]
    ReviewNotFoundOrForeign {
        review_id: ReviewId,
        store_id: StoreId,
    },

    #[error("store {store_id} does not own review {review_id}")]
    Forbidden {
        review_id: ReviewId,
        store_id: StoreId,
    },

    #[error("review {review_id} already has a reply")]
    AlreadyReplied { review_id: ReviewId },

    #[error("appeal {appeal_id} not found for review {review_id}")]
    AppealNotFound {
        appeal_id: AppealId,
        review_id: ReviewId,
    },

    #[error("appeal on review {review_id} has already been adjudicated")]
    AppealAlreadyAdjudicated { review_id: ReviewId },

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Search(#[from] SearchError),
}

impl ReviewError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Invalid,
            Self::ReviewNotFound { .. }
            | Self::ReviewNotFoundOrForeign { .. }
            | Self::AppealNotFound { .. } => ErrorKind::NotFound,
            Self::DuplicateReview { .. }
            | Self::AlreadyReplied { .. }
            | Self::AppealAlreadyAdjudicated { .. } => ErrorKind::Conflict,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::Storage(StoreError::Corruption { .. }) => ErrorKind::Internal,
            Self::Storage(_) | Self::Search(_) => ErrorKind::Transient,
        }
    }

    /// Only storage and search failures can succeed on retry, and not when
    /// the stored data itself is corrupt.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_are_retryable() {
        let storage = ReviewError::from(StoreError::storage("commit", "disk full"));
        assert_eq!(storage.kind(), ErrorKind::Transient);
        assert!(storage.is_retryable());

        let search = ReviewError::from(SearchError::Transport("refused".to_string()));
        assert!(search.is_retryable());

        let conflict = ReviewError::AlreadyReplied {
            review_id: ReviewId(1),
        };
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
        assert!(!conflict.is_retryable());

        let forbidden = ReviewError::Forbidden {
            review_id: ReviewId(1),
            store_id: StoreId(6),
        };
        assert_eq!(forbidden.kind(), ErrorKind::Forbidden);
        assert!(!ReviewError::validation("score").is_retryable());
    }

    #[test]
    fn test_corrupt_rows_are_not_retryable() {
        let corrupt = ReviewError::from(StoreError::corruption("status 99 on review 7"));
        assert_eq!(corrupt.kind(), ErrorKind::Internal);
        assert!(!corrupt.is_retryable());

        let busy = ReviewError::from(StoreError::storage("commit", "database is locked"));
        assert_eq!(busy.kind(), ErrorKind::Transient);
    }

    #[test]
    fn test_messages_name_the_entities() {
        let err = ReviewError::DuplicateReview {
            order_id: OrderId(100),
        };
        assert_eq!(err.to_string(), "order 100 already has a review");

        let err = ReviewError::Forbidden {
            review_id: ReviewId(7),
            store_id: StoreId(6),
        };
        assert_eq!(err.to_string(), "store 6 does not own review 7");
    }
}
