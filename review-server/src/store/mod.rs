//! Persistence abstraction for reviews, replies and appeals.
//!
//! This module defines the `ReviewStore` trait the workflow writes through.
//! Implementations provide the storage backend (in-memory, SQLite, ...);
//! the workflow never sees a concrete engine.
//!
//! Multi-row writes go through [`ReviewStore::commit`], which takes a
//! [`UnitOfWork`]: an ordered list of guarded row operations that is applied
//! atomically. If any operation's guard fails, nothing in the unit is visible.

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use review_core::{
    Appeal, AppealId, AppealStatus, Media, OrderId, Reply, Review, ReviewId, StoreId,
};

/// Errors surfaced by a `ReviewStore`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("{what} already exists")]
    Duplicate { what: &'static str },

    /// A guarded operation in a unit of work found its row in the wrong state.
    /// The whole unit was rolled back.
    #[error("precondition failed for {op}")]
    Precondition { op: WriteOpKind },

    #[error("storage failure during {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },

    #[error("corrupt {what} in storage")]
    Corruption { what: String },
}

impl StoreError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        Self::Corruption { what: what.into() }
    }
}

/// Discriminant of a [`WriteOp`], used to report which guard failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOpKind {
    InsertReply,
    MarkReplied,
    AdjudicateAppeal,
    HideReview,
}

impl fmt::Display for WriteOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InsertReply => "insert_reply",
            Self::MarkReplied => "mark_replied",
            Self::AdjudicateAppeal => "adjudicate_appeal",
            Self::HideReview => "hide_review",
        };
        f.write_str(name)
    }
}

/// A single row operation inside a unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert a reply. Fails with `Duplicate` if the review already has one.
    InsertReply(Reply),
    /// Set `has_reply` on a review.
    /// Guard: the review exists and has no reply yet.
    MarkReplied { review_id: ReviewId },
    /// Record a verdict on an appeal.
    /// Guard: the appeal exists, belongs to `review_id` and is still pending.
    AdjudicateAppeal {
        appeal_id: AppealId,
        review_id: ReviewId,
        status: AppealStatus,
        op_user: String,
        reason: String,
    },
    /// Hide a review. Guard: the review exists.
    HideReview { review_id: ReviewId },
}

impl WriteOp {
    pub fn kind(&self) -> WriteOpKind {
        match self {
            Self::InsertReply(_) => WriteOpKind::InsertReply,
            Self::MarkReplied { .. } => WriteOpKind::MarkReplied,
            Self::AdjudicateAppeal { .. } => WriteOpKind::AdjudicateAppeal,
            Self::HideReview { .. } => WriteOpKind::HideReview,
        }
    }
}

/// Ordered list of write operations committed all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitOfWork {
    ops: Vec<WriteOp>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, op: WriteOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Mutable fields of a pending appeal, keyed by (review, store).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppealSubmission {
    pub review_id: ReviewId,
    pub store_id: StoreId,
    pub status: AppealStatus,
    pub content: String,
    pub reason: String,
    pub media: Media,
    pub submitted_at: DateTime<Utc>,
}

impl AppealSubmission {
    /// Build a fresh appeal record from this submission.
    pub fn into_appeal(self, appeal_id: AppealId) -> Appeal {
        Appeal {
            appeal_id,
            review_id: self.review_id,
            store_id: self.store_id,
            status: self.status,
            reason: self.reason,
            content: self.content,
            media: self.media,
            op_user: String::new(),
            created_at: self.submitted_at,
            updated_at: self.submitted_at,
        }
    }
}

/// Storage backend for the review domain.
///
/// Implementations must enforce uniqueness of `order_id` across reviews, of
/// `review_id` across replies and of `(review_id, store_id)` across appeals,
/// reporting violations as [`StoreError::Duplicate`].
#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn get_review(&self, review_id: ReviewId) -> Result<Option<Review>, StoreError>;

    async fn get_review_by_order(&self, order_id: OrderId) -> Result<Option<Review>, StoreError>;

    /// Get a review only if it belongs to `store_id`.
    async fn get_review_for_store(
        &self,
        review_id: ReviewId,
        store_id: StoreId,
    ) -> Result<Option<Review>, StoreError>;

    async fn get_reply_for_review(&self, review_id: ReviewId)
        -> Result<Option<Reply>, StoreError>;

    async fn get_appeal(&self, appeal_id: AppealId) -> Result<Option<Appeal>, StoreError>;

    async fn get_appeal_for_review(
        &self,
        review_id: ReviewId,
        store_id: StoreId,
    ) -> Result<Option<Appeal>, StoreError>;

    async fn insert_review(&self, review: &Review) -> Result<(), StoreError>;

    async fn insert_appeal(&self, appeal: &Appeal) -> Result<(), StoreError>;

    /// Overwrite the mutable fields of the pending appeal for
    /// `(submission.review_id, submission.store_id)`.
    ///
    /// Returns the updated record, or `None` if there is no appeal for the
    /// pair or it has already reached a terminal status.
    async fn resubmit_appeal(
        &self,
        submission: &AppealSubmission,
    ) -> Result<Option<Appeal>, StoreError>;

    /// Apply every operation in `unit` atomically.
    async fn commit(&self, unit: UnitOfWork) -> Result<(), StoreError>;
}

#[cfg(test)]
pub(crate) mod test_support;
