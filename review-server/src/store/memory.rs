//! In-memory implementation of `ReviewStore`.
//!
//! All rows live in a single set of tables behind one `RwLock` and are lost on
//! restart. Used by tests and for running the service without a database.
//!
//! `commit` stages a unit of work on a full copy of the tables, so each commit
//! costs time proportional to the amount of stored data.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use review_core::{
    Appeal, AppealId, OrderId, Reply, ReplyId, Review, ReviewId, ReviewStatus, StoreId,
};

use super::{AppealSubmission, ReviewStore, StoreError, UnitOfWork, WriteOp};

#[derive(Debug, Clone, Default)]
struct Tables {
    reviews: HashMap<ReviewId, Review>,
    replies: HashMap<ReplyId, Reply>,
    appeals: HashMap<AppealId, Appeal>,
}

impl Tables {
    fn apply(&mut self, op: WriteOp, now: DateTime<Utc>) -> Result<(), StoreError> {
        let kind = op.kind();
        match op {
            WriteOp::InsertReply(reply) => {
                let taken = self.replies.contains_key(&reply.reply_id)
                    || self
                        .replies
                        .values()
                        .any(|existing| existing.review_id == reply.review_id);
                if taken {
                    return Err(StoreError::Duplicate { what: "reply" });
                }
                self.replies.insert(reply.reply_id, reply);
            }
            WriteOp::MarkReplied { review_id } => {
                let review = self
                    .reviews
                    .get_mut(&review_id)
                    .filter(|review| !review.has_reply)
                    .ok_or(StoreError::Precondition { op: kind })?;
                review.has_reply = true;
                review.version += 1;
                review.updated_at = now;
            }
            WriteOp::AdjudicateAppeal {
                appeal_id,
                review_id,
                status,
                op_user,
                reason,
            } => {
                let appeal = self
                    .appeals
                    .get_mut(&appeal_id)
                    .filter(|appeal| appeal.review_id == review_id && appeal.status.is_pending())
                    .ok_or(StoreError::Precondition { op: kind })?;
                appeal.status = status;
                appeal.op_user = op_user;
                appeal.reason = reason;
                appeal.updated_at = now;
            }
            WriteOp::HideReview { review_id } => {
                let review = self
                    .reviews
                    .get_mut(&review_id)
                    .ok_or(StoreError::Precondition { op: kind })?;
                review.status = ReviewStatus::Hidden;
                review.version += 1;
                review.updated_at = now;
            }
        }
        Ok(())
    }
}

/// In-memory review store.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReviewStore for InMemoryStore {
    async fn get_review(&self, review_id: ReviewId) -> Result<Option<Review>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.reviews.get(&review_id).cloned())
    }

    async fn get_review_by_order(&self, order_id: OrderId) -> Result<Option<Review>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .reviews
            .values()
            .find(|review| review.order_id == order_id)
            .cloned())
    }

    async fn get_review_for_store(
        &self,
        review_id: ReviewId,
        store_id: StoreId,
    ) -> Result<Option<Review>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .reviews
            .get(&review_id)
            .filter(|review| review.store_id == store_id)
            .cloned())
    }

    async fn get_reply_for_review(
        &self,
        review_id: ReviewId,
    ) -> Result<Option<Reply>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .replies
            .values()
            .find(|reply| reply.review_id == review_id)
            .cloned())
    }

    async fn get_appeal(&self, appeal_id: AppealId) -> Result<Option<Appeal>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.appeals.get(&appeal_id).cloned())
    }

    async fn get_appeal_for_review(
        &self,
        review_id: ReviewId,
        store_id: StoreId,
    ) -> Result<Option<Appeal>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .appeals
            .values()
            .find(|appeal| appeal.review_id == review_id && appeal.store_id == store_id)
            .cloned())
    }

    async fn insert_review(&self, review: &Review) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let taken = tables.reviews.contains_key(&review.review_id)
            || tables
                .reviews
                .values()
                .any(|existing| existing.order_id == review.order_id);
        if taken {
            return Err(StoreError::Duplicate { what: "review" });
        }
        tables.reviews.insert(review.review_id, review.clone());
        Ok(())
    }

    async fn insert_appeal(&self, appeal: &Appeal) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let taken = tables.appeals.contains_key(&appeal.appeal_id)
            || tables.appeals.values().any(|existing| {
                existing.review_id == appeal.review_id && existing.store_id == appeal.store_id
            });
        if taken {
            return Err(StoreError::Duplicate { what: "appeal" });
        }
        tables.appeals.insert(appeal.appeal_id, appeal.clone());
        Ok(())
    }

    async fn resubmit_appeal(
        &self,
        submission: &AppealSubmission,
    ) -> Result<Option<Appeal>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(appeal) = tables.appeals.values_mut().find(|appeal| {
            appeal.review_id == submission.review_id
                && appeal.store_id == submission.store_id
                && appeal.status.is_pending()
        }) else {
            return Ok(None);
        };

        appeal.status = submission.status;
        appeal.content = submission.content.clone();
        appeal.reason = submission.reason.clone();
        appeal.media = submission.media.clone();
        appeal.updated_at = submission.submitted_at;
        Ok(Some(appeal.clone()))
    }

    async fn commit(&self, unit: UnitOfWork) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut tables = self.tables.write().await;

        // Apply to a staged copy so a failing guard leaves the live tables
        // untouched.
        let mut staged = tables.clone();
        for op in unit.into_ops() {
            staged.apply(op, now)?;
        }
        *tables = staged;
        Ok(())
    }
}
