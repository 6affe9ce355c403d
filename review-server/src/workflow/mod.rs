//! Review lifecycle: creation, merchant replies, appeals and adjudication.
//!
//! `ReviewWorkflow` is the only writer of review, reply and appeal rows. It
//! checks business rules against the store, allocates identifiers, and hands
//! multi-row writes to the store as a single [`UnitOfWork`] so that they are
//! applied all-or-nothing. Listing goes through the search index instead of
//! the store.
//!
//! Read-side checks are advisory: the store's unique indexes and unit-of-work
//! guards are what make concurrent requests safe, and their failures are
//! mapped back onto the same errors the read-side checks produce.

mod params;

#[cfg(test)]
mod tests;

pub use params::{
    AppealParam, AuditParam, PageWindow, ReplyParam, ReviewDraft, ReviewPage,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MAX_SCORE, MIN_SCORE,
};

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use review_core::{
    Appeal, AppealId, AppealStatus, IdGenerator, Reply, ReplyId, Review, ReviewDocument, ReviewId,
    ReviewStatus, StoreId,
};

use crate::error::ReviewError;
use crate::search::SearchIndex;
use crate::store::{
    AppealSubmission, ReviewStore, StoreError, UnitOfWork, WriteOp, WriteOpKind,
};

pub struct ReviewWorkflow {
    store: Arc<dyn ReviewStore>,
    search: Arc<dyn SearchIndex>,
    ids: Arc<IdGenerator>,
}

impl ReviewWorkflow {
    pub fn new(
        store: Arc<dyn ReviewStore>,
        search: Arc<dyn SearchIndex>,
        ids: Arc<IdGenerator>,
    ) -> Self {
        Self { store, search, ids }
    }

    /// Create the review for an order. An order can be reviewed once.
    pub async fn create_review(&self, draft: ReviewDraft) -> Result<Review, ReviewError> {
        debug!(order_id = %draft.order_id, store_id = %draft.store_id, "create review");
        draft.validate()?;

        if self
            .store
            .get_review_by_order(draft.order_id)
            .await?
            .is_some()
        {
            return Err(ReviewError::DuplicateReview {
                order_id: draft.order_id,
            });
        }

        let now = Utc::now();
        let review = Review {
            review_id: ReviewId(self.ids.next_id()),
            order_id: draft.order_id,
            user_id: draft.user_id,
            store_id: draft.store_id,
            score: draft.score,
            service_score: draft.service_score,
            express_score: draft.express_score,
            content: draft.content,
            media: draft.media,
            anonymous: draft.anonymous,
            has_reply: false,
            status: ReviewStatus::Visible,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        match self.store.insert_review(&review).await {
            Ok(()) => {}
            // Lost the race against a concurrent request for the same order.
            Err(StoreError::Duplicate { .. }) => {
                return Err(ReviewError::DuplicateReview {
                    order_id: review.order_id,
                })
            }
            Err(e) => {
                warn!(order_id = %review.order_id, error = %e, "failed to store review");
                return Err(e.into());
            }
        }

        info!(review_id = %review.review_id, order_id = %review.order_id, "review created");
        Ok(review)
    }

    /// Attach the owning store's reply to a review and mark the review as
    /// replied, in one transaction.
    pub async fn create_reply(&self, param: ReplyParam) -> Result<Reply, ReviewError> {
        debug!(review_id = %param.review_id, store_id = %param.store_id, "create reply");
        param.validate()?;

        let review = self
            .store
            .get_review(param.review_id)
            .await?
            .ok_or(ReviewError::ReviewNotFound {
                review_id: param.review_id,
            })?;

        // Ownership before reply state: a foreign store always gets Forbidden.
        if review.store_id != param.store_id {
            warn!(
                review_id = %review.review_id,
                owner = %review.store_id,
                store_id = %param.store_id,
                "reply from foreign store rejected"
            );
            return Err(ReviewError::Forbidden {
                review_id: review.review_id,
                store_id: param.store_id,
            });
        }
        if review.has_reply {
            return Err(ReviewError::AlreadyReplied {
                review_id: review.review_id,
            });
        }

        let reply = Reply {
            reply_id: ReplyId(self.ids.next_id()),
            review_id: review.review_id,
            store_id: review.store_id,
            content: param.content,
            media: param.media,
            created_at: Utc::now(),
        };
        let unit = UnitOfWork::new()
            .then(WriteOp::InsertReply(reply.clone()))
            .then(WriteOp::MarkReplied {
                review_id: review.review_id,
            });

        match self.store.commit(unit).await {
            Ok(()) => {}
            Err(StoreError::Duplicate { .. })
            | Err(StoreError::Precondition {
                op: WriteOpKind::MarkReplied,
            }) => {
                return Err(ReviewError::AlreadyReplied {
                    review_id: review.review_id,
                })
            }
            Err(e) => {
                warn!(review_id = %review.review_id, error = %e, "failed to store reply");
                return Err(e.into());
            }
        }

        info!(reply_id = %reply.reply_id, review_id = %reply.review_id, "reply created");
        Ok(reply)
    }

    /// Open an appeal against a review, or revise the store's pending one.
    ///
    /// The identifier of an appeal is allocated once; resubmissions keep it.
    pub async fn create_appeal(&self, param: AppealParam) -> Result<Appeal, ReviewError> {
        debug!(review_id = %param.review_id, store_id = %param.store_id, "create appeal");
        param.validate()?;

        if self
            .store
            .get_review_for_store(param.review_id, param.store_id)
            .await?
            .is_none()
        {
            return Err(ReviewError::ReviewNotFoundOrForeign {
                review_id: param.review_id,
                store_id: param.store_id,
            });
        }

        let submission = AppealSubmission {
            review_id: param.review_id,
            store_id: param.store_id,
            status: AppealStatus::PENDING,
            content: param.content,
            reason: param.reason,
            media: param.media,
            submitted_at: Utc::now(),
        };

        match self
            .store
            .get_appeal_for_review(param.review_id, param.store_id)
            .await?
        {
            Some(existing) if existing.status.is_terminal() => {
                Err(ReviewError::AppealAlreadyAdjudicated {
                    review_id: existing.review_id,
                })
            }
            Some(_) => self.resubmit_appeal(&submission).await,
            None => {
                let appeal = submission.clone().into_appeal(AppealId(self.ids.next_id()));
                match self.store.insert_appeal(&appeal).await {
                    Ok(()) => {
                        info!(
                            appeal_id = %appeal.appeal_id,
                            review_id = %appeal.review_id,
                            "appeal created"
                        );
                        Ok(appeal)
                    }
                    // A concurrent first submission created the row; this one
                    // becomes a revision of it.
                    Err(StoreError::Duplicate { .. }) => self.resubmit_appeal(&submission).await,
                    Err(e) => {
                        warn!(review_id = %appeal.review_id, error = %e, "failed to store appeal");
                        Err(e.into())
                    }
                }
            }
        }
    }

    async fn resubmit_appeal(
        &self,
        submission: &AppealSubmission,
    ) -> Result<Appeal, ReviewError> {
        let appeal = self.store.resubmit_appeal(submission).await?.ok_or(
            ReviewError::AppealAlreadyAdjudicated {
                review_id: submission.review_id,
            },
        )?;
        info!(
            appeal_id = %appeal.appeal_id,
            review_id = %appeal.review_id,
            "pending appeal revised"
        );
        Ok(appeal)
    }

    /// Record an operator's verdict on a pending appeal. Approval also hides
    /// the review, in the same transaction.
    pub async fn update_appeal(&self, param: AuditParam) -> Result<(), ReviewError> {
        debug!(
            appeal_id = %param.appeal_id,
            review_id = %param.review_id,
            status = %param.status,
            "update appeal"
        );
        param.validate()?;

        let approved = param.status == AppealStatus::APPROVED;
        let mut unit = UnitOfWork::new().then(WriteOp::AdjudicateAppeal {
            appeal_id: param.appeal_id,
            review_id: param.review_id,
            status: param.status,
            op_user: param.op_user.clone(),
            reason: param.reason,
        });
        if approved {
            unit = unit.then(WriteOp::HideReview {
                review_id: param.review_id,
            });
        }

        match self.store.commit(unit).await {
            Ok(()) => {}
            Err(StoreError::Precondition {
                op: WriteOpKind::AdjudicateAppeal,
            }) => {
                return Err(self
                    .explain_rejected_verdict(param.appeal_id, param.review_id)
                    .await)
            }
            Err(StoreError::Precondition {
                op: WriteOpKind::HideReview,
            }) => {
                return Err(ReviewError::ReviewNotFound {
                    review_id: param.review_id,
                })
            }
            Err(e) => {
                warn!(appeal_id = %param.appeal_id, error = %e, "failed to store verdict");
                return Err(e.into());
            }
        }

        info!(
            appeal_id = %param.appeal_id,
            review_id = %param.review_id,
            status = %param.status,
            op_user = %param.op_user,
            hidden = approved,
            "appeal adjudicated"
        );
        Ok(())
    }

    /// Work out why the adjudication guard rejected a verdict.
    async fn explain_rejected_verdict(
        &self,
        appeal_id: AppealId,
        review_id: ReviewId,
    ) -> ReviewError {
        match self.store.get_appeal(appeal_id).await {
            Ok(Some(appeal)) if appeal.review_id == review_id && appeal.status.is_terminal() => {
                ReviewError::AppealAlreadyAdjudicated { review_id }
            }
            Ok(_) => ReviewError::AppealNotFound {
                appeal_id,
                review_id,
            },
            Err(e) => e.into(),
        }
    }

    /// Page through a store's reviews as indexed for search.
    ///
    /// Documents that cannot be read as a [`ReviewDocument`] are logged and
    /// left out of the page; `total` still counts them.
    pub async fn list_reviews_by_store(
        &self,
        store_id: StoreId,
        page: i64,
        size: i64,
    ) -> Result<ReviewPage, ReviewError> {
        let window = PageWindow::clamp(page, size);
        debug!(
            store_id = %store_id,
            page = window.page,
            size = window.size,
            "list reviews by store"
        );

        let hits = self
            .search
            .search_by_store(store_id, window.offset(), window.size)
            .await
            .map_err(|e| {
                warn!(store_id = %store_id, error = %e, "review search failed");
                e
            })?;

        let reviews = hits
            .documents
            .into_iter()
            .filter_map(|doc| match serde_json::from_value::<ReviewDocument>(doc) {
                Ok(review) => Some(review),
                Err(e) => {
                    warn!(store_id = %store_id, error = %e, "skipping unreadable review document");
                    None
                }
            })
            .collect();

        Ok(ReviewPage {
            total: hits.total,
            reviews,
        })
    }
}
