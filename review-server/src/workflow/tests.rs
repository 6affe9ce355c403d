//! Tests for the review workflow against the in-memory and SQLite stores.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::json;

use review_core::{
    AppealId, AppealStatus, IdGenerator, Media, OrderId, ReviewId, ReviewStatus, StoreId, UserId,
};

use super::*;
use crate::error::ErrorKind;
use crate::search::{InMemoryIndex, SearchError, SearchIndex, SearchPage};
use crate::store::{InMemoryStore, ReviewStore, SqliteStore};

struct Harness {
    workflow: Arc<ReviewWorkflow>,
    store: Arc<dyn ReviewStore>,
    index: Arc<InMemoryIndex>,
}

fn harness_with(store: Arc<dyn ReviewStore>) -> Harness {
    let index = Arc::new(InMemoryIndex::new());
    let ids = Arc::new(IdGenerator::new(1).unwrap());
    let workflow = Arc::new(ReviewWorkflow::new(store.clone(), index.clone(), ids));
    Harness {
        workflow,
        store,
        index,
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(InMemoryStore::new()))
}

fn sqlite_harness() -> Harness {
    harness_with(Arc::new(SqliteStore::new_in_memory().unwrap()))
}

fn draft(order_id: i64, store_id: i64) -> ReviewDraft {
    ReviewDraft {
        order_id: OrderId(order_id),
        user_id: UserId(9),
        store_id: StoreId(store_id),
        score: 5,
        service_score: 5,
        express_score: 4,
        content: "great".to_string(),
        media: Media::default(),
        anonymous: false,
    }
}

fn reply_param(review_id: ReviewId, store_id: i64) -> ReplyParam {
    ReplyParam {
        review_id,
        store_id: StoreId(store_id),
        content: "thanks".to_string(),
        media: Media::default(),
    }
}

fn appeal_param(review_id: ReviewId, store_id: i64, content: &str) -> AppealParam {
    AppealParam {
        review_id,
        store_id: StoreId(store_id),
        content: content.to_string(),
        reason: "fake review".to_string(),
        media: Media::default(),
    }
}

fn verdict(appeal_id: AppealId, review_id: ReviewId, status: AppealStatus) -> AuditParam {
    AuditParam {
        appeal_id,
        review_id,
        status,
        op_user: "auditor-1".to_string(),
        reason: "checked order history".to_string(),
    }
}

struct UnavailableIndex;

#[async_trait]
impl SearchIndex for UnavailableIndex {
    async fn search_by_store(
        &self,
        _store_id: StoreId,
        _offset: u64,
        _limit: u64,
    ) -> Result<SearchPage, SearchError> {
        Err(SearchError::Transport("connection refused".to_string()))
    }
}

// =========================================================================
// CreateReview / CreateReply
// =========================================================================

#[tokio::test]
async fn test_review_and_reply_walkthrough() {
    let h = harness();

    let review = h.workflow.create_review(draft(100, 5)).await.unwrap();
    assert!(!review.has_reply);
    assert_eq!(review.status, ReviewStatus::Visible);
    assert_eq!(review.version, 0);

    let err = h.workflow.create_review(draft(100, 5)).await.unwrap_err();
    assert!(matches!(
        err,
        ReviewError::DuplicateReview {
            order_id: OrderId(100)
        }
    ));

    let reply = h
        .workflow
        .create_reply(reply_param(review.review_id, 5))
        .await
        .unwrap();
    assert_eq!(reply.review_id, review.review_id);
    assert_ne!(reply.reply_id.0, review.review_id.0);
    assert!(
        h.store
            .get_review(review.review_id)
            .await
            .unwrap()
            .unwrap()
            .has_reply
    );

    let err = h
        .workflow
        .create_reply(reply_param(review.review_id, 6))
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::Forbidden { .. }));
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn test_invalid_draft_is_rejected_before_storage() {
    let h = harness();
    let mut bad = draft(100, 5);
    bad.score = 0;

    let err = h.workflow.create_review(bad).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert!(h
        .store
        .get_review_by_order(OrderId(100))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_reply_to_missing_review() {
    let h = harness();
    let err = h
        .workflow
        .create_reply(reply_param(ReviewId(404), 5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReviewError::ReviewNotFound {
            review_id: ReviewId(404)
        }
    ));
}

#[tokio::test]
async fn test_second_reply_is_rejected_and_keeps_first() {
    let h = harness();
    let review = h.workflow.create_review(draft(100, 5)).await.unwrap();
    let first = h
        .workflow
        .create_reply(reply_param(review.review_id, 5))
        .await
        .unwrap();

    let err = h
        .workflow
        .create_reply(reply_param(review.review_id, 5))
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::AlreadyReplied { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let stored = h
        .store
        .get_reply_for_review(review.review_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.reply_id, first.reply_id);
}

#[tokio::test]
async fn test_foreign_reply_writes_nothing() {
    let h = harness();
    let review = h.workflow.create_review(draft(100, 5)).await.unwrap();

    let err = h
        .workflow
        .create_reply(reply_param(review.review_id, 6))
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::Forbidden { .. }));

    let stored = h.store.get_review(review.review_id).await.unwrap().unwrap();
    assert!(!stored.has_reply);
    assert_eq!(stored.version, 0);
    assert!(h
        .store
        .get_reply_for_review(review.review_id)
        .await
        .unwrap()
        .is_none());
}

async fn assert_concurrent_replies_yield_one(h: Harness) {
    let review = h.workflow.create_review(draft(100, 5)).await.unwrap();

    let attempts = (0..8).map(|_| {
        let workflow = h.workflow.clone();
        tokio::spawn(async move {
            workflow
                .create_reply(reply_param(review.review_id, 5))
                .await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, ReviewError::AlreadyReplied { .. })));

    let stored = h.store.get_review(review.review_id).await.unwrap().unwrap();
    assert!(stored.has_reply);
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn test_concurrent_replies_in_memory() {
    assert_concurrent_replies_yield_one(harness()).await;
}

#[tokio::test]
async fn test_concurrent_replies_sqlite() {
    assert_concurrent_replies_yield_one(sqlite_harness()).await;
}

#[tokio::test]
async fn test_concurrent_reviews_for_one_order_sqlite() {
    let h = sqlite_harness();

    let attempts = (0..8).map(|_| {
        let workflow = h.workflow.clone();
        tokio::spawn(async move { workflow.create_review(draft(100, 5)).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, ReviewError::DuplicateReview { .. })));
}

// =========================================================================
// CreateAppeal / UpdateAppeal
// =========================================================================

#[tokio::test]
async fn test_appeal_requires_own_review() {
    let h = harness();
    let review = h.workflow.create_review(draft(100, 5)).await.unwrap();

    let missing = h
        .workflow
        .create_appeal(appeal_param(ReviewId(404), 5, "not ours"))
        .await
        .unwrap_err();
    assert!(matches!(missing, ReviewError::ReviewNotFoundOrForeign { .. }));

    let foreign = h
        .workflow
        .create_appeal(appeal_param(review.review_id, 6, "not ours"))
        .await
        .unwrap_err();
    assert!(matches!(foreign, ReviewError::ReviewNotFoundOrForeign { .. }));
    assert_eq!(foreign.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_resubmitting_pending_appeal_keeps_identifier() {
    let h = harness();
    let review = h.workflow.create_review(draft(100, 5)).await.unwrap();

    let first = h
        .workflow
        .create_appeal(appeal_param(review.review_id, 5, "first draft"))
        .await
        .unwrap();
    assert_eq!(first.status, AppealStatus::PENDING);

    let second = h
        .workflow
        .create_appeal(appeal_param(review.review_id, 5, "with evidence"))
        .await
        .unwrap();
    assert_eq!(second.appeal_id, first.appeal_id);
    assert_eq!(second.content, "with evidence");

    let stored = h
        .store
        .get_appeal_for_review(review.review_id, StoreId(5))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.appeal_id, first.appeal_id);
    assert_eq!(stored.content, "with evidence");
}

#[tokio::test]
async fn test_appeal_after_verdict_is_rejected() {
    let h = sqlite_harness();
    let review = h.workflow.create_review(draft(100, 5)).await.unwrap();
    let appeal = h
        .workflow
        .create_appeal(appeal_param(review.review_id, 5, "first draft"))
        .await
        .unwrap();
    h.workflow
        .update_appeal(verdict(
            appeal.appeal_id,
            review.review_id,
            AppealStatus::REJECTED,
        ))
        .await
        .unwrap();

    let err = h
        .workflow
        .create_appeal(appeal_param(review.review_id, 5, "try again"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::AppealAlreadyAdjudicated { .. }));

    let stored = h.store.get_appeal(appeal.appeal_id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppealStatus::REJECTED);
    assert_eq!(stored.content, "first draft");
    assert_eq!(stored.op_user, "auditor-1");
}

#[tokio::test]
async fn test_approval_hides_review() {
    for h in [harness(), sqlite_harness()] {
        let review = h.workflow.create_review(draft(100, 5)).await.unwrap();
        let appeal = h
            .workflow
            .create_appeal(appeal_param(review.review_id, 5, "customer never ordered"))
            .await
            .unwrap();

        h.workflow
            .update_appeal(verdict(
                appeal.appeal_id,
                review.review_id,
                AppealStatus::APPROVED,
            ))
            .await
            .unwrap();

        let stored_appeal = h.store.get_appeal(appeal.appeal_id).await.unwrap().unwrap();
        assert_eq!(stored_appeal.status, AppealStatus::APPROVED);
        assert_eq!(stored_appeal.op_user, "auditor-1");
        assert_eq!(stored_appeal.reason, "checked order history");

        let stored_review = h.store.get_review(review.review_id).await.unwrap().unwrap();
        assert_eq!(stored_review.status, ReviewStatus::Hidden);
    }
}

#[tokio::test]
async fn test_rejection_leaves_review_visible() {
    let h = harness();
    let review = h.workflow.create_review(draft(100, 5)).await.unwrap();
    let appeal = h
        .workflow
        .create_appeal(appeal_param(review.review_id, 5, "unfair"))
        .await
        .unwrap();

    h.workflow
        .update_appeal(verdict(
            appeal.appeal_id,
            review.review_id,
            AppealStatus::REJECTED,
        ))
        .await
        .unwrap();

    let stored_review = h.store.get_review(review.review_id).await.unwrap().unwrap();
    assert_eq!(stored_review.status, ReviewStatus::Visible);
    assert_eq!(stored_review.version, 0);
}

#[tokio::test]
async fn test_verdict_cannot_be_revised() {
    let h = sqlite_harness();
    let review = h.workflow.create_review(draft(100, 5)).await.unwrap();
    let appeal = h
        .workflow
        .create_appeal(appeal_param(review.review_id, 5, "unfair"))
        .await
        .unwrap();
    h.workflow
        .update_appeal(verdict(
            appeal.appeal_id,
            review.review_id,
            AppealStatus::REJECTED,
        ))
        .await
        .unwrap();

    let err = h
        .workflow
        .update_appeal(verdict(
            appeal.appeal_id,
            review.review_id,
            AppealStatus::APPROVED,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::AppealAlreadyAdjudicated { .. }));

    // The failed approval must not have hidden the review.
    let stored_review = h.store.get_review(review.review_id).await.unwrap().unwrap();
    assert_eq!(stored_review.status, ReviewStatus::Visible);
}

#[tokio::test]
async fn test_verdict_on_unknown_or_mismatched_appeal() {
    let h = harness();
    let review = h.workflow.create_review(draft(100, 5)).await.unwrap();
    let other = h.workflow.create_review(draft(101, 5)).await.unwrap();
    let appeal = h
        .workflow
        .create_appeal(appeal_param(review.review_id, 5, "unfair"))
        .await
        .unwrap();

    let unknown = h
        .workflow
        .update_appeal(verdict(
            AppealId(404),
            review.review_id,
            AppealStatus::REJECTED,
        ))
        .await
        .unwrap_err();
    assert!(matches!(unknown, ReviewError::AppealNotFound { .. }));

    let mismatched = h
        .workflow
        .update_appeal(verdict(
            appeal.appeal_id,
            other.review_id,
            AppealStatus::APPROVED,
        ))
        .await
        .unwrap_err();
    assert!(matches!(mismatched, ReviewError::AppealNotFound { .. }));
    assert_eq!(
        h.store
            .get_review(other.review_id)
            .await
            .unwrap()
            .unwrap()
            .status,
        ReviewStatus::Visible
    );
}

#[tokio::test]
async fn test_pending_target_status_is_invalid() {
    let h = harness();
    let err = h
        .workflow
        .update_appeal(verdict(AppealId(1), ReviewId(2), AppealStatus::PENDING))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
}

// =========================================================================
// ListReviewsByStore
// =========================================================================

#[tokio::test]
async fn test_listing_clamps_page_and_size() {
    let h = harness();
    for order in 1..=60 {
        let review = h.workflow.create_review(draft(order, 5)).await.unwrap();
        h.index.index_review(&review).await.unwrap();
    }

    let defaults = h.workflow.list_reviews_by_store(StoreId(5), 0, 0).await.unwrap();
    let explicit = h.workflow.list_reviews_by_store(StoreId(5), 1, 10).await.unwrap();
    assert_eq!(defaults, explicit);
    assert_eq!(defaults.total, 60);
    assert_eq!(defaults.reviews.len(), 10);

    let capped = h
        .workflow
        .list_reviews_by_store(StoreId(5), 1, 1000)
        .await
        .unwrap();
    assert_eq!(capped.reviews.len(), 50);

    let second = h.workflow.list_reviews_by_store(StoreId(5), 2, 50).await.unwrap();
    assert_eq!(second.reviews.len(), 10);
    assert_eq!(second.reviews[0].order_id, OrderId(51));
}

#[tokio::test]
async fn test_listing_unknown_store_is_empty() {
    let h = harness();
    let page = h.workflow.list_reviews_by_store(StoreId(5), 1, 10).await.unwrap();
    assert_eq!(page.total, 0);
    assert!(page.reviews.is_empty());
}

#[tokio::test]
async fn test_listing_skips_unreadable_documents() {
    let h = harness();
    h.index
        .insert(
            StoreId(5),
            json!({ "review_id": "1", "store_id": "5", "score": "4", "create_at": "2025-11-02 05:41:02" }),
        )
        .await;
    h.index
        .insert(StoreId(5), json!({ "review_id": "abc", "store_id": "5" }))
        .await;
    h.index
        .insert(StoreId(5), json!({ "review_id": 3, "store_id": 5 }))
        .await;

    let page = h.workflow.list_reviews_by_store(StoreId(5), 1, 10).await.unwrap();
    assert_eq!(page.total, 3);
    let ids: Vec<_> = page.reviews.iter().map(|r| r.review_id).collect();
    assert_eq!(ids, vec![ReviewId(1), ReviewId(3)]);
    assert_eq!(page.reviews[0].score, 4);
}

#[tokio::test]
async fn test_listing_surfaces_search_failure() {
    let store: Arc<dyn ReviewStore> = Arc::new(InMemoryStore::new());
    let ids = Arc::new(IdGenerator::new(1).unwrap());
    let workflow = ReviewWorkflow::new(store, Arc::new(UnavailableIndex), ids);

    let err = workflow
        .list_reviews_by_store(StoreId(5), 1, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::Search(SearchError::Transport(_))));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_corrupt_review_row_is_not_retryable() {
    let sqlite = Arc::new(SqliteStore::new_in_memory().unwrap());
    let h = harness_with(sqlite.clone());
    let review = h.workflow.create_review(draft(100, 5)).await.unwrap();

    {
        let conn = sqlite.conn.lock().unwrap();
        conn.execute(
            "UPDATE review_info SET status = 99 WHERE review_id = ?1",
            rusqlite::params![review.review_id.0],
        )
        .unwrap();
    }

    let err = h
        .workflow
        .create_reply(reply_param(review.review_id, 5))
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::Storage(StoreError::Corruption { .. })));
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(!err.is_retryable());
}

async fn assert_concurrent_first_appeals_share_one_row(h: Harness) {
    let review = h.workflow.create_review(draft(100, 5)).await.unwrap();

    let attempts = (0..8).map(|i| {
        let workflow = h.workflow.clone();
        tokio::spawn(async move {
            workflow
                .create_appeal(appeal_param(review.review_id, 5, &format!("attempt {i}")))
                .await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let first = results[0].appeal_id;
    assert!(results.iter().all(|a| a.appeal_id == first));

    let stored = h
        .store
        .get_appeal_for_review(review.review_id, StoreId(5))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.appeal_id, first);
    assert_eq!(stored.status, AppealStatus::PENDING);
    assert!(h.store.get_appeal(first).await.unwrap().is_some());
}

#[tokio::test]
async fn test_concurrent_first_appeals_in_memory() {
    assert_concurrent_first_appeals_share_one_row(harness()).await;
}

#[tokio::test]
async fn test_concurrent_first_appeals_sqlite() {
    assert_concurrent_first_appeals_share_one_row(sqlite_harness()).await;
}
