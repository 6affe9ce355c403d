//! Fixtures shared by the store backend tests.

use chrono::{DateTime, TimeZone, Utc};

use review_core::{
    Appeal, AppealId, AppealStatus, Media, OrderId, Reply, ReplyId, Review, ReviewId,
    ReviewStatus, StoreId, UserId,
};

use super::AppealSubmission;

/// Fixed timestamp with whole-millisecond precision, so values survive a
/// round trip through integer storage unchanged.
pub(crate) fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap()
}

pub(crate) fn review(review_id: i64, order_id: i64, store_id: i64) -> Review {
    Review {
        review_id: ReviewId(review_id),
        order_id: OrderId(order_id),
        user_id: UserId(9),
        store_id: StoreId(store_id),
        score: 5,
        service_score: 4,
        express_score: 3,
        content: "arrived quickly, works as described".to_string(),
        media: Media {
            pic_info: r#"["a.jpg"]"#.to_string(),
            video_info: String::new(),
        },
        anonymous: false,
        has_reply: false,
        status: ReviewStatus::Visible,
        version: 0,
        created_at: fixed_time(),
        updated_at: fixed_time(),
    }
}

pub(crate) fn reply(reply_id: i64, review_id: i64, store_id: i64) -> Reply {
    Reply {
        reply_id: ReplyId(reply_id),
        review_id: ReviewId(review_id),
        store_id: StoreId(store_id),
        content: "thanks".to_string(),
        media: Media::default(),
        created_at: fixed_time(),
    }
}

pub(crate) fn submission(review_id: i64, store_id: i64, reason: &str) -> AppealSubmission {
    AppealSubmission {
        review_id: ReviewId(review_id),
        store_id: StoreId(store_id),
        status: AppealStatus::PENDING,
        content: "the customer never received this order".to_string(),
        reason: reason.to_string(),
        media: Media::default(),
        submitted_at: fixed_time(),
    }
}

pub(crate) fn appeal(appeal_id: i64, review_id: i64, store_id: i64) -> Appeal {
    submission(review_id, store_id, "fake review").into_appeal(AppealId(appeal_id))
}
