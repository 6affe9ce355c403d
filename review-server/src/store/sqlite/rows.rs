//! Row mapping and unit-of-work statements for the SQLite store.

use chrono::{DateTime, Utc};
use rusqlite::{ffi, params, Connection, ErrorCode, Row};

use review_core::{
    Appeal, AppealId, AppealStatus, Media, OrderId, Reply, ReplyId, Review, ReviewId,
    ReviewStatus, StoreId, UserId,
};

use super::super::{StoreError, WriteOp};

pub(super) const REVIEW_COLUMNS: &str = "review_id, order_id, user_id, store_id, score, \
     service_score, express_score, content, pic_info, video_info, anonymous, has_reply, \
     status, version, created_at, updated_at";

pub(super) const REPLY_COLUMNS: &str =
    "reply_id, review_id, store_id, content, pic_info, video_info, created_at";

pub(super) const APPEAL_COLUMNS: &str = "appeal_id, review_id, store_id, status, reason, \
     content, pic_info, video_info, op_user, created_at, updated_at";

/// True for UNIQUE and PRIMARY KEY violations; other constraint failures
/// (foreign keys, NOT NULL) are real storage errors.
pub(super) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

fn timestamp(ms: i64, what: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::corruption(format!("{} timestamp {}", what, ms)))
}

/// Raw `review_info` row, before status codes and timestamps are checked.
pub(super) struct ReviewRow {
    review_id: i64,
    order_id: i64,
    user_id: i64,
    store_id: i64,
    score: i32,
    service_score: i32,
    express_score: i32,
    content: String,
    pic_info: String,
    video_info: String,
    anonymous: bool,
    has_reply: bool,
    status: i32,
    version: i32,
    created_at: i64,
    updated_at: i64,
}

impl ReviewRow {
    pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            review_id: row.get(0)?,
            order_id: row.get(1)?,
            user_id: row.get(2)?,
            store_id: row.get(3)?,
            score: row.get(4)?,
            service_score: row.get(5)?,
            express_score: row.get(6)?,
            content: row.get(7)?,
            pic_info: row.get(8)?,
            video_info: row.get(9)?,
            anonymous: row.get(10)?,
            has_reply: row.get(11)?,
            status: row.get(12)?,
            version: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    pub(super) fn into_review(self) -> Result<Review, StoreError> {
        let status = ReviewStatus::from_code(self.status).ok_or_else(|| {
            StoreError::corruption(format!(
                "status {} on review {}",
                self.status, self.review_id
            ))
        })?;
        Ok(Review {
            review_id: ReviewId(self.review_id),
            order_id: OrderId(self.order_id),
            user_id: UserId(self.user_id),
            store_id: StoreId(self.store_id),
            score: self.score,
            service_score: self.service_score,
            express_score: self.express_score,
            content: self.content,
            media: Media {
                pic_info: self.pic_info,
                video_info: self.video_info,
            },
            anonymous: self.anonymous,
            has_reply: self.has_reply,
            status,
            version: self.version,
            created_at: timestamp(self.created_at, "review created_at")?,
            updated_at: timestamp(self.updated_at, "review updated_at")?,
        })
    }
}

pub(super) struct ReplyRow {
    reply_id: i64,
    review_id: i64,
    store_id: i64,
    content: String,
    pic_info: String,
    video_info: String,
    created_at: i64,
}

impl ReplyRow {
    pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            reply_id: row.get(0)?,
            review_id: row.get(1)?,
            store_id: row.get(2)?,
            content: row.get(3)?,
            pic_info: row.get(4)?,
            video_info: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    pub(super) fn into_reply(self) -> Result<Reply, StoreError> {
        Ok(Reply {
            reply_id: ReplyId(self.reply_id),
            review_id: ReviewId(self.review_id),
            store_id: StoreId(self.store_id),
            content: self.content,
            media: Media {
                pic_info: self.pic_info,
                video_info: self.video_info,
            },
            created_at: timestamp(self.created_at, "reply created_at")?,
        })
    }
}

pub(super) struct AppealRow {
    appeal_id: i64,
    review_id: i64,
    store_id: i64,
    status: i32,
    reason: String,
    content: String,
    pic_info: String,
    video_info: String,
    op_user: String,
    created_at: i64,
    updated_at: i64,
}

impl AppealRow {
    pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            appeal_id: row.get(0)?,
            review_id: row.get(1)?,
            store_id: row.get(2)?,
            status: row.get(3)?,
            reason: row.get(4)?,
            content: row.get(5)?,
            pic_info: row.get(6)?,
            video_info: row.get(7)?,
            op_user: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    pub(super) fn into_appeal(self) -> Result<Appeal, StoreError> {
        Ok(Appeal {
            appeal_id: AppealId(self.appeal_id),
            review_id: ReviewId(self.review_id),
            store_id: StoreId(self.store_id),
            status: AppealStatus(self.status),
            reason: self.reason,
            content: self.content,
            media: Media {
                pic_info: self.pic_info,
                video_info: self.video_info,
            },
            op_user: self.op_user,
            created_at: timestamp(self.created_at, "appeal created_at")?,
            updated_at: timestamp(self.updated_at, "appeal updated_at")?,
        })
    }
}

/// Execute one unit-of-work operation inside an open transaction.
///
/// Guarded updates that touch no row return `StoreError::Precondition`; the
/// caller is responsible for abandoning the transaction.
pub(super) fn apply_op(conn: &Connection, op: WriteOp, now_ms: i64) -> Result<(), StoreError> {
    let kind = op.kind();
    let storage_err = |e: rusqlite::Error| StoreError::storage("commit", format!("{}: {}", kind, e));

    let changed = match op {
        WriteOp::InsertReply(reply) => conn
            .execute(
                "INSERT INTO review_reply_info (reply_id, review_id, store_id, content,
                                                pic_info, video_info, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    reply.reply_id.0,
                    reply.review_id.0,
                    reply.store_id.0,
                    reply.content,
                    reply.media.pic_info,
                    reply.media.video_info,
                    reply.created_at.timestamp_millis(),
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Duplicate { what: "reply" }
                } else {
                    storage_err(e)
                }
            })?,
        WriteOp::MarkReplied { review_id } => conn
            .execute(
                "UPDATE review_info
                 SET has_reply = 1, version = version + 1, updated_at = ?2
                 WHERE review_id = ?1 AND has_reply = 0",
                params![review_id.0, now_ms],
            )
            .map_err(storage_err)?,
        WriteOp::AdjudicateAppeal {
            appeal_id,
            review_id,
            status,
            op_user,
            reason,
        } => conn
            .execute(
                "UPDATE review_appeal_info
                 SET status = ?1, op_user = ?2, reason = ?3, updated_at = ?4
                 WHERE appeal_id = ?5 AND review_id = ?6 AND status <= ?7",
                params![
                    status.code(),
                    op_user,
                    reason,
                    now_ms,
                    appeal_id.0,
                    review_id.0,
                    AppealStatus::PENDING_CEILING,
                ],
            )
            .map_err(storage_err)?,
        WriteOp::HideReview { review_id } => conn
            .execute(
                "UPDATE review_info
                 SET status = ?1, version = version + 1, updated_at = ?2
                 WHERE review_id = ?3",
                params![ReviewStatus::Hidden.code(), now_ms, review_id.0],
            )
            .map_err(storage_err)?,
    };

    if changed == 0 {
        return Err(StoreError::Precondition { op: kind });
    }
    Ok(())
}
