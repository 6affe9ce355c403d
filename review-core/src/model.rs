//! Review, reply and appeal entities.
//!
//! Identifiers are newtypes over `i64` so that a store id can never be passed
//! where a review id is expected. Statuses are persisted as integer codes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lenient;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

entity_id!(
    /// Generated identifier of a review.
    ReviewId
);
entity_id!(
    /// Generated identifier of a merchant reply.
    ReplyId
);
entity_id!(
    /// Generated identifier of an appeal.
    AppealId
);
entity_id!(OrderId);
entity_id!(UserId);
entity_id!(StoreId);

/// Visibility of a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Visible,
    /// Set when an appeal against the review is approved.
    Hidden,
}

impl ReviewStatus {
    pub const fn code(self) -> i32 {
        match self {
            Self::Visible => 10,
            Self::Hidden => 40,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            10 => Some(Self::Visible),
            40 => Some(Self::Hidden),
            _ => None,
        }
    }
}

/// Integer-coded appeal status.
///
/// Codes up to [`AppealStatus::PENDING_CEILING`] are pending sub-states and may
/// still be revised by the store. Anything above is a verdict and is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppealStatus(pub i32);

impl AppealStatus {
    pub const PENDING: Self = Self(10);
    pub const APPROVED: Self = Self(20);
    pub const REJECTED: Self = Self(30);

    /// Highest code that still counts as pending.
    pub const PENDING_CEILING: i32 = 10;

    pub const fn code(self) -> i32 {
        self.0
    }

    pub const fn is_terminal(self) -> bool {
        self.0 > Self::PENDING_CEILING
    }

    pub const fn is_pending(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for AppealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::PENDING => write!(f, "pending"),
            Self::APPROVED => write!(f, "approved"),
            Self::REJECTED => write!(f, "rejected"),
            Self(code) if code <= Self::PENDING_CEILING => write!(f, "pending({})", code),
            Self(code) => write!(f, "closed({})", code),
        }
    }
}

/// Picture and video references attached to a review, reply or appeal.
///
/// Both are opaque strings (typically JSON arrays of URLs) owned by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    #[serde(default)]
    pub pic_info: String,
    #[serde(default)]
    pub video_info: String,
}

/// A customer's review of one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub review_id: ReviewId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub store_id: StoreId,
    pub score: i32,
    pub service_score: i32,
    pub express_score: i32,
    pub content: String,
    #[serde(flatten)]
    pub media: Media,
    pub anonymous: bool,
    pub has_reply: bool,
    pub status: ReviewStatus,
    /// Incremented by the store on every update of the row.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A store's single reply to a review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub reply_id: ReplyId,
    pub review_id: ReviewId,
    pub store_id: StoreId,
    pub content: String,
    #[serde(flatten)]
    pub media: Media,
    pub created_at: DateTime<Utc>,
}

/// A store's dispute against a review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appeal {
    pub appeal_id: AppealId,
    pub review_id: ReviewId,
    pub store_id: StoreId,
    pub status: AppealStatus,
    pub reason: String,
    pub content: String,
    #[serde(flatten)]
    pub media: Media,
    /// Operator who adjudicated the appeal; empty while pending.
    pub op_user: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Review as returned by the search index.
///
/// Index documents are produced by a change-data pipeline that renders
/// numbers as strings and timestamps as `YYYY-MM-DD HH:MM:SS`, so the
/// deserializers here accept both encodings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDocument {
    #[serde(deserialize_with = "lenient::id")]
    pub review_id: ReviewId,
    #[serde(default, deserialize_with = "lenient::id")]
    pub order_id: OrderId,
    #[serde(default, deserialize_with = "lenient::id")]
    pub user_id: UserId,
    #[serde(deserialize_with = "lenient::id")]
    pub store_id: StoreId,
    #[serde(default, deserialize_with = "lenient::int")]
    pub score: i32,
    #[serde(default, deserialize_with = "lenient::int")]
    pub service_score: i32,
    #[serde(default, deserialize_with = "lenient::int")]
    pub express_score: i32,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub pic_info: String,
    #[serde(default)]
    pub video_info: String,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub anonymous: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub has_reply: bool,
    #[serde(default, deserialize_with = "lenient::int")]
    pub status: i32,
    #[serde(default, deserialize_with = "lenient::int")]
    pub version: i32,
    #[serde(default, alias = "create_at", deserialize_with = "lenient::timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "update_at", deserialize_with = "lenient::timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Review> for ReviewDocument {
    fn from(review: &Review) -> Self {
        Self {
            review_id: review.review_id,
            order_id: review.order_id,
            user_id: review.user_id,
            store_id: review.store_id,
            score: review.score,
            service_score: review.service_score,
            express_score: review.express_score,
            content: review.content.clone(),
            pic_info: review.media.pic_info.clone(),
            video_info: review.media.video_info.clone(),
            anonymous: review.anonymous,
            has_reply: review.has_reply,
            status: review.status.code(),
            version: review.version,
            created_at: Some(review.created_at),
            updated_at: Some(review.updated_at),
        }
    }
}
