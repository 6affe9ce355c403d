//! Inputs and outputs of workflow operations, with their validation rules.

use serde::{Deserialize, Serialize};

use review_core::{
    AppealId, AppealStatus, Media, OrderId, ReviewDocument, ReviewId, StoreId, UserId,
};

use crate::error::ReviewError;

pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 5;

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 50;

fn require_positive(name: &str, id: i64) -> Result<(), ReviewError> {
    if id <= 0 {
        return Err(ReviewError::validation(format!(
            "{} must be positive, got {}",
            name, id
        )));
    }
    Ok(())
}

fn require_score(name: &str, score: i32) -> Result<(), ReviewError> {
    if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return Err(ReviewError::validation(format!(
            "{} must be between {} and {}, got {}",
            name, MIN_SCORE, MAX_SCORE, score
        )));
    }
    Ok(())
}

fn require_text(name: &str, text: &str) -> Result<(), ReviewError> {
    if text.trim().is_empty() {
        return Err(ReviewError::validation(format!("{} must not be empty", name)));
    }
    Ok(())
}

/// A customer's new review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDraft {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub store_id: StoreId,
    pub score: i32,
    pub service_score: i32,
    pub express_score: i32,
    #[serde(default)]
    pub content: String,
    #[serde(flatten)]
    pub media: Media,
    #[serde(default)]
    pub anonymous: bool,
}

impl ReviewDraft {
    pub fn validate(&self) -> Result<(), ReviewError> {
        require_positive("order_id", self.order_id.0)?;
        require_positive("user_id", self.user_id.0)?;
        require_positive("store_id", self.store_id.0)?;
        require_score("score", self.score)?;
        require_score("service_score", self.service_score)?;
        require_score("express_score", self.express_score)
    }
}

/// A store's reply to one of its reviews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyParam {
    pub review_id: ReviewId,
    pub store_id: StoreId,
    pub content: String,
    #[serde(flatten)]
    pub media: Media,
}

impl ReplyParam {
    pub fn validate(&self) -> Result<(), ReviewError> {
        require_positive("review_id", self.review_id.0)?;
        require_positive("store_id", self.store_id.0)?;
        require_text("content", &self.content)
    }
}

/// A store's dispute against a review, or a revision of a pending one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppealParam {
    pub review_id: ReviewId,
    pub store_id: StoreId,
    pub content: String,
    #[serde(default)]
    pub reason: String,
    #[serde(flatten)]
    pub media: Media,
}

impl AppealParam {
    pub fn validate(&self) -> Result<(), ReviewError> {
        require_positive("review_id", self.review_id.0)?;
        require_positive("store_id", self.store_id.0)?;
        require_text("content", &self.content)
    }
}

/// An operator's verdict on an appeal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditParam {
    pub appeal_id: AppealId,
    pub review_id: ReviewId,
    pub status: AppealStatus,
    pub op_user: String,
    #[serde(default)]
    pub reason: String,
}

impl AuditParam {
    pub fn validate(&self) -> Result<(), ReviewError> {
        require_positive("appeal_id", self.appeal_id.0)?;
        require_positive("review_id", self.review_id.0)?;
        require_text("op_user", &self.op_user)?;
        if !self.status.is_terminal() {
            return Err(ReviewError::validation(format!(
                "verdict status must be above {}, got {}",
                AppealStatus::PENDING_CEILING,
                self.status.code()
            )));
        }
        Ok(())
    }
}

/// Page number and size after clamping, both at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u64,
    pub size: u64,
}

impl PageWindow {
    /// Non-positive pages become 1. A non-positive size becomes
    /// `DEFAULT_PAGE_SIZE` and an oversized one is capped at `MAX_PAGE_SIZE`.
    ///
    /// Oversized pages are capped rather than reset to `DEFAULT_PAGE_SIZE`:
    /// a caller asking for 100 gets 50.
    pub fn clamp(page: i64, size: i64) -> Self {
        let page = u64::try_from(page).ok().filter(|&p| p > 0).unwrap_or(1);
        let size = match u64::try_from(size) {
            Ok(0) | Err(_) => DEFAULT_PAGE_SIZE,
            Ok(size) => size.min(MAX_PAGE_SIZE),
        };
        Self { page, size }
    }

    /// Zero-based index of the first hit on this page.
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.size)
    }
}

/// One page of a store's reviews, as read back from the search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewPage {
    /// Number of matching documents in the index, across all pages.
    pub total: u64,
    pub reviews: Vec<ReviewDocument>,
}
