//! JSON-over-HTTP mapping of the workflow operations.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use review_core::StoreId;

use crate::error::{ErrorKind, ReviewError};
use crate::workflow::{AppealParam, AuditParam, ReplyParam, ReviewDraft};
use crate::AppState;

/// Error response: the status code follows the error's kind.
pub struct ApiError(ReviewError);

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match self.0.kind() {
            ErrorKind::Invalid => (StatusCode::BAD_REQUEST, "invalid_argument"),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            ErrorKind::Conflict => (StatusCode::CONFLICT, "conflict"),
            ErrorKind::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            ErrorKind::Transient => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }

        let body = json!({
            "error": code,
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Json<serde_json::Value>, ApiError>;

async fn create_review(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<ReviewDraft>,
) -> ApiResult {
    let review = state.workflow.create_review(draft).await?;
    Ok(Json(json!({ "review_id": review.review_id })))
}

async fn create_reply(
    State(state): State<Arc<AppState>>,
    Json(param): Json<ReplyParam>,
) -> ApiResult {
    let reply = state.workflow.create_reply(param).await?;
    Ok(Json(json!({ "reply_id": reply.reply_id })))
}

async fn create_appeal(
    State(state): State<Arc<AppState>>,
    Json(param): Json<AppealParam>,
) -> ApiResult {
    let appeal = state.workflow.create_appeal(param).await?;
    Ok(Json(json!({ "appeal_id": appeal.appeal_id })))
}

async fn audit_appeal(
    State(state): State<Arc<AppState>>,
    Json(param): Json<AuditParam>,
) -> ApiResult {
    state.workflow.update_appeal(param).await?;
    Ok(Json(json!({})))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    page: Option<i64>,
    size: Option<i64>,
}

async fn list_reviews(
    State(state): State<Arc<AppState>>,
    Path(store_id): Path<i64>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let page = state
        .workflow
        .list_reviews_by_store(
            StoreId(store_id),
            query.page.unwrap_or(0),
            query.size.unwrap_or(0),
        )
        .await?;
    Ok(Json(json!({
        "total": page.total,
        "list": page.reviews,
    })))
}

pub fn review_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/review", post(create_review))
        .route("/v1/review/reply", post(create_reply))
        .route("/v1/review/appeal", post(create_appeal))
        .route("/v1/appeal/audit", post(audit_appeal))
        .route("/v1/store/{store_id}/reviews", get(list_reviews))
}
