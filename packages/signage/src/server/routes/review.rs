use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::Deserialize;

use crate::common::{ContentId, ReviewerId};
use crate::domains::content::models::ContentItem;
use crate::domains::moderation::models::ReviewVerdict;
use crate::server::app::AppState;
use crate::server::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub verdict: ReviewVerdict,
    pub reviewer_id: ReviewerId,
    #[serde(default)]
    pub notes: Option<String>,
}

/// GET /api/review/queue
pub async fn review_queue_handler(Extension(state): Extension<AppState>) -> Json<Vec<ContentItem>> {
    Json(state.review.queue())
}

/// POST /api/review/:id/decision
pub async fn decide_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<ContentId>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<ContentItem>, ApiError> {
    let item = state
        .review
        .decide(id, req.verdict, req.reviewer_id, req.notes)?;
    Ok(Json(item))
}
