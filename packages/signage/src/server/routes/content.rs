use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::common::{ContentId, OwnerId};
use crate::domains::content::models::{ContentItem, NewContent};
use crate::domains::distribution::models::DistributionRecord;
use crate::error::PipelineError;
use crate::server::app::AppState;
use crate::server::error::ApiError;

/// Upload metadata from the storage collaborator.
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    #[serde(default)]
    pub content_id: Option<ContentId>,
    pub owner_id: OwnerId,
    pub media_type: String,
    pub size_bytes: u64,
    pub storage_locator: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl From<UploadRequest> for NewContent {
    fn from(req: UploadRequest) -> Self {
        NewContent {
            id: req.content_id.unwrap_or_else(ContentId::new),
            owner_id: req.owner_id,
            media_type: req.media_type,
            size_bytes: req.size_bytes,
            storage_locator: req.storage_locator,
            title: req.title,
            description: req.description,
            tags: req.tags,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ContentDetail {
    #[serde(flatten)]
    pub content: ContentItem,
    pub deliveries: Vec<DistributionRecord>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArchiveRequest {
    #[serde(default)]
    pub actor: Option<String>,
}

/// POST /api/content
pub async fn upload_handler(
    Extension(state): Extension<AppState>,
    Json(req): Json<UploadRequest>,
) -> Result<(StatusCode, Json<ContentItem>), ApiError> {
    let item = state.content.ingest(req.into())?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// GET /api/content/:id
pub async fn content_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<ContentId>,
) -> Result<Json<ContentDetail>, ApiError> {
    let content = state
        .content
        .get(id)
        .ok_or_else(|| PipelineError::content_not_found(id))?;
    let deliveries = state.distribution.records_for_content(id);
    Ok(Json(ContentDetail {
        content,
        deliveries,
    }))
}

/// POST /api/content/:id/archive
pub async fn archive_content_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<ContentId>,
    body: Option<Json<ArchiveRequest>>,
) -> Result<Json<ContentItem>, ApiError> {
    let Json(req) = body.unwrap_or_default();
    let item = state.content.archive(id, req.actor)?;
    Ok(Json(item))
}
