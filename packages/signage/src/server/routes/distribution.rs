use std::time::Duration;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::common::{DeliveryId, DeviceId};
use crate::domains::distribution::models::{DeliveryStatus, DistributionRecord, DistributionStats};
use crate::domains::distribution::{DistributionOutcome, DistributionRequest};
use crate::server::app::AppState;
use crate::server::error::ApiError;

const DEFAULT_PULL_LIMIT: usize = 20;
const DEFAULT_STALE_SECS: u64 = 3600;

#[derive(Debug, Deserialize)]
pub struct StatusReport {
    pub status: DeliveryStatus,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetryRequest {
    #[serde(default)]
    pub priority: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub recompute: bool,
}

#[derive(Debug, Deserialize)]
pub struct PullQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct StaleQuery {
    pub older_than_secs: Option<u64>,
}

/// POST /api/distributions
pub async fn distribute_handler(
    Extension(state): Extension<AppState>,
    Json(req): Json<DistributionRequest>,
) -> Result<(StatusCode, Json<DistributionOutcome>), ApiError> {
    let outcome = state.distribution.distribute(req).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// POST /api/distributions/:id/status
pub async fn update_delivery_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<DeliveryId>,
    Json(report): Json<StatusReport>,
) -> Result<Json<DistributionRecord>, ApiError> {
    let record = state
        .distribution
        .update_delivery_status(id, report.status, report.detail)?;
    Ok(Json(record))
}

/// POST /api/distributions/:id/retry
pub async fn retry_delivery_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<DeliveryId>,
    body: Option<Json<RetryRequest>>,
) -> Result<(StatusCode, Json<DistributionRecord>), ApiError> {
    let Json(req) = body.unwrap_or_default();
    let record = state.distribution.retry_delivery(id, req.priority).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/distributions/stats
pub async fn stats_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<StatsQuery>,
) -> Json<DistributionStats> {
    if query.recompute {
        Json(state.distribution.recompute_stats())
    } else {
        Json(state.distribution.get_stats())
    }
}

/// GET /api/distributions/stale
pub async fn stale_deliveries_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<StaleQuery>,
) -> Json<Vec<DistributionRecord>> {
    let older_than = Duration::from_secs(query.older_than_secs.unwrap_or(DEFAULT_STALE_SECS));
    Json(state.distribution.stale_deliveries(older_than))
}

/// GET /api/devices/:id/deliveries
pub async fn device_deliveries_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<DeviceId>,
    Query(query): Query<PullQuery>,
) -> Json<Vec<DistributionRecord>> {
    let limit = query.limit.unwrap_or(DEFAULT_PULL_LIMIT);
    Json(state.distribution.next_deliveries(id, limit))
}
