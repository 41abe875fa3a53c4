//! Pipeline errors as HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use crate::error::PipelineError;

#[derive(Debug)]
pub enum ApiError {
    Pipeline(PipelineError),
    BadRequest(String),
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        ApiError::Pipeline(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            ApiError::Pipeline(error) => {
                let message = error.to_string();
                match error {
                    PipelineError::InvalidTransition {
                        id,
                        current,
                        requested,
                    } => (
                        StatusCode::CONFLICT,
                        json!({
                            "error": message,
                            "entity": current.entity(),
                            "id": id,
                            "current": current,
                            "requested": requested,
                        }),
                    ),
                    PipelineError::PreconditionFailed { violations } => (
                        StatusCode::PRECONDITION_FAILED,
                        json!({ "error": message, "violations": violations }),
                    ),
                    PipelineError::NotFound { .. } => {
                        (StatusCode::NOT_FOUND, json!({ "error": message }))
                    }
                    PipelineError::Validation(_) => {
                        (StatusCode::BAD_REQUEST, json!({ "error": message }))
                    }
                    PipelineError::DuplicateEvent { .. } => {
                        (StatusCode::CONFLICT, json!({ "error": message }))
                    }
                    PipelineError::ScorerUnavailable { .. } => {
                        warn!(error = %message, "scorer unavailable");
                        (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": message }))
                    }
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ContentId, DeliveryId};
    use crate::domains::content::models::ContentStatus;
    use crate::domains::distribution::models::DeliveryStatus;
    use crate::error::PreconditionViolation;

    #[test]
    fn test_status_codes() {
        let cases = [
            (
                PipelineError::InvalidTransition {
                    id: DeliveryId::new().into_uuid(),
                    current: DeliveryStatus::Displayed.into(),
                    requested: DeliveryStatus::Downloading.into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                PipelineError::precondition(PreconditionViolation::ContentNotApproved {
                    content_id: ContentId::new(),
                    status: ContentStatus::PendingReview,
                }),
                StatusCode::PRECONDITION_FAILED,
            ),
            (PipelineError::content_not_found(ContentId::new()), StatusCode::NOT_FOUND),
            (PipelineError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (
                PipelineError::ScorerUnavailable {
                    content_id: ContentId::new(),
                    attempts: 4,
                    last_error: "timeout".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(ApiError::from(error).into_response().status(), status);
        }
    }
}
