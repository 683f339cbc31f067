use gotcha::axum::extract::{Path, State};
use gotcha::{Json, Schematic};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::error::ApiError;
use crate::{Broadcaster, FlowgoError};

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Schematic)]
pub struct PublishLogRequest {
    pub content: String,
}

#[derive(Debug, Deserialize, Schematic)]
pub struct PublishStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, Schematic)]
pub struct PublishAck {
    pub pipeline_id: u64,
    /// Observers registered when the event was published
    pub subscribers: usize,
}

#[derive(Debug, Serialize, Deserialize, Schematic)]
pub struct SubscriberStats {
    pub subscribers: usize,
    pub mailbox_capacity: usize,
}

// ============================================================================
// HTTP Handlers
// ============================================================================

/// POST /api/pipelines/:pipeline_id/logs - Publish a log line
#[gotcha::api]
pub async fn publish_log(
    State(broadcaster): State<Broadcaster>,
    Path(pipeline_id): Path<u64>,
    Json(payload): Json<PublishLogRequest>,
) -> Result<Json<PublishAck>, ApiError> {
    broadcaster.publish_log(pipeline_id, payload.content);

    Ok(Json(PublishAck {
        pipeline_id,
        subscribers: broadcaster.subscriber_count(),
    }))
}

/// POST /api/pipelines/:pipeline_id/status - Publish a status transition
#[gotcha::api]
pub async fn publish_status(
    State(broadcaster): State<Broadcaster>,
    Path(pipeline_id): Path<u64>,
    Json(payload): Json<PublishStatusRequest>,
) -> Result<Json<PublishAck>, ApiError> {
    let status = payload.status.trim();
    if status.is_empty() {
        return Err(FlowgoError::BadRequest("status must not be empty".to_string()).into());
    }

    debug!(pipeline_id, status, "pipeline status changed");
    broadcaster.publish_status(pipeline_id, status);

    Ok(Json(PublishAck {
        pipeline_id,
        subscribers: broadcaster.subscriber_count(),
    }))
}

/// GET /api/devops/subscribers - Connected observer count
#[gotcha::api]
pub async fn subscriber_stats(
    State(broadcaster): State<Broadcaster>,
) -> Result<Json<SubscriberStats>, ApiError> {
    Ok(Json(SubscriberStats {
        subscribers: broadcaster.subscriber_count(),
        mailbox_capacity: broadcaster.mailbox_capacity(),
    }))
}
