pub mod error;
pub mod pipelines;
pub mod stream;

use gotcha::axum::response::{IntoResponse, Response};
use gotcha::Json;
use serde_json::json;

/// GET /api - Health check
pub async fn health_check() -> Response {
    Json(json!({"status": "ok"})).into_response()
}
