use std::convert::Infallible;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Response as HttpResponse};
use futures_util::stream;
use gotcha::axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;

use crate::api::error::ApiError;
use crate::config::Settings;
use crate::devops::StreamingSession;
use crate::Broadcaster;

/// Frames queued between the session and the response body
const FRAME_BUFFER: usize = 16;

/// GET /api/devops/logs/stream - Server-sent events for pipeline logs
///
/// The session runs on its own task and writes into a channel backing the
/// response body. When the client goes away the server drops the body, the
/// channel closes and the session unsubscribes.
pub async fn stream_logs(
    State(broadcaster): State<Broadcaster>,
    State(settings): State<Settings>,
) -> Response {
    match open_stream(&broadcaster, &settings) {
        Ok(response) => response,
        Err(e) => ApiError::from(e).into_response(),
    }
}

fn open_stream(broadcaster: &Broadcaster, settings: &Settings) -> crate::Result<Response> {
    let session = StreamingSession::open(broadcaster, settings.stream.heartbeat());
    let (tx, rx) = mpsc::channel::<String>(FRAME_BUFFER);

    let frames = stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|frame| (Ok::<_, Infallible>(frame), rx))
    });

    let response = HttpResponse::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(frames))?;

    tokio::spawn(async move {
        session.run(&tx).await;
    });

    Ok(response)
}
