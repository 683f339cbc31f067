use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::broadcaster::LogBroadcaster;
use super::event::PipelineEvent;
use super::subscription::{SubscriberId, Subscription};

/// Comment frame written on every heartbeat tick; ignored by SSE clients
pub const KEEP_ALIVE_FRAME: &str = ": keep-alive\n\n";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("peer disconnected")]
    Disconnected,

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outgoing side of one observer connection
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Hand one complete frame to the peer without buffering it
    async fn send_frame(&self, frame: String) -> Result<(), SessionError>;

    /// Resolves once the peer is gone
    async fn closed(&self);
}

#[async_trait]
impl FrameSink for mpsc::Sender<String> {
    async fn send_frame(&self, frame: String) -> Result<(), SessionError> {
        self.send(frame).await.map_err(|_| SessionError::Disconnected)
    }

    async fn closed(&self) {
        mpsc::Sender::closed(self).await
    }
}

/// Encode an event as one `data: <json>\n\n` frame
pub fn encode_frame(event: &PipelineEvent) -> Result<String, SessionError> {
    let json = serde_json::to_string(event)?;
    Ok(format!("data: {}\n\n", json))
}

/// Why a session stopped streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The peer went away (closed signal or failed write)
    Disconnected,
    /// The subscription was removed from the broadcaster
    HubClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEnd {
    pub reason: EndReason,
    pub delivered: u64,
    pub skipped: u64,
}

/// Binds one connection to one subscription until the connection goes away.
///
/// The subscription is owned by the session, so whichever way `run` exits
/// (or if its task is aborted) the observer is unregistered and anything
/// still queued is discarded.
pub struct StreamingSession {
    subscription: Subscription,
    heartbeat: Option<Duration>,
}

impl StreamingSession {
    pub fn open(broadcaster: &LogBroadcaster, heartbeat: Option<Duration>) -> Self {
        let subscription = broadcaster.subscribe();
        Self {
            subscription,
            heartbeat: heartbeat.filter(|period| !period.is_zero()),
        }
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscription.id()
    }

    pub async fn run<S: FrameSink + ?Sized>(self, sink: &S) -> SessionEnd {
        self.run_with(sink, encode_frame).await
    }

    /// Like [`run`](Self::run), turning events into frames with `encode`.
    ///
    /// An event that fails to encode is skipped; the session keeps going.
    pub async fn run_with<S, E>(mut self, sink: &S, encode: E) -> SessionEnd
    where
        S: FrameSink + ?Sized,
        E: Fn(&PipelineEvent) -> Result<String, SessionError> + Send + Sync,
    {
        let subscriber_id = self.subscription.id();
        let mut delivered = 0u64;
        let mut skipped = 0u64;

        let heartbeat_enabled = self.heartbeat.is_some();
        let period = self.heartbeat.unwrap_or(Duration::from_secs(3600));
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(subscriber_id = %subscriber_id, "log stream opened");

        let reason = loop {
            tokio::select! {
                _ = sink.closed() => {
                    debug!(subscriber_id = %subscriber_id, "peer closed the stream");
                    break EndReason::Disconnected;
                }
                next = self.subscription.recv() => {
                    let Some(event) = next else {
                        debug!(subscriber_id = %subscriber_id, "subscription closed by broadcaster");
                        break EndReason::HubClosed;
                    };
                    // Unsubscribed with events still queued: those are discarded.
                    if !self.subscription.is_active() {
                        debug!(subscriber_id = %subscriber_id, "subscription released, discarding queued events");
                        break EndReason::HubClosed;
                    }
                    let frame = match encode(&event) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(
                                subscriber_id = %subscriber_id,
                                pipeline_id = event.pipeline_id,
                                error = %e,
                                "skipping event that failed to encode"
                            );
                            skipped += 1;
                            continue;
                        }
                    };
                    if sink.send_frame(frame).await.is_err() {
                        break EndReason::Disconnected;
                    }
                    delivered += 1;
                }
                _ = heartbeat.tick(), if heartbeat_enabled => {
                    if sink.send_frame(KEEP_ALIVE_FRAME.to_string()).await.is_err() {
                        break EndReason::Disconnected;
                    }
                }
            }
        };

        drop(self.subscription);
        info!(
            subscriber_id = %subscriber_id,
            reason = ?reason,
            delivered,
            skipped,
            "log stream closed"
        );

        SessionEnd {
            reason,
            delivered,
            skipped,
        }
    }
}
