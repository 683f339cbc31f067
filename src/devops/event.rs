use chrono::Utc;
use serde::{Deserialize, Serialize};

/// What a [`PipelineEvent`] carries in its `content`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A single log line
    Log,
    /// A new status label for the pipeline run
    Status,
}

/// One occurrence in a pipeline run, streamed to every observer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub pipeline_id: u64,
    pub content: String,
    /// Milliseconds since the Unix epoch, `0` until stamped
    pub timestamp: i64,
}

impl PipelineEvent {
    /// Timestamp value meaning "not stamped yet"
    pub const UNSTAMPED: i64 = 0;

    pub fn log(pipeline_id: u64, content: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Log,
            pipeline_id,
            content: content.into(),
            timestamp: Self::UNSTAMPED,
        }
    }

    pub fn status(pipeline_id: u64, status: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Status,
            pipeline_id,
            content: status.into(),
            timestamp: Self::UNSTAMPED,
        }
    }

    /// Set an explicit timestamp
    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Fill in the current wall-clock time if the event carries the sentinel
    pub(crate) fn stamped(mut self) -> Self {
        if self.timestamp == Self::UNSTAMPED {
            self.timestamp = Utc::now().timestamp_millis();
        }
        self
    }
}
