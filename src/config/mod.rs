use std::env;
use std::time::Duration;

use config::{Config, Environment, File};
use gotcha::ConfigWrapper;
use serde::{Deserialize, Serialize};

use crate::devops::DEFAULT_MAILBOX_CAPACITY;
use crate::FlowgoError;

/// Streaming behaviour for connected observers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StreamSettings {
    /// Events buffered per observer before new ones are dropped (default: 100)
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
    /// Seconds between keep-alive frames, 0 disables them (default: 30)
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

fn default_mailbox_capacity() -> usize {
    DEFAULT_MAILBOX_CAPACITY
}

fn default_heartbeat_secs() -> u64 {
    30
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            mailbox_capacity: default_mailbox_capacity(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

impl StreamSettings {
    pub fn heartbeat(&self) -> Option<Duration> {
        (self.heartbeat_secs > 0).then(|| Duration::from_secs(self.heartbeat_secs))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub stream: StreamSettings,
}

impl Settings {
    pub fn new() -> crate::Result<ConfigWrapper<Self>> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with defaults
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific file
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local configuration file (not tracked by git)
            .add_source(File::with_name("config/local").required(false))
            // e.g. FLOWGO_APPLICATION__STREAM__MAILBOX_CAPACITY=200
            .add_source(
                Environment::with_prefix("FLOWGO")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(s.try_deserialize()?)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.stream.mailbox_capacity == 0 {
            return Err(FlowgoError::InvalidConfig(
                "stream.mailbox_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
