pub mod api;
pub mod config;
pub mod devops;

use std::ops::Deref;

use gotcha::axum::extract::FromRef;
use thiserror::Error;

use crate::config::Settings;
use crate::devops::LogBroadcaster;

// ============================================================================
// Broadcaster wrapper
// ============================================================================

/// Broadcaster wrapper for state extraction
#[derive(Clone)]
pub struct Broadcaster(pub LogBroadcaster);

impl Deref for Broadcaster {
    type Target = LogBroadcaster;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum FlowgoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP error: {0}")]
    Http(#[from] gotcha::axum::http::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

pub type Result<T> = std::result::Result<T, FlowgoError>;

impl FlowgoError {
    pub fn to_status_code(&self) -> gotcha::axum::http::StatusCode {
        use gotcha::axum::http::StatusCode;
        match self {
            FlowgoError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            FlowgoError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            FlowgoError::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
            FlowgoError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

// ============================================================================
// Application state
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub broadcaster: LogBroadcaster,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let broadcaster = LogBroadcaster::with_capacity(settings.stream.mailbox_capacity);
        Self {
            settings,
            broadcaster,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

// Allow extracting Settings from GotchaContext
impl FromRef<gotcha::GotchaContext<AppState, Settings>> for Settings {
    fn from_ref(ctx: &gotcha::GotchaContext<AppState, Settings>) -> Self {
        ctx.state.settings.clone()
    }
}

// Allow extracting Broadcaster from GotchaContext
impl FromRef<gotcha::GotchaContext<AppState, Settings>> for Broadcaster {
    fn from_ref(ctx: &gotcha::GotchaContext<AppState, Settings>) -> Self {
        Broadcaster(ctx.state.broadcaster.clone())
    }
}
