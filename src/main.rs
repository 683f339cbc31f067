use gotcha::Gotcha;
use tracing::{error, info};

use flowgo::api::{health_check, pipelines, stream};
use flowgo::config::Settings;
use flowgo::AppState;

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting Flowgo log stream server");

    let settings = Settings::new().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    settings.application.validate().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;

    let app_state = AppState::new(settings.application.clone());
    let broadcaster = app_state.broadcaster.clone();

    info!(
        mailbox_capacity = broadcaster.mailbox_capacity(),
        heartbeat_secs = settings.application.stream.heartbeat_secs,
        "Log broadcaster initialized"
    );

    let addr = format!("{}:{}", &settings.basic.host, &settings.basic.port);
    info!("Starting server on http://{}", addr);

    let server = Gotcha::with_types::<AppState, Settings>()
        .state(app_state)
        .config(settings)
        // Health check
        .get("/api", health_check)
        // Observer stream
        .get("/api/devops/logs/stream", stream::stream_logs)
        .get("/api/devops/subscribers", pipelines::subscriber_stats)
        // Producer routes
        .post("/api/pipelines/:pipeline_id/logs", pipelines::publish_log)
        .post("/api/pipelines/:pipeline_id/status", pipelines::publish_status)
        .with_cors()
        .with_openapi()
        .listen(addr);

    tokio::select! {
        result = server => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    broadcaster.close_all();

    Ok(())
}
