use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use delivery_lifecycle::error::AppError;
use delivery_lifecycle::{api, config, location, polling, state};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let (app_state, location_rx) = state::AppState::new(config.location_queue_size);
    let shared_state = Arc::new(app_state);

    tokio::spawn(location::publisher::run_location_writer(
        shared_state.clone(),
        location_rx,
    ));

    let pending_state = shared_state.clone();
    let pending_poll = polling::schedule("pending_orders", config.pending_poll_interval, move || {
        polling::refresh_pending_orders(pending_state.clone())
    });

    let roster_state = shared_state.clone();
    let roster_poll = polling::schedule("roster", config.roster_poll_interval, move || {
        polling::refresh_roster(roster_state.clone())
    });

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    pending_poll.stop().await;
    roster_poll.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
