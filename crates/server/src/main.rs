use std::{net::SocketAddr, sync::Arc};

use axum::{
    routing::{get, post},
    Router,
};
use presentation::SessionRegistry;
use shared::domain::SessionName;
use tower_http::{limit::RequestBodyLimitLayer, services::ServeDir};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, prepare_store_location};

const MAX_REQUEST_BYTES: usize = 16 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings()?;
    let location = prepare_store_location(&settings.data_dir).map_err(|error| {
        error!(
            data_dir = %settings.data_dir,
            %error,
            "failed to prepare session data directory; verify permissions"
        );
        error
    })?;
    info!(?location, slide_limit = ?settings.slide_limit, "session stores configured");

    let sessions = SessionRegistry::new(location, settings.slide_limit, settings.event_capacity);
    let state = AppState { sessions };
    let mut app = build_router(Arc::new(state));
    if let Some(static_dir) = &settings.static_dir {
        info!(%static_dir, "serving static files");
        app = app.fallback_service(ServeDir::new(static_dir));
    }

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, "server listening");
    if let Ok(url) = settings.audience_url(&SessionName::default()) {
        info!(%url, "audience join link for the default session");
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(api::healthz))
        .route("/sessions", get(api::list_sessions))
        .route("/sessions/:session/state", get(api::get_state))
        .route("/sessions/:session/advance/forward", post(api::advance_forward))
        .route("/sessions/:session/advance/backward", post(api::advance_backward))
        .route("/sessions/:session/slide", post(api::set_slide))
        .route("/sessions/:session/reactions", post(api::submit_reaction))
        .route("/sessions/:session/reactions/totals", get(api::reaction_totals))
        .route("/sessions/:session/ws", get(api::ws::ws_handler))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
