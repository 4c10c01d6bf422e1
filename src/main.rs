//! Binary entrypoint wiring REST, SSE, the local snapshot cache, and the
//! remote tournament synchroniser.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dao;
mod dto;
mod error;
mod routes;
mod services;
mod state;

use config::AppConfig;
use dao::match_store::file::FileCacheStore;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();

    let cache = FileCacheStore::open(config.cache_dir.clone())
        .await
        .context("opening match snapshot cache")?;
    let app_state = AppState::new(Arc::new(cache));

    spawn_sync_supervisor(app_state.clone(), &config);

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Start the background remote synchroniser when a remote backend is
/// configured; without one the server runs cache-only and stays degraded.
fn spawn_sync_supervisor(state: state::SharedState, config: &AppConfig) {
    #[cfg(feature = "remote-http")]
    if let Some(base_url) = config.remote_base_url.clone() {
        use dao::match_store::{RemoteStore, http::RemoteHttpStore};
        use dao::storage::StorageError;

        let token = config.remote_token.clone();
        let interval = config.sync_interval;
        tokio::spawn(services::sync_service::run(state, interval, move || {
            let base_url = base_url.clone();
            let token = token.clone();
            async move {
                let store = RemoteHttpStore::connect(&base_url, token.as_deref())
                    .await
                    .map_err(StorageError::from)?;
                Ok(Arc::new(store) as Arc<dyn RemoteStore>)
            }
        }));
        return;
    }

    let _ = state;
    info!(
        sync_interval = ?config.sync_interval,
        "no remote backend configured; running cache-only"
    );
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: state::SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
