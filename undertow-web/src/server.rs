//! JSON API and streaming server for Undertow
//!
//! Wires the session registry and subtitle provider into an axum router and
//! runs it until the shutdown token fires. The idle-session sweeper runs
//! alongside the server and stops with it.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use undertow_core::config::UndertowConfig;
use undertow_core::session::SessionRegistry;
use undertow_search::SubtitleProvider;

use crate::handlers::{
    add_magnet, cleanup, download_subtitle, list_torrents, remove_torrent, search_subtitles,
    select_file, stream_file, subtitle_file, upload_subtitle,
};

/// Room for multipart boundaries and headers on top of the upload limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub subtitles: Arc<dyn SubtitleProvider>,
    pub config: Arc<UndertowConfig>,
}

impl AppState {
    pub fn new(
        registry: Arc<SessionRegistry>,
        subtitles: Arc<dyn SubtitleProvider>,
        config: UndertowConfig,
    ) -> Self {
        Self {
            registry,
            subtitles,
            config: Arc::new(config),
        }
    }
}

/// Errors that stop the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Builds the router with every API and streaming route.
pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.server.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        // Session management
        .route("/api/magnet", post(add_magnet))
        .route("/api/torrents", get(list_torrents))
        .route("/api/torrents/{id}", delete(remove_torrent))
        .route("/api/select/{id}", post(select_file))
        .route("/api/cleanup", post(cleanup))
        // Subtitles
        .route(
            "/api/subtitle/{id}",
            post(upload_subtitle).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/subtitles/search/{id}", get(search_subtitles))
        .route("/api/subtitles/download/{id}", post(download_subtitle))
        // Byte endpoints
        .route("/stream/{id}", get(stream_file))
        .route("/subs/{id}/{index}", get(subtitle_file))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds the configured address and serves until `shutdown` fires.
///
/// # Errors
/// - `ServerError::Bind` - Address unavailable
/// - `ServerError::Serve` - Listener failed while serving
pub async fn run_server(state: AppState, shutdown: CancellationToken) -> Result<(), ServerError> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    serve(listener, state, shutdown).await
}

/// Serves on an already bound listener.
///
/// On shutdown every session is released and the data directory emptied.
///
/// # Errors
/// - `ServerError::Serve` - Listener failed while serving
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let local_addr: SocketAddr = listener.local_addr()?;
    info!(%local_addr, "Undertow server listening");

    let sweeper = state.registry.spawn_sweeper(shutdown.child_token());
    let app = build_router(state.clone());

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "Sweeper task ended abnormally");
    }
    if let Err(e) = state.registry.remove_all().await {
        warn!(error = %e, "Failed to clean data directory on shutdown");
    }
    info!("Server stopped");

    result.map_err(ServerError::Serve)
}
