//! HTTP surface of the relay
//!
//! Three routes: the websocket signaling endpoint, the segment upload
//! endpoint for the fallback pipeline, and a static mount serving
//! published media (GET and HEAD, so consumers can probe manifests
//! cheaply). CORS is open; browsers on other origins are the normal
//! clients.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::error::Result;
use crate::fallback::{FallbackError, SegmentStore};
use crate::protocol::{SessionId, SignalingMessage};
use crate::registry::SessionRegistry;
use crate::relay::SignalingRelay;
use crate::server::config::ServerConfig;
use crate::server::ws;
use crate::stats::RelayStats;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub relay: SignalingRelay,
    pub store: Arc<SegmentStore>,
    pub channel_capacity: usize,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let stats = Arc::new(RelayStats::new());
        let store = Arc::new(
            SegmentStore::new(config.media_root.clone())
                .with_limits(config.min_segment_bytes, config.window_size)
                .accepted_content_types(config.accepted_content_types.clone())
                .target_duration(config.target_duration),
        );
        Self {
            relay: SignalingRelay::new(registry, stats),
            store,
            channel_capacity: config.channel_capacity,
        }
    }
}

/// Build the full application router.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/ws", any(ws_upgrade))
        .route("/upload-video/{session_id}", post(upload_segment))
        .nest_service("/media", ServeDir::new(&config.media_root))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn ws_upgrade(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| ws::handle_session(socket, state))
}

/// Ingest one fallback segment for `session_id`.
///
/// On success the session's paired peer is told where the manifest lives.
/// Rejections come back as 400 with a reason; storage failures as 500.
async fn upload_segment(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session_id = SessionId::from(session_id);
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    match state
        .store
        .accept_segment(&session_id, &content_type, &body)
        .await
    {
        Ok(accepted) => {
            state.relay.stats().segment_accepted();
            state
                .relay
                .notify_manifest(
                    &session_id,
                    SignalingMessage::HlsPlaylist {
                        peer_id: session_id.clone(),
                        playlist: accepted.manifest_path.clone(),
                    },
                )
                .await;
            state.relay.stats().manifest_published();
            (StatusCode::OK, accepted.manifest_path).into_response()
        }
        Err(e) => {
            state.relay.stats().segment_rejected();
            let status = match &e {
                FallbackError::InvalidSegmentFormat(_) | FallbackError::SegmentTooSmall { .. } => {
                    StatusCode::BAD_REQUEST
                }
                _ => {
                    tracing::error!(session_id = %session_id, error = %e, "Segment ingest failed");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            (status, e.to_string()).into_response()
        }
    }
}

/// The signaling relay server.
pub struct RelayServer {
    config: ServerConfig,
    state: AppState,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> Self {
        let state = AppState::new(&config);
        Self { config, state }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.state.relay.registry()
    }

    pub fn stats(&self) -> &Arc<RelayStats> {
        self.state.relay.stats()
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        let router = build_router(self.state.clone(), &self.config);
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Relay server listening");
        axum::serve(listener, router).await?;
        Ok(())
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = build_router(self.state.clone(), &self.config);
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Relay server listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!("Relay server stopped");
        Ok(())
    }
}
