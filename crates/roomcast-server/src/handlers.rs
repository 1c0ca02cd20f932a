//! HTTP and WebSocket handlers for the Roomcast server.
//!
//! Routes:
//! - `GET /ws?room=<id>` joins a room and upgrades to a WebSocket
//! - `GET|POST|PATCH|DELETE /room/:id` reads and writes room content
//! - `GET /health` reports liveness and hub statistics

use crate::config::{Config, StoreBackend};
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use roomcast_core::{HubError, Registry, RoomId, Session};
use roomcast_store::{
    ContentId, ContentStore, MemoryStore, RocksConfig, RocksStore, RoomContent, StoreError,
};
use roomcast_transport::{run_session, websocket, ConnectionId};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The room registry.
    pub registry: Arc<Registry>,
    /// Room content storage.
    pub store: Arc<dyn ContentStore>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create app state around an already opened store.
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn ContentStore>) -> Self {
        Self {
            registry: Arc::new(Registry::with_config(config.hub_config())),
            store,
            config,
        }
    }
}

/// Open the configured content store.
///
/// # Errors
///
/// Returns an error if the rocksdb database cannot be opened.
pub fn open_store(config: &Config) -> Result<Arc<dyn ContentStore>> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Rocksdb => {
            let path = config.store_path();
            let mut rocks = RocksConfig::new(path.clone());
            rocks.sync_writes = config.store.sync_writes;
            let store = RocksStore::open(rocks)
                .with_context(|| format!("Failed to open store at {}", path.display()))?;
            Ok(Arc::new(store))
        }
    }
}

/// Errors returned to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Hub rejected the request.
    #[error(transparent)]
    Hub(#[from] HubError),

    /// Content store rejected the request.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Request body could not be decoded.
    #[error("Invalid request body: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Hub(err) if err.is_validation() => StatusCode::BAD_REQUEST,
            Self::Hub(HubError::Closed | HubError::MaxRoomsReached | HubError::RoomFull(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Hub(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Store(StoreError::Invalid(_)) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::AlreadyExists(_)) => StatusCode::CONFLICT,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
            metrics::record_error(match &self {
                Self::Hub(_) => "hub",
                _ => "store",
            });
        } else {
            debug!(error = %self, %status, "Request rejected");
        }

        // Storage faults are not described to clients.
        let body = if status == StatusCode::INTERNAL_SERVER_ERROR {
            status.canonical_reason().unwrap_or("Internal Server Error").to_string()
        } else {
            self.to_string()
        };
        (status, body).into_response()
    }
}

/// Build the application router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route(
            "/room/:id",
            get(get_content)
                .post(create_content)
                .patch(update_content)
                .delete(delete_content),
        )
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP/WebSocket server until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let store = open_store(&config)?;
    info!(backend = store.name(), "Content store ready");
    let state = Arc::new(AppState::new(config.clone(), store));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Roomcast server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}?room=<id>",
        addr, config.transport.websocket_path
    );

    serve(listener, state, shutdown_signal()).await
}

/// Serve on `listener` until `signal` resolves.
///
/// The registry is shut down first so every open session ends and its
/// connection closes; the server then drains in-flight requests.
///
/// # Errors
///
/// Returns an error if accepting connections fails.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let registry = Arc::clone(&state.registry);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            signal.await;
            info!("Shutdown requested, closing all rooms");
            registry.shutdown();
        })
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.registry.stats();
    metrics::set_registry_stats(stats);
    let status = if state.registry.is_closed() {
        "shutting_down"
    } else {
        "ok"
    };

    Json(serde_json::json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "rooms": stats.room_count,
        "peers": stats.peer_count,
        "store": state.store.name(),
    }))
}

/// Query parameters of the WebSocket endpoint.
#[derive(Debug, Deserialize)]
struct JoinParams {
    room: Option<String>,
}

/// WebSocket upgrade handler.
///
/// The room is validated and joined before the upgrade, so a bad request
/// never becomes a session.
async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<JoinParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let room_id = RoomId::parse(params.room.as_deref().unwrap_or_default())?;
    let session = state.registry.join(room_id)?;
    metrics::record_join();

    Ok(ws.on_upgrade(move |socket| handle_websocket(socket, session, state)))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, session: Session, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();
    let connection_id = ConnectionId::generate();

    debug!(
        connection = %connection_id,
        room = %session.room_id(),
        peer = session.peer_id(),
        "WebSocket connected"
    );
    metrics::set_registry_stats(state.registry.stats());

    let started = Instant::now();
    let (sink, source) = websocket::split(socket);
    let summary = run_session(session, sink, source).await;

    metrics::record_session_duration(started.elapsed().as_secs_f64());
    metrics::record_pump(&summary);
    metrics::set_registry_stats(state.registry.stats());

    debug!(connection = %connection_id, ?summary, "WebSocket disconnected");
}

fn decode_content(body: &[u8]) -> Result<RoomContent, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

async fn get_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RoomContent>, ApiError> {
    let id = ContentId::parse(id)?;
    let result = state.store.get(&id).await;
    metrics::record_store_op("get", result.is_ok());
    Ok(Json(result?))
}

async fn create_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let id = ContentId::parse(id)?;
    let content = decode_content(&body)?;
    let result = state.store.create(&id, content).await;
    metrics::record_store_op("create", result.is_ok());
    result?;
    Ok("OK")
}

async fn update_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let id = ContentId::parse(id)?;
    let content = decode_content(&body)?;
    let result = state.store.update(&id, content).await;
    metrics::record_store_op("update", result.is_ok());
    result?;
    Ok("OK")
}

async fn delete_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<&'static str, ApiError> {
    let id = ContentId::parse(id)?;
    let result = state.store.delete(&id).await;
    metrics::record_store_op("delete", result.is_ok());
    result?;
    Ok("OK")
}
