use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use relay_core::{Broker, BrokerHandle};
use relay_telemetry::MetricsRecorder;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::handlers;
use crate::health;
use crate::websocket;

/// Shared state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub broker: BrokerHandle,
    pub config: Arc<ServerConfig>,
    pub metrics: Arc<MetricsRecorder>,
    /// Cancelled when the server is stopping; open WebSockets close on it.
    pub shutdown: CancellationToken,
    pub start_time: Instant,
}

impl AppState {
    /// State around a freshly spawned broker.
    pub fn new(config: ServerConfig, metrics: Arc<MetricsRecorder>, shutdown: CancellationToken) -> Self {
        let broker = Broker::spawn(config.broker.clone());
        Self {
            broker,
            config: Arc::new(config),
            metrics,
            shutdown,
            start_time: Instant::now(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;
    Router::new()
        .route("/api/events", axum::routing::post(handlers::ingest_event))
        .route(
            "/api/permission/{event_id}",
            get(handlers::await_decision).post(handlers::submit_decision),
        )
        .route("/api/respond", axum::routing::post(handlers::submit_response))
        .route(
            "/api/pending-response/{session_id}",
            get(handlers::await_response),
        )
        .route(
            "/api/messages",
            get(handlers::list_events).delete(handlers::clear_events),
        )
        .route("/api/sessions", get(handlers::list_sessions))
        .route("/api/stats", get(handlers::stats))
        .route("/ws", get(websocket::ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind, spawn a broker and serve until `shutdown` is cancelled.
pub async fn start(
    config: ServerConfig,
    metrics: Arc<MetricsRecorder>,
    shutdown: CancellationToken,
) -> Result<ServerHandle, std::io::Error> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;

    let state = AppState::new(config, metrics, shutdown.clone());
    let broker = state.broker.clone();
    let router = build_router(state);

    tracing::info!(addr = %local_addr, "relay server started");

    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "server exited with error");
        }
        tracing::info!("relay server stopped");
    });

    Ok(ServerHandle {
        addr: local_addr,
        broker,
        server,
    })
}

/// Returned by [`start`].
pub struct ServerHandle {
    pub addr: SocketAddr,
    broker: BrokerHandle,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// The broker behind this server.
    pub fn broker(&self) -> &BrokerHandle {
        &self.broker
    }

    /// The serving task; completes after graceful shutdown.
    pub fn into_task(self) -> tokio::task::JoinHandle<()> {
        self.server
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.broker.stats().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(health::health_check(
                state.start_time,
                stats.connected_clients,
                stats.active_sessions,
            )),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(health::degraded(state.start_time)),
        ),
    }
}
