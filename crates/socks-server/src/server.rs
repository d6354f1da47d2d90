//! `SocksServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use secrecy::SecretString;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::ids::ConnectionId;
use crate::publish::send_handler;
use crate::registry::ConnectionRegistry;
use crate::tls::TlsListener;
use crate::websocket::session::{SessionContext, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live subscribers.
    pub registry: Arc<ConnectionRegistry>,
    /// Publish secret.
    pub secret: Arc<SecretString>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// Resources handed to each WebSocket session.
    pub session: SessionContext,
    /// Inbound WebSocket message cap.
    pub max_message_size: Option<usize>,
}

/// The relay server.
pub struct SocksServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    secret: Arc<SecretString>,
    shutdown: CancellationToken,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
    open_sessions: Arc<AtomicUsize>,
}

impl SocksServer {
    /// Create a new server.
    pub fn new(config: ServerConfig, secret: SecretString) -> Self {
        Self {
            config,
            registry: Arc::new(ConnectionRegistry::new()),
            secret: Arc::new(secret),
            shutdown: CancellationToken::new(),
            start_time: Instant::now(),
            metrics: None,
            open_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Serve `/metrics` from this handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            secret: self.secret.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            session: SessionContext {
                registry: self.registry.clone(),
                idle_timeout: self.config.idle_timeout(),
                send_queue: self.config.send_queue,
                open_sessions: self.open_sessions.clone(),
                shutdown: self.shutdown.clone(),
            },
            max_message_size: self.config.max_message_size,
        };

        Router::new()
            .route("/v1/ws", get(ws_handler))
            .route("/v1/send", post(send_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and start serving on a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task,
    /// which finishes after [`shutdown`](Self::shutdown) once in-flight
    /// requests have drained.
    pub async fn listen(
        &self,
        tls: Option<TlsAcceptor>,
    ) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.clone();

        let handle = if let Some(acceptor) = tls {
            let listener = TlsListener::new(listener, acceptor)?;
            info!(%addr, "listening (https/wss)");
            tokio::spawn(async move {
                let serve = axum::serve(listener, router)
                    .with_graceful_shutdown(token.cancelled_owned());
                if let Err(e) = serve.await {
                    error!(error = %e, "server error");
                }
            })
        } else {
            info!(%addr, "listening (http/ws)");
            tokio::spawn(async move {
                let serve = axum::serve(listener, router)
                    .with_graceful_shutdown(token.cancelled_owned());
                if let Err(e) = serve.await {
                    error!(error = %e, "server error");
                }
            })
        };

        Ok((addr, handle))
    }

    /// Stop accepting connections and close open sessions.
    pub fn shutdown(&self) {
        info!("shutdown requested");
        self.shutdown.cancel();
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open WebSocket sessions.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::Relaxed)
    }
}

/// GET /v1/ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let limit = state.max_message_size.unwrap_or(usize::MAX);
    let ctx = state.session;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| run_ws_session(socket, ConnectionId::new(), ctx))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.session.open_sessions.load(Ordering::Relaxed);
    let subscribed = state.registry.len();
    Json(health::health_check(state.start_time, connections, subscribed))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            crate::metrics::render(&handle),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
