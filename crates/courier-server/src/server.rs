//! `Server`: axum HTTP + WebSocket listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use thiserror::Error;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::handler::MessageHandler;
use crate::health::{self, HealthResponse};
use crate::registry::ConnectionRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::socket::{ConnectionOptions, PendingConnection};

/// Errors from binding or running the listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that failed to bind.
        addr: String,
        /// Underlying bind error.
        source: std::io::Error,
    },
    /// Any other listener I/O failure.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Processor shared by every connection.
    pub handler: Arc<dyn MessageHandler>,
    /// Open connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Shutdown signal.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server was built, for uptime.
    pub start_time: Instant,
    /// Per-socket options.
    pub options: ConnectionOptions,
    /// Largest accepted WebSocket message in bytes.
    pub max_message_size: usize,
}

/// The courier server.
pub struct Server {
    config: ServerConfig,
    handler: Arc<dyn MessageHandler>,
    registry: Arc<ConnectionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    /// Start time as seconds since the epoch, announced to clients.
    server_time: f64,
}

impl Server {
    /// Server running `handler` with `config`.
    pub fn new(config: ServerConfig, handler: impl MessageHandler) -> Self {
        Self::with_handler(config, Arc::new(handler))
    }

    /// Server running an already shared handler.
    pub fn with_handler(config: ServerConfig, handler: Arc<dyn MessageHandler>) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let server_time = chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        Self {
            config,
            handler,
            registry: Arc::new(ConnectionRegistry::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            server_time,
        }
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            handler: Arc::clone(&self.handler),
            registry: Arc::clone(&self.registry),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            options: ConnectionOptions {
                server_time: self.config.announce_server_time.then_some(self.server_time),
                heartbeat_interval: self.config.heartbeat_interval(),
            },
            max_message_size: self.config.max_message_size,
        };

        let ws_path = if self.config.ws_path.starts_with('/') {
            self.config.ws_path.clone()
        } else {
            format!("/{}", self.config.ws_path)
        };

        Router::new()
            .route("/health", get(health_handler))
            .route(&ws_path, get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Registry of open connections.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Start time as seconds since the epoch.
    pub fn server_time(&self) -> f64 {
        self.server_time
    }

    /// Bind and start serving in the background.
    pub async fn listen(self) -> Result<ServerHandle, ServerError> {
        let bind_addr = self.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: bind_addr.clone(),
                source,
            })?;
        let addr = listener.local_addr()?;
        info!(%addr, ws_path = %self.config.ws_path, "courier listening");

        let app = self.router();
        let token = self.shutdown.token();
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server stopped with error");
            }
        });

        Ok(ServerHandle {
            addr,
            registry: self.registry,
            shutdown: self.shutdown,
            server,
            shutdown_timeout: self.config.shutdown_timeout(),
        })
    }
}

/// A running server.
pub struct ServerHandle {
    addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    server: JoinHandle<()>,
    shutdown_timeout: Duration,
}

impl ServerHandle {
    /// Bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bound port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Registry of open connections.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Whether shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_shutting_down()
    }

    /// Stop accepting, close every connection and wait for them to drain.
    ///
    /// Returns `false` if connections were still open after the configured timeout.
    pub async fn shutdown(self) -> bool {
        let drained = self
            .shutdown
            .graceful_shutdown(&self.registry, Some(self.shutdown_timeout))
            .await;

        if drained {
            if let Err(e) = self.server.await {
                warn!(error = %e, "server task failed");
            }
        } else {
            self.server.abort();
        }
        info!(drained, "courier stopped");
        drained
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.len(),
        state.registry.active_messages(),
        state.shutdown.is_shutting_down(),
    ))
}

/// GET <ws_path>
async fn ws_handler(
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let AppState {
        handler,
        registry,
        shutdown,
        options,
        max_message_size,
        ..
    } = state;
    // Registered before the recheck: a concurrent shutdown either refuses
    // this upgrade or waits for it.
    let pending = PendingConnection::register(registry);
    if shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let token = shutdown.token();
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| pending.serve(socket, handler, options, token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use courier_core::{Failure, Outcome};
    use tower::ServiceExt;

    use crate::handler::MessageContext;

    struct Noop;

    #[async_trait]
    impl MessageHandler for Noop {
        async fn process_message(&self, _ctx: &MessageContext) -> Result<Outcome, Failure> {
            Ok(Outcome::Value(serde_json::Value::Null))
        }
    }

    fn make_server() -> Server {
        Server::new(ServerConfig::default(), Noop)
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = make_server().router();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["active_messages"], 0);
        assert!(parsed["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn ws_route_without_upgrade_is_rejected() {
        let app = make_server().router();
        let req = Request::builder().uri("/v1/ws").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn ws_route_refuses_during_shutdown() {
        let server = make_server();
        server.shutdown().shutdown();
        let req = Request::builder().uri("/v1/ws").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(server.registry().is_empty());
    }

    #[tokio::test]
    async fn health_reports_shutdown() {
        let server = make_server();
        server.shutdown().shutdown();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(body_json(resp).await["status"], "shutting_down");
    }

    #[tokio::test]
    async fn custom_ws_path_is_routed() {
        let config = ServerConfig {
            ws_path: "/socket".into(),
            ..ServerConfig::default()
        };
        let server = Server::new(config, Noop);
        let req = Request::builder().uri("/v1/ws").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn server_time_is_recent() {
        let server = make_server();
        let now = chrono::Utc::now().timestamp() as f64;
        assert!((now - server.server_time()).abs() < 60.0);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port_and_shuts_down() {
        let handle = make_server().listen().await.unwrap();
        assert_ne!(handle.port(), 0);
        assert!(handle.registry().is_empty());
        assert!(handle.shutdown().await);
    }
}
