//! WebSocket connection lifecycle: split, read, dispatch, drain, close.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use courier_core::{ConnectionId, Reply};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::connection::{ConnectionState, Outbound};
use crate::dispatch::Dispatcher;
use crate::handler::MessageHandler;
use crate::registry::ConnectionRegistry;

/// Per-socket knobs taken from the server config.
#[derive(Clone, Debug)]
pub struct ConnectionOptions {
    /// Seconds since the epoch to announce on open, if any.
    pub server_time: Option<f64>,
    /// Interval between transport-level pings.
    pub heartbeat_interval: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            server_time: None,
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// A connection registered ahead of its socket upgrade.
///
/// A shutdown that starts while the upgrade is in progress still waits for
/// it. Dropping it unserved deregisters the connection.
pub struct PendingConnection {
    connection: Arc<ConnectionState>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    registration: Registration,
}

/// Removes the connection from the registry on drop.
struct Registration {
    registry: Arc<ConnectionRegistry>,
    id: ConnectionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let _ = self.registry.remove(&self.id);
    }
}

impl PendingConnection {
    /// Create the connection state and register it.
    pub fn register(registry: Arc<ConnectionRegistry>) -> Self {
        let (tx, outbound) = mpsc::unbounded_channel();
        let connection = Arc::new(ConnectionState::new(tx));
        registry.register(Arc::clone(&connection));
        Self {
            registration: Registration {
                registry,
                id: connection.id().clone(),
            },
            connection,
            outbound,
        }
    }

    /// State of the registered connection.
    pub fn connection(&self) -> &Arc<ConnectionState> {
        &self.connection
    }

    /// Serve the upgraded socket until it closes.
    ///
    /// The connection stays registered until every message task it spawned
    /// has finished and its final replies have been flushed.
    pub async fn serve(
        self,
        socket: WebSocket,
        handler: Arc<dyn MessageHandler>,
        options: ConnectionOptions,
        shutdown: CancellationToken,
    ) {
        let (ws_tx, ws_rx) = socket.split();
        self.run(ws_tx, ws_rx, handler, options, shutdown).await;
    }

    async fn run<Tx, Rx>(
        self,
        ws_tx: Tx,
        ws_rx: Rx,
        handler: Arc<dyn MessageHandler>,
        options: ConnectionOptions,
        shutdown: CancellationToken,
    ) where
        Tx: Sink<WsMessage> + Unpin + Send + 'static,
        Tx::Error: Send,
        Rx: Stream<Item = Result<WsMessage, axum::Error>> + Unpin,
    {
        let Self {
            connection,
            outbound,
            registration,
        } = self;
        info!(connection_id = %connection.id(), "connection opened");

        let writer = tokio::spawn(write_loop(
            ws_tx,
            outbound,
            options.heartbeat_interval,
            connection.id().to_string(),
        ));

        if let Some(server_time) = options.server_time {
            let _ = connection.send_reply(&Reply::server_time(server_time));
        }

        let dispatcher = Dispatcher::new(handler, Arc::clone(&connection));
        read_loop(ws_rx, &dispatcher, &shutdown).await;

        connection.close();
        let in_flight = connection.running_tasks();
        if in_flight > 0 {
            debug!(connection_id = %connection.id(), in_flight, "draining message tasks");
        }
        connection.drain().await;
        connection.finish_writes();
        if let Err(e) = writer.await {
            warn!(connection_id = %connection.id(), error = %e, "writer task failed");
        }

        drop(registration);
        info!(
            connection_id = %connection.id(),
            age_secs = connection.age().as_secs_f64(),
            dropped_replies = connection.dropped_replies(),
            "connection closed"
        );
    }
}

async fn read_loop<S>(mut ws_rx: S, dispatcher: &Dispatcher, shutdown: &CancellationToken)
where
    S: Stream<Item = Result<WsMessage, axum::Error>> + Unpin,
{
    let connection = Arc::clone(dispatcher.connection());
    loop {
        // Close and shutdown win over frames that are already buffered.
        let msg = tokio::select! {
            biased;
            () = connection.closed() => break,
            () = shutdown.cancelled() => {
                debug!(connection_id = %connection.id(), "server shutting down, closing connection");
                break;
            }
            msg = ws_rx.next() => msg,
        };

        // A message task may have closed the connection since the select.
        if connection.is_closing() {
            break;
        }

        match msg {
            Some(Ok(WsMessage::Text(text))) => {
                let _ = dispatcher.dispatch(text.as_str().as_bytes());
            }
            Some(Ok(WsMessage::Binary(data))) => {
                let _ = dispatcher.dispatch(&data);
            }
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {}
            Some(Err(e)) => {
                debug!(connection_id = %connection.id(), error = %e, "read failed");
                break;
            }
        }
    }
}

async fn write_loop<S>(
    mut ws_tx: S,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    heartbeat_interval: Duration,
    connection_id: String,
) where
    S: Sink<WsMessage> + Unpin,
{
    let mut ping_interval = tokio::time::interval(heartbeat_interval);
    // First tick fires immediately.
    let _ = ping_interval.tick().await;

    loop {
        tokio::select! {
            item = rx.recv() => match item {
                Some(Outbound::Frame(text)) => {
                    if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                        debug!(connection_id, "socket write failed, writer stopping");
                        break;
                    }
                }
                Some(Outbound::Close) => {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                }
                None => break,
            },
            _ = ping_interval.tick() => {
                if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                trace!(connection_id, "sent ping");
            }
        }
    }

    // Anything queued after the socket went away is discarded by the sender.
    rx.close();
    let _ = ws_tx.close().await;
}
