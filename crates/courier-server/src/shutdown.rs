//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::registry::{wait_for_connections, ConnectionRegistry};

/// Default timeout for draining connections before giving up.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinates graceful shutdown across the listener and every connection.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Coordinator that has not started shutting down.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop every connection and wait for them to drain.
    ///
    /// 1. Cancel the shutdown token (connections stop reading)
    /// 2. Wait up to `timeout` for the registry to empty
    ///
    /// Returns `false` if connections were still open when the timeout hit.
    pub async fn graceful_shutdown(
        &self,
        registry: &ConnectionRegistry,
        timeout: Option<Duration>,
    ) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        info!(
            connections = registry.len(),
            timeout_secs = timeout.as_secs(),
            "shutting down"
        );
        wait_for_connections(registry, Some(timeout)).await
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
