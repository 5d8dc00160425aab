//! # courier-server
//!
//! Per-connection concurrent message dispatch over WebSocket.
//!
//! - Envelope validation and the `__tick__` heartbeat short-circuit
//! - One task per accepted message; progress and terminal replies streamed back as they are ready
//! - Connection registry that only forgets a connection once its tasks have drained
//! - Graceful shutdown that waits for every registered connection

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod handler;
pub mod health;
pub mod progress;
pub mod registry;
pub mod router;
pub mod server;
pub mod settings;
pub mod shutdown;
pub mod socket;

pub use config::{CourierSettings, LoggingSettings, ServerConfig};
pub use connection::{ConnectionState, Outbound};
pub use dispatch::{render_failure, Dispatcher};
pub use handler::{MessageContext, MessageDone, MessageHandler, Responder};
pub use progress::ProgressChannel;
pub use registry::{wait_for_connections, ConnectionRegistry};
pub use router::{Command, CommandRouter, ReplyObserver};
pub use health::HealthResponse;
pub use server::{AppState, Server, ServerError, ServerHandle};
pub use settings::{apply_env_overrides, deep_merge, load_settings_from_path, SettingsError};
pub use shutdown::ShutdownCoordinator;
pub use socket::{ConnectionOptions, PendingConnection};
