//! Per-connection state shared by the read loop and every message task.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use courier_core::{ConnectionId, MessageKey, Reply};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

/// Item on a connection's outbound queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// One serialized reply.
    Frame(String),
    /// Send a close frame and stop writing.
    Close,
}

/// One open socket.
pub struct ConnectionState {
    id: ConnectionId,
    /// Message keys of tasks that have started and not yet rendered a reply.
    active: Mutex<HashSet<MessageKey>>,
    closing: AtomicBool,
    /// Cancelled when the connection should stop reading.
    close_requested: CancellationToken,
    tasks: TaskTracker,
    tx: mpsc::UnboundedSender<Outbound>,
    connected_at: Instant,
    dropped_replies: AtomicU64,
}

impl ConnectionState {
    /// Connection with a fresh id writing to `tx`.
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self::with_id(ConnectionId::new(), tx)
    }

    /// Connection with a caller-chosen id.
    pub fn with_id(id: ConnectionId, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id,
            active: Mutex::new(HashSet::new()),
            closing: AtomicBool::new(false),
            close_requested: CancellationToken::new(),
            tasks: TaskTracker::new(),
            tx,
            connected_at: Instant::now(),
            dropped_replies: AtomicU64::new(0),
        }
    }

    /// Id of this connection.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Queue a reply for the writer.
    ///
    /// Returns `false` once the writer has gone away; the reply is discarded.
    pub fn send_reply(&self, reply: &Reply) -> bool {
        let json = match reply.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!(connection_id = %self.id, error = %e, "failed to serialize reply");
                return false;
            }
        };
        if self.tx.send(Outbound::Frame(json)).is_ok() {
            true
        } else {
            let _ = self.dropped_replies.fetch_add(1, Ordering::Relaxed);
            debug!(connection_id = %self.id, message_id = ?reply.message_id, "transport gone, reply discarded");
            false
        }
    }

    /// Replies discarded because the transport was already gone.
    pub fn dropped_replies(&self) -> u64 {
        self.dropped_replies.load(Ordering::Relaxed)
    }

    /// Record `key` as in flight until the returned guard is dropped.
    pub fn track_message(self: &Arc<Self>, key: MessageKey) -> ActiveMessage {
        let _ = self.active.lock().insert(key.clone());
        ActiveMessage {
            connection: Arc::clone(self),
            key,
        }
    }

    /// Whether `key` is still in flight.
    pub fn is_active(&self, key: &MessageKey) -> bool {
        self.active.lock().contains(key)
    }

    /// Snapshot of the in-flight message keys.
    pub fn active_message_keys(&self) -> Vec<MessageKey> {
        self.active.lock().iter().cloned().collect()
    }

    /// Number of in-flight messages.
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Stop accepting envelopes. Running tasks are left alone.
    pub fn close(&self) {
        if !self.closing.swap(true, Ordering::AcqRel) {
            debug!(connection_id = %self.id, "close requested");
        }
        self.close_requested.cancel();
    }

    /// Whether a close has been requested.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.close_requested.cancelled().await;
    }

    /// Run a message task on this connection.
    pub fn spawn<F>(&self, task: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task)
    }

    /// Number of spawned tasks that have not finished.
    pub fn running_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every task spawned on this connection. No new tasks may be
    /// spawned afterwards.
    pub async fn drain(&self) {
        let _ = self.tasks.close();
        self.tasks.wait().await;
    }

    /// Queue the close frame behind everything already queued.
    pub fn finish_writes(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    /// Time since the connection opened.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Guard holding a message key in its connection's active set.
pub struct ActiveMessage {
    connection: Arc<ConnectionState>,
    key: MessageKey,
}

impl ActiveMessage {
    /// The tracked key.
    pub fn key(&self) -> &MessageKey {
        &self.key
    }
}

impl Drop for ActiveMessage {
    fn drop(&mut self) {
        let _ = self.connection.active.lock().remove(&self.key);
    }
}
