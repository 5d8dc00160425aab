//! Envelope validation and concurrent message execution.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use courier_core::{default_failure_reply, Envelope, Failure, Inbound, MessageKey, Reply};
use futures::FutureExt;
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use crate::connection::{ActiveMessage, ConnectionState};
use crate::handler::{panic_message, MessageContext, MessageDone, MessageHandler, Responder};

/// Routes inbound frames for one connection.
///
/// [`dispatch`](Self::dispatch) never waits on a message: every accepted
/// envelope runs as its own task on the connection's tracker.
pub struct Dispatcher {
    handler: Arc<dyn MessageHandler>,
    connection: Arc<ConnectionState>,
}

impl Dispatcher {
    /// Dispatcher for `connection` running messages through `handler`.
    pub fn new(handler: Arc<dyn MessageHandler>, connection: Arc<ConnectionState>) -> Self {
        Self {
            handler,
            connection,
        }
    }

    /// Connection this dispatcher serves.
    pub fn connection(&self) -> &Arc<ConnectionState> {
        &self.connection
    }

    /// Handle one raw frame. Returns the key of the spawned task, if any.
    pub fn dispatch(&self, raw: &[u8]) -> Option<MessageKey> {
        match Inbound::parse(raw) {
            Err(e) => {
                counter!("courier_invalid_envelopes_total").increment(1);
                debug!(connection_id = %self.connection.id(), error = %e, "rejected envelope");
                let _ = self
                    .connection
                    .send_reply(&Reply::unattributed(e.to_reply_payload()));
                None
            }
            Ok(Inbound::Tick) => {
                let _ = self.connection.send_reply(&Reply::tick());
                None
            }
            Ok(Inbound::Message(envelope)) => Some(self.spawn_message(envelope)),
        }
    }

    fn spawn_message(&self, envelope: Envelope) -> MessageKey {
        let key = MessageKey::new();
        let active = self.connection.track_message(key.clone());
        let responder = Responder::new(Arc::clone(&self.connection), Arc::clone(&self.handler));
        let _ = self
            .connection
            .spawn(run_message(responder, envelope, key.clone(), active));
        key
    }
}

/// Render a failure through the handler's override, falling back to the default mapping.
pub fn render_failure(handler: &dyn MessageHandler, failure: &Failure) -> Value {
    handler
        .failure_to_reply(failure)
        .unwrap_or_else(|| default_failure_reply(failure))
}

#[instrument(
    skip_all,
    fields(
        connection_id = %responder.connection().id(),
        message_id = %envelope.message_id,
        message_key = %key,
        path = %envelope.path,
    )
)]
async fn run_message(responder: Responder, envelope: Envelope, key: MessageKey, active: ActiveMessage) {
    let path = envelope.path.clone();
    counter!("courier_messages_total", "path" => path.clone()).increment(1);
    let start = Instant::now();

    let envelope = Arc::new(envelope);
    let ctx = MessageContext::new(Arc::clone(&envelope), key.clone(), responder.clone());
    let handler = Arc::clone(responder.handler());

    let result = AssertUnwindSafe(handler.process_message(&ctx))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            Err(Failure::unexpected(anyhow::anyhow!(
                "message processor panicked: {}",
                panic_message(panic.as_ref())
            )))
        });
    drop(ctx);

    let (reply, failure, closing) = match &result {
        Ok(outcome) => (outcome.render(), outcome.failure(), outcome.is_closing()),
        Err(failure) => {
            counter!("courier_message_failures_total", "kind" => failure.kind().to_owned())
                .increment(1);
            if failure.is_unexpected() {
                error!(error = %failure, "unexpected failure processing message");
            }
            (render_failure(handler.as_ref(), failure), Some(failure), false)
        }
    };
    drop(active);

    let done = MessageDone {
        envelope: &envelope,
        reply: &reply,
        message_key: &key,
        failure,
    };
    match panic::catch_unwind(AssertUnwindSafe(|| {
        handler.on_message_done(&done, responder.connection())
    })) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "message_done hook failed"),
        Err(panic) => error!(panic = panic_message(panic.as_ref()), "message_done hook panicked"),
    }

    if !responder.send(&envelope.message_id, reply, failure) {
        warn!("terminal reply discarded, transport gone");
    }

    if closing {
        responder.connection().close();
    }

    histogram!("courier_message_duration_seconds", "path" => path).record(start.elapsed().as_secs_f64());
}
