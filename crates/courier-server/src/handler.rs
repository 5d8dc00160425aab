//! The message processor seam and its lifecycle hooks.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use async_trait::async_trait;
use courier_core::{
    Envelope, Failure, MessageKey, Outcome, ProgressArgs, ProgressMessage, ProgressMessageMaker,
    Reply,
};
use serde_json::Value;
use tracing::error;

use crate::connection::ConnectionState;
use crate::progress::ProgressChannel;

/// Trait implemented by whatever actually performs operations.
///
/// Only [`process_message`](Self::process_message) is required; the hooks
/// default to the stock behaviour.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Run one message to completion.
    async fn process_message(&self, ctx: &MessageContext) -> Result<Outcome, Failure>;

    /// Turn one progress call into zero or more progress payloads.
    fn transform_progress(
        &self,
        _envelope: &Envelope,
        message: &ProgressMessage,
        args: &ProgressArgs,
    ) -> Vec<Value> {
        ProgressMessageMaker::transform(message, args)
    }

    /// Override the failure → reply mapping. `None` defers to
    /// [`courier_core::default_failure_reply`].
    fn failure_to_reply(&self, _failure: &Failure) -> Option<Value> {
        None
    }

    /// Called once per message after its reply is rendered and before it is
    /// sent. May close the connection.
    fn on_message_done(
        &self,
        _done: &MessageDone<'_>,
        _connection: &ConnectionState,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called for every progress, direct and terminal reply before it is sent.
    fn on_reply(&self, _reply: &Value, _failure: Option<&Failure>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Arguments of [`MessageHandler::on_message_done`].
#[derive(Debug)]
pub struct MessageDone<'a> {
    /// The envelope that was processed.
    pub envelope: &'a Envelope,
    /// Rendered terminal reply, not yet sent.
    pub reply: &'a Value,
    /// Key of the finished task.
    pub message_key: &'a MessageKey,
    /// Failure behind the reply, if any.
    pub failure: Option<&'a Failure>,
}

/// Sends replies on a connection, running them past [`MessageHandler::on_reply`] first.
#[derive(Clone)]
pub struct Responder {
    connection: Arc<ConnectionState>,
    handler: Arc<dyn MessageHandler>,
}

impl Responder {
    /// Responder sending on `connection`, observed by `handler`.
    pub fn new(connection: Arc<ConnectionState>, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            connection,
            handler,
        }
    }

    /// Connection replies are sent on.
    pub fn connection(&self) -> &Arc<ConnectionState> {
        &self.connection
    }

    /// Handler whose hooks observe every reply.
    pub fn handler(&self) -> &Arc<dyn MessageHandler> {
        &self.handler
    }

    /// Observe and send one reply. Returns `false` if the transport is gone.
    pub fn send(&self, message_id: &str, reply: Value, failure: Option<&Failure>) -> bool {
        match panic::catch_unwind(AssertUnwindSafe(|| self.handler.on_reply(&reply, failure))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(
                connection_id = %self.connection.id(),
                message_id,
                error = %e,
                "reply observer failed"
            ),
            Err(panic) => error!(
                connection_id = %self.connection.id(),
                message_id,
                panic = panic_message(panic.as_ref()),
                "reply observer panicked"
            ),
        }
        self.connection.send_reply(&Reply::new(message_id, reply))
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Everything a processor gets for one message.
pub struct MessageContext {
    envelope: Arc<Envelope>,
    message_key: MessageKey,
    progress: ProgressChannel,
    responder: Responder,
}

impl MessageContext {
    /// Context for one accepted envelope.
    pub fn new(envelope: Arc<Envelope>, message_key: MessageKey, responder: Responder) -> Self {
        let progress = ProgressChannel::new(responder.clone(), Arc::clone(&envelope));
        Self {
            envelope,
            message_key,
            progress,
            responder,
        }
    }

    /// The validated envelope.
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Requested path.
    pub fn path(&self) -> &str {
        &self.envelope.path
    }

    /// Request body, `{}` when none was sent.
    pub fn body(&self) -> &Value {
        &self.envelope.body
    }

    /// Client correlation token.
    pub fn message_id(&self) -> &str {
        &self.envelope.message_id
    }

    /// Server-generated key for this message, unique per task.
    pub fn message_key(&self) -> &MessageKey {
        &self.message_key
    }

    /// Progress channel for this message.
    pub fn progress(&self) -> &ProgressChannel {
        &self.progress
    }

    /// Connection the message arrived on.
    pub fn connection(&self) -> &Arc<ConnectionState> {
        self.responder.connection()
    }

    /// Send an arbitrary reply tagged with this message's id.
    pub fn reply(&self, reply: Value) -> bool {
        self.responder.send(&self.envelope.message_id, reply, None)
    }
}
