//! Per-message progress channel.

use std::panic::Location;
use std::sync::Arc;

use courier_core::{Envelope, ProgressArgs, ProgressMessage};
use serde_json::json;
use tracing::debug;

use crate::handler::Responder;

/// Callback surface a processor uses to report progress.
///
/// Each call runs through [`MessageHandler::transform_progress`] and every
/// value it produces is sent immediately as `{ progress: value }` under the
/// message's id.
///
/// [`MessageHandler::transform_progress`]: crate::handler::MessageHandler::transform_progress
#[derive(Clone)]
pub struct ProgressChannel {
    responder: Responder,
    envelope: Arc<Envelope>,
}

impl ProgressChannel {
    /// Channel reporting progress for `envelope`.
    pub fn new(responder: Responder, envelope: Arc<Envelope>) -> Self {
        Self {
            responder,
            envelope,
        }
    }

    /// Report progress. Returns how many progress replies were produced.
    #[track_caller]
    pub fn send(&self, message: impl Into<ProgressMessage>) -> usize {
        self.send_with(message, ProgressArgs::default())
    }

    /// Report progress with extra arguments. Returns how many progress
    /// replies were produced.
    #[track_caller]
    pub fn send_with(&self, message: impl Into<ProgressMessage>, args: ProgressArgs) -> usize {
        let message = message.into();

        if args.do_log {
            let caller = Location::caller();
            debug!(
                message_id = %self.envelope.message_id,
                path = %self.envelope.path,
                caller = %caller,
                stack_extra = args.stack_extra,
                ?message,
                "progress"
            );
        }

        let values = self
            .responder
            .handler()
            .transform_progress(&self.envelope, &message, &args);
        let produced = values.len();
        for value in values {
            let _ = self.responder.send(
                &self.envelope.message_id,
                json!({ "progress": value }),
                None,
            );
        }
        produced
    }

    /// Report that the operation has finished its work.
    #[track_caller]
    pub fn done(&self) -> usize {
        self.send_with(ProgressMessage::Done, ProgressArgs::default())
    }
}
