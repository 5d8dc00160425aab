//! Inbound envelope parsing and validation.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Path that marks a heartbeat envelope. Its `body` and `message_id` are ignored.
pub const TICK_PATH: &str = "__tick__";

/// A validated client request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Logical operation to run.
    pub path: String,
    /// Operation arguments; `{}` when the client sent none.
    pub body: Value,
    /// Client-chosen correlation token echoed on every reply.
    pub message_id: String,
}

/// What a single inbound frame turned out to be.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// `path == "__tick__"`.
    Tick,
    /// A request that should be handed to the message processor.
    Message(Envelope),
}

/// Reasons an inbound frame is rejected before any processing starts.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// The frame did not decode as JSON.
    #[error("message is not valid JSON: {0}")]
    InvalidJson(String),
    /// The frame decoded to something other than an object.
    #[error("message must be a JSON object")]
    NotAnObject,
    /// `path` absent or null.
    #[error("message has no path")]
    MissingPath,
    /// `path` present but not a string.
    #[error("path must be a string")]
    PathNotString,
    /// `message_id` absent or null.
    #[error("message has no message_id")]
    MissingMessageId,
    /// `message_id` present but not a string.
    #[error("message_id must be a string")]
    MessageIdNotString,
}

impl EnvelopeError {
    /// Reply payload sent back (with a null `message_id`) for a rejected frame.
    pub fn to_reply_payload(&self) -> Value {
        json!({
            "error": self.to_string(),
            "error_code": "InvalidMessage",
            "status": 400,
        })
    }
}

impl Inbound {
    /// Decode and validate one raw frame. Text and binary frames go through here alike.
    pub fn parse(raw: &[u8]) -> Result<Self, EnvelopeError> {
        let value: Value =
            serde_json::from_slice(raw).map_err(|e| EnvelopeError::InvalidJson(e.to_string()))?;
        Self::from_value(value)
    }

    /// Validate an already-decoded frame.
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let Value::Object(mut map) = value else {
            return Err(EnvelopeError::NotAnObject);
        };

        let path = match map.remove("path") {
            None | Some(Value::Null) => return Err(EnvelopeError::MissingPath),
            Some(Value::String(path)) => path,
            Some(_) => return Err(EnvelopeError::PathNotString),
        };

        if path == TICK_PATH {
            return Ok(Self::Tick);
        }

        let message_id = match map.remove("message_id") {
            None | Some(Value::Null) => return Err(EnvelopeError::MissingMessageId),
            Some(Value::String(id)) => id,
            Some(_) => return Err(EnvelopeError::MessageIdNotString),
        };

        let body = match map.remove("body") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(body) => body,
        };

        Ok(Self::Message(Envelope {
            path,
            body,
            message_id,
        }))
    }
}
