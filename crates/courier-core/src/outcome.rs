//! Terminal results of a message and how they render.

use std::fmt;

use serde_json::{json, Value};

use crate::failure::Failure;

/// Payload sent when a processor returns [`Outcome::Closing`].
pub fn closing_reply() -> Value {
    json!({"closing": "goodbye"})
}

/// A result type with its own JSON rendering.
pub trait Renderable: Send + Sync {
    /// Reply payload for this result.
    fn render(&self) -> Value;

    /// Failure carried by an otherwise successful result. Reported to the
    /// observation hooks; never changes what the client receives.
    fn failure(&self) -> Option<&Failure> {
        None
    }
}

/// Successful return of a message processor.
pub enum Outcome {
    /// Already JSON; sent as-is.
    Value(Value),
    /// Sent as whatever [`Renderable::render`] produces.
    Rendered(Box<dyn Renderable>),
    /// Reply `{"closing": "goodbye"}` and then close the connection.
    Closing,
}

impl Outcome {
    /// Wrap a [`Renderable`] result.
    pub fn rendered(result: impl Renderable + 'static) -> Self {
        Self::Rendered(Box::new(result))
    }

    /// Fallback for results that are neither JSON nor renderable.
    pub fn text(result: impl fmt::Display) -> Self {
        Self::Value(Value::String(result.to_string()))
    }

    /// Reply payload sent to the client.
    pub fn render(&self) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::Rendered(result) => result.render(),
            Self::Closing => closing_reply(),
        }
    }

    /// Failure carried by a rendered result, if any.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Rendered(result) => result.failure(),
            Self::Value(_) | Self::Closing => None,
        }
    }

    /// Whether the connection closes after this reply.
    pub fn is_closing(&self) -> bool {
        matches!(self, Self::Closing)
    }
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Rendered(result) => f.debug_tuple("Rendered").field(&result.render()).finish(),
            Self::Closing => f.write_str("Closing"),
        }
    }
}
