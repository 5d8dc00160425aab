//! Failure taxonomy and the default failure → reply mapping.

use std::fmt;

use serde_json::{json, Map, Value};
use thiserror::Error;

/// A failure that knows how to present itself to the client.
///
/// Replies built from these carry the rendering under `error` and
/// [`kind`](Self::kind) under `error_code`.
pub trait RenderableError: std::error::Error + Send + Sync + 'static {
    /// Short kind name reported as `error_code`.
    fn kind(&self) -> &str;

    /// Client-facing rendering.
    fn render(&self) -> Value;
}

/// Deliberate short-circuit carrying an HTTP-style status and a client-facing error.
#[derive(Clone, Debug, PartialEq)]
pub struct Finished {
    /// HTTP-style status code.
    pub status: u16,
    /// Client-facing error payload.
    pub error: Value,
    /// Additional fields rendered alongside `status` and `error`.
    pub extra: Map<String, Value>,
}

impl Finished {
    /// Short-circuit with `status` and `error` and no extra fields.
    pub fn new(status: u16, error: impl Into<Value>) -> Self {
        Self {
            status,
            error: error.into(),
            extra: Map::new(),
        }
    }

    /// Add a field rendered next to `status` and `error`.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.extra.insert(key.into(), value.into());
        self
    }

    /// Reply payload: the extra fields plus `status` and `error`.
    pub fn render(&self) -> Value {
        let mut rendered = self.extra.clone();
        let _ = rendered.insert("status".into(), json!(self.status));
        let _ = rendered.insert("error".into(), self.error.clone());
        Value::Object(rendered)
    }
}

impl fmt::Display for Finished {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Value::String(error) => write!(f, "finished with status {}: {error}", self.status),
            other => write!(f, "finished with status {}: {other}", self.status),
        }
    }
}

impl std::error::Error for Finished {}

/// Anything a message processor can fail with.
#[derive(Debug, Error)]
pub enum Failure {
    /// Classified outcome; rendered verbatim and never logged as unexpected.
    #[error(transparent)]
    Finished(#[from] Finished),
    /// Failure with its own rendering.
    #[error("{0}")]
    Rendered(Box<dyn RenderableError>),
    /// Everything else. Logged, and hidden from the client behind a generic 500.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl Failure {
    /// Shorthand for a [`Finished`] failure.
    pub fn finished(status: u16, error: impl Into<Value>) -> Self {
        Self::Finished(Finished::new(status, error))
    }

    /// Wrap a failure that renders itself.
    pub fn rendered(error: impl RenderableError) -> Self {
        Self::Rendered(Box::new(error))
    }

    /// Wrap an unclassified failure.
    pub fn unexpected(error: impl Into<anyhow::Error>) -> Self {
        Self::Unexpected(error.into())
    }

    /// Kind name, used as `error_code` where one is reported.
    pub fn kind(&self) -> &str {
        match self {
            Self::Finished(_) => "Finished",
            Self::Rendered(error) => error.kind(),
            Self::Unexpected(_) => "Error",
        }
    }

    /// Whether this failure is hidden behind the generic 500.
    pub fn is_unexpected(&self) -> bool {
        matches!(self, Self::Unexpected(_))
    }
}

/// Default failure → reply payload mapping.
pub fn default_failure_reply(failure: &Failure) -> Value {
    match failure {
        Failure::Rendered(error) => json!({
            "error": error.render(),
            "error_code": error.kind(),
        }),
        Failure::Finished(finished) => finished.render(),
        Failure::Unexpected(_) => json!({
            "error": "Internal Server Error",
            "error_code": "InternalServerError",
            "status": 500,
        }),
    }
}
