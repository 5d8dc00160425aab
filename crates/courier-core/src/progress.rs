//! Progress messages and the default progress transform.

use serde_json::{Map, Value};

use crate::failure::{Failure, RenderableError};

/// What a processor reports through its progress channel.
#[derive(Debug)]
pub enum ProgressMessage {
    /// Free-form progress information.
    Info(Value),
    /// A non-terminal failure worth reporting.
    Failure(Failure),
    /// Reported with no payload; rendered as `{"done": true}`.
    Done,
}

impl ProgressMessage {
    /// The reported value, when this is an `Info`.
    pub fn info(&self) -> Option<&Value> {
        match self {
            Self::Info(value) => Some(value),
            Self::Failure(_) | Self::Done => None,
        }
    }
}

impl From<Value> for ProgressMessage {
    fn from(value: Value) -> Self {
        Self::Info(value)
    }
}

impl From<&str> for ProgressMessage {
    fn from(value: &str) -> Self {
        Self::Info(Value::String(value.to_owned()))
    }
}

impl From<String> for ProgressMessage {
    fn from(value: String) -> Self {
        Self::Info(Value::String(value))
    }
}

impl From<Failure> for ProgressMessage {
    fn from(failure: Failure) -> Self {
        Self::Failure(failure)
    }
}

/// Keyword arguments accompanying a progress call.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressArgs {
    /// Extra fields; the default transform merges them into the payload.
    pub fields: Map<String, Value>,
    /// Whether the progress event is logged. Never affects the payload.
    pub do_log: bool,
    /// Caller depth hint, recorded on the progress log event as-is.
    pub stack_extra: usize,
}

impl Default for ProgressArgs {
    fn default() -> Self {
        Self {
            fields: Map::new(),
            do_log: true,
            stack_extra: 0,
        }
    }
}

impl ProgressArgs {
    /// Defaults: no fields, logged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one field.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.fields.insert(key.into(), value.into());
        self
    }

    /// Do not log this progress event.
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.do_log = false;
        self
    }

    /// Set the caller depth hint.
    #[must_use]
    pub fn stack_extra(mut self, frames: usize) -> Self {
        self.stack_extra = frames;
        self
    }
}

/// Default progress transform: exactly one payload per call.
pub struct ProgressMessageMaker;

impl ProgressMessageMaker {
    /// Transform one progress call into its payloads.
    pub fn transform(message: &ProgressMessage, args: &ProgressArgs) -> Vec<Value> {
        vec![Self::make_info(message, args)]
    }

    /// Build the single payload for one progress call.
    pub fn make_info(message: &ProgressMessage, args: &ProgressArgs) -> Value {
        let mut info = Map::new();

        match message {
            ProgressMessage::Failure(failure) => {
                let _ = info.insert("error_code".into(), Value::String(failure.kind().to_owned()));
                let error = match failure {
                    Failure::Rendered(error) => RenderableError::render(error.as_ref()),
                    Failure::Finished(finished) => finished.render(),
                    Failure::Unexpected(error) => Value::String(error.to_string()),
                };
                let _ = info.insert("error".into(), error);
            }
            ProgressMessage::Done => {
                let _ = info.insert("done".into(), Value::Bool(true));
            }
            ProgressMessage::Info(value) => {
                let _ = info.insert("info".into(), value.clone());
            }
        }

        for (key, value) in &args.fields {
            let _ = info.insert(key.clone(), value.clone());
        }
        Value::Object(info)
    }
}
