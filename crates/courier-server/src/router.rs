//! Path-based command table.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use courier_core::{Failure, Outcome};
use serde_json::Value;
use tracing::debug;

use crate::handler::{MessageContext, MessageHandler};

/// One operation reachable at a path.
#[async_trait]
pub trait Command: Send + Sync {
    /// Run the command for one message.
    async fn execute(&self, ctx: &MessageContext) -> Result<Outcome, Failure>;
}

/// Sees every reply the router sends.
pub trait ReplyObserver: Send + Sync {
    /// Observe one reply before it is sent. Errors are logged, never sent.
    fn process_reply(&self, reply: &Value, failure: Option<&Failure>) -> anyhow::Result<()>;
}

/// [`MessageHandler`] that looks the envelope path up in a fixed table.
pub struct CommandRouter {
    commands: HashMap<String, Arc<dyn Command>>,
    observer: Option<Arc<dyn ReplyObserver>>,
}

impl CommandRouter {
    /// Router with no commands and no observer.
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
            observer: None,
        }
    }

    /// Register a command. A later registration for the same path wins.
    pub fn register(&mut self, path: &str, command: impl Command + 'static) {
        let path = normalise_path(path);
        if self.commands.insert(path.to_owned(), Arc::new(command)).is_some() {
            debug!(path, "command replaced");
        }
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, path: &str, command: impl Command + 'static) -> Self {
        self.register(path, command);
        self
    }

    /// Feed every reply to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: impl ReplyObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Whether a command is registered for `path`.
    pub fn has_path(&self, path: &str) -> bool {
        self.commands.contains_key(normalise_path(path))
    }

    /// Registered paths (sorted).
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.commands.keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl Default for CommandRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageHandler for CommandRouter {
    async fn process_message(&self, ctx: &MessageContext) -> Result<Outcome, Failure> {
        let path = normalise_path(ctx.path());
        let Some(command) = self.commands.get(path) else {
            return Err(Failure::finished(404, format!("Unknown path: {}", ctx.path())));
        };
        command.execute(ctx).await
    }

    fn on_reply(&self, reply: &Value, failure: Option<&Failure>) -> anyhow::Result<()> {
        match &self.observer {
            Some(observer) => observer.process_reply(reply, failure),
            None => Ok(()),
        }
    }
}

/// Strip trailing slashes; the root path stays `/`.
pub fn normalise_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}
