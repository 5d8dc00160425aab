//! Demo commands served by the `courier` binary.

use std::time::Duration;

use async_trait::async_trait;
use courier_core::{Failure, Outcome};
use courier_server::{Command, CommandRouter, MessageContext};
use serde_json::json;

/// Router with every demo command registered.
pub fn demo_router() -> CommandRouter {
    CommandRouter::new()
        .with("/echo", Echo)
        .with("/sleep", Sleep)
        .with("/fail", Fail)
        .with("/goodbye", Goodbye)
}

/// Replies with the request body.
pub struct Echo;

#[async_trait]
impl Command for Echo {
    async fn execute(&self, ctx: &MessageContext) -> Result<Outcome, Failure> {
        Ok(ctx.body().clone().into())
    }
}

/// Reports progress, then sleeps for `seconds`.
pub struct Sleep;

#[async_trait]
impl Command for Sleep {
    async fn execute(&self, ctx: &MessageContext) -> Result<Outcome, Failure> {
        let seconds = ctx.body()["seconds"].as_f64().unwrap_or(1.0);
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(Failure::finished(400, "seconds must be a non-negative number"));
        }
        let _ = ctx.progress().send(json!({"sleeping": seconds}));
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        let _ = ctx.progress().done();
        Ok(json!({"slept": seconds}).into())
    }
}

/// Fails with the `status` and `error` given in the body.
pub struct Fail;

#[async_trait]
impl Command for Fail {
    async fn execute(&self, ctx: &MessageContext) -> Result<Outcome, Failure> {
        let status = ctx.body()["status"]
            .as_u64()
            .and_then(|s| u16::try_from(s).ok())
            .unwrap_or(400);
        let error = match ctx.body().get("error") {
            Some(error) if !error.is_null() => error.clone(),
            _ => json!("failed on request"),
        };
        Err(Failure::finished(status, error))
    }
}

/// Replies, then closes the connection.
pub struct Goodbye;

#[async_trait]
impl Command for Goodbye {
    async fn execute(&self, _ctx: &MessageContext) -> Result<Outcome, Failure> {
        Ok(Outcome::Closing)
    }
}
