//! # courier-core
//!
//! Protocol model for the courier message dispatcher. Nothing in here does
//! I/O: it parses envelopes, builds replies, and maps failures onto reply
//! payloads.

pub mod envelope;
pub mod failure;
pub mod ids;
pub mod outcome;
pub mod progress;
pub mod reply;

pub use envelope::{Envelope, EnvelopeError, Inbound, TICK_PATH};
pub use failure::{default_failure_reply, Failure, Finished, RenderableError};
pub use ids::{ConnectionId, MessageKey};
pub use outcome::{closing_reply, Outcome, Renderable};
pub use progress::{ProgressArgs, ProgressMessage, ProgressMessageMaker};
pub use reply::{Reply, SERVER_TIME_ID};
