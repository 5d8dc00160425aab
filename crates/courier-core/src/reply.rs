//! Outbound reply frames.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::envelope::TICK_PATH;

/// `message_id` of the handshake frame announcing the server start time.
pub const SERVER_TIME_ID: &str = "__server_time__";

/// One server→client frame: `{ message_id, reply }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Id of the message this answers; `None` serializes as null.
    pub message_id: Option<String>,
    /// Reply payload.
    pub reply: Value,
}

impl Reply {
    /// Reply attributed to `message_id`.
    pub fn new(message_id: impl Into<String>, reply: Value) -> Self {
        Self {
            message_id: Some(message_id.into()),
            reply,
        }
    }

    /// Acknowledgement for a `__tick__` envelope.
    pub fn tick() -> Self {
        Self::new(TICK_PATH, json!({"ok": "thankyou"}))
    }

    /// Intermediate reply wrapping one transformed progress value.
    pub fn progress(message_id: impl Into<String>, progress: Value) -> Self {
        Self::new(message_id, json!({ "progress": progress }))
    }

    /// Reply to a frame that could not be attributed to any message.
    pub fn unattributed(reply: Value) -> Self {
        Self {
            message_id: None,
            reply,
        }
    }

    /// Handshake frame announcing the server start time.
    pub fn server_time(server_time: f64) -> Self {
        Self::new(SERVER_TIME_ID, json!(server_time))
    }

    /// Serialize to the wire format.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_reply_shape() {
        let value = serde_json::to_value(Reply::tick()).unwrap();
        assert_eq!(value, json!({"message_id": "__tick__", "reply": {"ok": "thankyou"}}));
    }

    #[test]
    fn progress_reply_wraps_value() {
        let value = serde_json::to_value(Reply::progress("m1", json!("hello"))).unwrap();
        assert_eq!(value, json!({"message_id": "m1", "reply": {"progress": "hello"}}));
    }

    #[test]
    fn unattributed_reply_has_null_id() {
        let json = Reply::unattributed(json!({"error": "bad"})).to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert!(value["message_id"].is_null());
        assert_eq!(value["reply"]["error"], "bad");
    }

    #[test]
    fn server_time_reply() {
        let value = serde_json::to_value(Reply::server_time(12.5)).unwrap();
        assert_eq!(value, json!({"message_id": "__server_time__", "reply": 12.5}));
    }
}
