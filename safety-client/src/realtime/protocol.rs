//! Realtime wire protocol
//!
//! Phoenix channel frames as spoken by the store's realtime service
//! (`vsn=1.0.0`, JSON text frames):
//!
//! ```text
//! {"topic": "realtime:<channel>", "event": "phx_join", "payload": {...},
//!  "ref": "1", "join_ref": "1"}
//! ```
//!
//! Row changes arrive as `postgres_changes` events whose `payload.data`
//! carries a [`ChangeEvent`].

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use shared::ChangeEvent;

use super::ChangeFilter;

/// Topic used for socket-level heartbeats
pub const PHOENIX_TOPIC: &str = "phoenix";

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_SYSTEM: &str = "system";
pub const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";

/// One Phoenix frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

/// Classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Reply to a message we sent (join, heartbeat, leave)
    Reply {
        msg_ref: Option<String>,
        ok: bool,
        response: Value,
    },
    /// Row change on the joined channel
    Change(ChangeEvent),
    /// Change notification whose payload could not be decoded; the change
    /// happened but its contents are unknown
    Unreadable(String),
    /// Channel-level failure; the subscription is no longer live
    ChannelError(String),
    /// Server closed the channel
    ChannelClosed,
    /// Presence, broadcast, informational system messages, foreign topics
    Other,
}

impl PhoenixMessage {
    /// Join request subscribing to every change on the filter's tables
    pub fn join(filter: &ChangeFilter, access_token: &str, msg_ref: &str) -> Self {
        let changes: Vec<Value> = filter
            .tables
            .iter()
            .map(|table| json!({"event": "*", "schema": filter.schema, "table": table}))
            .collect();

        Self {
            topic: filter.topic(),
            event: EVENT_JOIN.to_string(),
            payload: json!({
                "config": {
                    "broadcast": {"self": false},
                    "presence": {"key": ""},
                    "postgres_changes": changes,
                },
                "access_token": access_token,
            }),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: Some(msg_ref.to_string()),
        }
    }

    pub fn heartbeat(msg_ref: &str) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: EVENT_HEARTBEAT.to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: None,
        }
    }

    pub fn leave(topic: &str, msg_ref: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_LEAVE.to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: None,
        }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Interpret a frame received while joined to `topic`
    pub fn classify(&self, topic: &str) -> Inbound {
        if self.event == EVENT_REPLY {
            let ok = self.payload.get("status").and_then(Value::as_str) == Some("ok");
            return Inbound::Reply {
                msg_ref: self.msg_ref.clone(),
                ok,
                response: self.payload.get("response").cloned().unwrap_or(Value::Null),
            };
        }

        if self.topic != topic {
            return Inbound::Other;
        }

        match self.event.as_str() {
            EVENT_ERROR => Inbound::ChannelError(describe(&self.payload, "channel error")),
            EVENT_CLOSE => Inbound::ChannelClosed,
            EVENT_SYSTEM => {
                if self.payload.get("status").and_then(Value::as_str) == Some("error") {
                    Inbound::ChannelError(describe(&self.payload, "system error"))
                } else {
                    Inbound::Other
                }
            }
            EVENT_POSTGRES_CHANGES | "INSERT" | "UPDATE" | "DELETE" => {
                let data = self.payload.get("data").unwrap_or(&self.payload);
                match serde_json::from_value::<ChangeEvent>(data.clone()) {
                    Ok(event) => Inbound::Change(event),
                    Err(e) => {
                        tracing::warn!(event = %self.event, "Unreadable change payload: {}", e);
                        Inbound::Unreadable(e.to_string())
                    }
                }
            }
            _ => Inbound::Other,
        }
    }
}

fn describe(payload: &Value, fallback: &str) -> String {
    payload
        .get("message")
        .or_else(|| payload.get("reason"))
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}
