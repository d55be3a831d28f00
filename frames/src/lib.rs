//! Shared frame model and JSON codec for the realtime change-feed.
//!
//! The hosted change-feed speaks channel frames over a websocket: every
//! message names a `topic`, an `event`, a free-form `payload`, and the
//! optional `ref`/`join_ref` correlation ids. This crate owns that wire
//! representation so the backend adapter and its tests agree on it, and it
//! lifts `postgres_changes` frames into a typed [`ChangeEvent`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Topic used for connection-level heartbeats.
pub const PHOENIX_TOPIC: &str = "phoenix";

/// Event names the change-feed protocol uses.
pub mod event {
    pub const JOIN: &str = "phx_join";
    pub const LEAVE: &str = "phx_leave";
    pub const REPLY: &str = "phx_reply";
    pub const ERROR: &str = "phx_error";
    pub const CLOSE: &str = "phx_close";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const POSTGRES_CHANGES: &str = "postgres_changes";
    pub const SYSTEM: &str = "system";
    pub const ACCESS_TOKEN: &str = "access_token";
}

/// Error returned by [`decode_frame`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text could not be parsed as a JSON frame.
    #[error("failed to decode frame: {0}")]
    Json(#[from] serde_json::Error),
    /// The JSON value was valid but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,
}

/// A single message on the change-feed websocket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Channel topic, e.g. `"realtime:bookmarks-changes"`.
    pub topic: String,
    /// Event name, e.g. `"phx_join"` or `"postgres_changes"`.
    pub event: String,
    /// Arbitrary JSON payload.
    #[serde(default = "empty_object")]
    pub payload: Value,
    /// Correlation id for request/reply pairs.
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    /// Correlation id of the join that opened the channel.
    #[serde(default)]
    pub join_ref: Option<String>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Outcome carried by a `phx_reply` frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyStatus {
    Ok,
    Error,
}

/// Kind of row-level change announced by the feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    /// Parse a change kind from its wire name, ignoring case.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// A row-level change notification. Carries no row data: consumers treat it
/// as a signal that their copy of the table may be stale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub schema: String,
    pub table: String,
    pub commit_timestamp: Option<String>,
}

impl Frame {
    /// Build a frame with no correlation ids.
    #[must_use]
    pub fn new(topic: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
        Self { topic: topic.into(), event: event.into(), payload, reference: None, join_ref: None }
    }

    /// Status of a `phx_reply` frame, `None` for any other event.
    #[must_use]
    pub fn reply_status(&self) -> Option<ReplyStatus> {
        if self.event != event::REPLY {
            return None;
        }
        match self.payload.get("status").and_then(Value::as_str) {
            Some("ok") => Some(ReplyStatus::Ok),
            Some(_) => Some(ReplyStatus::Error),
            None => None,
        }
    }

    /// Lift a `postgres_changes` frame into a [`ChangeEvent`].
    ///
    /// Change details normally sit under `payload.data`; older servers put
    /// them directly on the payload, so both shapes are accepted.
    #[must_use]
    pub fn change_event(&self) -> Option<ChangeEvent> {
        if self.event != event::POSTGRES_CHANGES {
            return None;
        }
        let data = self.payload.get("data").unwrap_or(&self.payload);
        let kind = data
            .get("type")
            .or_else(|| data.get("eventType"))
            .and_then(Value::as_str)
            .and_then(ChangeKind::parse)?;
        let field = |key: &str| data.get(key).and_then(Value::as_str).map(ToOwned::to_owned);

        Some(ChangeEvent {
            kind,
            schema: field("schema").unwrap_or_default(),
            table: field("table").unwrap_or_default(),
            commit_timestamp: field("commit_timestamp"),
        })
    }
}

/// Encode a frame as JSON text.
#[must_use]
pub fn encode_frame(frame: &Frame) -> String {
    // Serializing a struct of strings and a `Value` cannot fail.
    serde_json::to_string(frame).unwrap_or_default()
}

/// Decode JSON text into a frame.
///
/// # Errors
///
/// Returns [`CodecError::NotAnObject`] when the text is valid JSON of the
/// wrong shape and [`CodecError::Json`] for anything unparsable.
pub fn decode_frame(text: &str) -> Result<Frame, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(CodecError::NotAnObject);
    }
    Ok(serde_json::from_value(value)?)
}

/// Change subscription filter for one table, as sent in a join config.
#[must_use]
pub fn postgres_changes_config(schema: &str, table: &str, event_filter: &str) -> Value {
    serde_json::json!({
        "broadcast": { "ack": false, "self": false },
        "presence": { "key": "" },
        "postgres_changes": [
            { "event": event_filter, "schema": schema, "table": table }
        ],
    })
}

/// Join request for `topic`. `join_ref` doubles as the request `ref`.
#[must_use]
pub fn join_frame(topic: &str, join_ref: &str, config: Value, access_token: Option<&str>) -> Frame {
    let mut payload = Map::new();
    payload.insert("config".to_owned(), config);
    if let Some(token) = access_token {
        payload.insert("access_token".to_owned(), Value::String(token.to_owned()));
    }
    Frame {
        topic: topic.to_owned(),
        event: event::JOIN.to_owned(),
        payload: Value::Object(payload),
        reference: Some(join_ref.to_owned()),
        join_ref: Some(join_ref.to_owned()),
    }
}

/// Leave request for `topic`.
#[must_use]
pub fn leave_frame(topic: &str, reference: &str, join_ref: Option<&str>) -> Frame {
    Frame {
        topic: topic.to_owned(),
        event: event::LEAVE.to_owned(),
        payload: empty_object(),
        reference: Some(reference.to_owned()),
        join_ref: join_ref.map(ToOwned::to_owned),
    }
}

/// Hand a refreshed access token to an already joined channel.
#[must_use]
pub fn access_token_frame(topic: &str, reference: &str, join_ref: Option<&str>, token: &str) -> Frame {
    Frame {
        topic: topic.to_owned(),
        event: event::ACCESS_TOKEN.to_owned(),
        payload: serde_json::json!({ "access_token": token }),
        reference: Some(reference.to_owned()),
        join_ref: join_ref.map(ToOwned::to_owned),
    }
}

/// Connection keep-alive on the `phoenix` topic.
#[must_use]
pub fn heartbeat_frame(reference: &str) -> Frame {
    Frame {
        topic: PHOENIX_TOPIC.to_owned(),
        event: event::HEARTBEAT.to_owned(),
        payload: empty_object(),
        reference: Some(reference.to_owned()),
        join_ref: None,
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
