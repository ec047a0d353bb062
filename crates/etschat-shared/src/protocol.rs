//! Wire protocol for the chat socket gateway.
//!
//! Outbound traffic is a small set of JSON action frames. Inbound traffic is
//! looser: chat messages and presence updates share one channel, and
//! presence can arrive as a proper object, as a JSON-encoded string nested
//! inside another field, or as a legacy `STATUS|online|userId` pattern.
//! [`decode_frame`] sorts all of that out before anything reaches a
//! listener.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Presence;

// ---------------------------------------------------------------------------
// Outbound action frames
// ---------------------------------------------------------------------------

/// Frames the client sends to the gateway.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ActionFrame {
    #[serde(rename_all = "camelCase")]
    SendMessage {
        conversation_id: String,
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ConversationCleared { conversation_id: String },
    #[serde(rename_all = "camelCase")]
    ConversationDeleted { conversation_id: String },
    #[serde(rename_all = "camelCase")]
    StatusUpdate { user_id: String, status: Presence },
}

impl ActionFrame {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

/// A decoded inbound frame, tagged for fan-out.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// A presence update for a user.
    Status { user_id: String, status: Presence },
    /// Anything that is not a presence update is treated as a chat message.
    Chat(ChatFrame),
}

/// The loosely-shaped body of an inbound chat frame.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatFrame {
    pub id: Option<String>,
    pub action: Option<String>,
    #[serde(alias = "conversation_id")]
    pub conversation_id: Option<String>,
    #[serde(alias = "sender_id", alias = "sender")]
    pub sender_id: Option<String>,
    #[serde(alias = "content", alias = "message")]
    pub text: Option<String>,
    pub timestamp: Option<Value>,
}

impl ChatFrame {
    /// Reshape into the loose message DTO so the normal message boundary
    /// (id fallback, timestamp validation) applies to socket frames too.
    pub fn to_raw_message(&self) -> crate::dto::RawMessage {
        crate::dto::RawMessage {
            id: self.id.clone(),
            conversation_id: self.conversation_id.clone(),
            sender_id: self.sender_id.clone(),
            text: self.text.clone(),
            timestamp: self.timestamp.clone(),
            is_local: false,
        }
    }
}

/// Decode a raw text frame from the gateway.
///
/// Returns `None` for frames that do not parse as JSON; the caller logs and
/// drops them without invoking any listener.
pub fn decode_frame(raw: &str) -> Option<SocketEvent> {
    let value: Value = serde_json::from_str(raw).ok()?;
    if let Some(event) = decode_status(&value) {
        return Some(event);
    }
    serde_json::from_value::<ChatFrame>(value)
        .ok()
        .map(SocketEvent::Chat)
}

/// Try every place a presence update can hide.
fn decode_status(value: &Value) -> Option<SocketEvent> {
    if let Some(event) = status_from_value(value) {
        return Some(event);
    }
    // The whole frame may itself be a bare pattern string.
    if let Some(s) = value.as_str() {
        return status_from_string(s);
    }
    for field in ["status", "payload", "text"] {
        let Some(nested) = value.get(field) else {
            continue;
        };
        if let Some(event) = status_from_value(nested) {
            return Some(event);
        }
        if let Some(s) = nested.as_str() {
            if let Some(event) = status_from_string(s) {
                return Some(event);
            }
        }
    }
    None
}

/// `{type: "status", userId, status: "online"|"offline"}`.
fn status_from_value(value: &Value) -> Option<SocketEvent> {
    let obj = value.as_object()?;
    if obj.get("type").and_then(Value::as_str) != Some("status") {
        return None;
    }
    let user_id = obj.get("userId").and_then(Value::as_str)?;
    let status = Presence::parse(obj.get("status").and_then(Value::as_str)?)?;
    if user_id.is_empty() {
        return None;
    }
    Some(SocketEvent::Status {
        user_id: user_id.to_string(),
        status,
    })
}

/// A string field holding either a JSON-encoded status object or a
/// `STATUS[_UPDATE]` pattern with `:` or `|` separators.
fn status_from_string(s: &str) -> Option<SocketEvent> {
    let trimmed = s.trim();
    if let Ok(nested) = serde_json::from_str::<Value>(trimmed) {
        if let Some(event) = status_from_value(&nested) {
            return Some(event);
        }
    }
    let sep = if trimmed.contains('|') { '|' } else { ':' };
    let mut parts = trimmed.splitn(3, sep);
    let tag = parts.next()?.trim().to_uppercase();
    if tag != "STATUS" && tag != "STATUS_UPDATE" {
        return None;
    }
    let status = Presence::parse(parts.next()?)?;
    let user_id = parts.next()?.trim();
    if user_id.is_empty() {
        return None;
    }
    Some(SocketEvent::Status {
        user_id: user_id.to_string(),
        status,
    })
}
