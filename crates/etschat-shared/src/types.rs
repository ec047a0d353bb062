//! Strict domain models for the chat client.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be persisted
//! to the local cache and handed directly to the UI layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::LOCAL_ID_PREFIX;
use crate::time;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique within a conversation. Server-confirmed messages carry the
    /// server's id (or a `conversationId-timestamp` composite when the frame
    /// lacked one); optimistic local messages carry a `local-` prefixed id.
    pub id: String,
    /// Owning conversation.
    pub conversation_id: String,
    /// Sender's user id. Empty for system messages.
    #[serde(default)]
    pub sender_id: String,
    /// Raw message content.
    #[serde(default)]
    pub text: String,
    /// ISO-8601 timestamp; the source of ordering.
    pub timestamp: String,
    /// True only for client-originated messages not yet reconciled with a
    /// server echo.
    #[serde(default)]
    pub is_local: bool,
}

impl Message {
    /// Build an optimistic local echo for a message the user just sent.
    pub fn local_echo(conversation_id: &str, sender_id: &str, text: &str) -> Self {
        Self {
            id: format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            timestamp: time::now_rfc3339(),
            is_local: true,
        }
    }

    /// Timestamp resolved to epoch millis, zero when unparsable.
    pub fn epoch_millis(&self) -> i64 {
        time::epoch_millis_or_zero(&self.timestamp)
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Direct (one- or two-participant) vs. multi-party group.
///
/// Derived from the participant count, never trusted verbatim from the
/// server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Group,
}

/// A conversation as held by the client after normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    /// Display name; derived when the server-provided one is missing or
    /// synthetic.
    #[serde(default)]
    pub name: String,
    /// Normalized participant user ids (nulls dropped, coerced to string).
    #[serde(default)]
    pub participant_ids: Vec<String>,
    /// Only meaningful for groups.
    #[serde(default)]
    pub admin_ids: Vec<String>,
    /// Denormalized copy of the most recent message, for the sidebar
    /// preview and recency sort.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
}

impl Conversation {
    /// Epoch millis of the last known message, zero when absent/unparsable.
    pub fn last_message_millis(&self) -> i64 {
        self.last_message
            .as_ref()
            .map(|m| m.epoch_millis())
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A directory entry for a known user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// A user's online/offline status, propagated over the chat socket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Offline,
}

impl Presence {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "online" => Some(Self::Online),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }

    pub fn is_online(self) -> bool {
        self == Self::Online
    }
}

impl std::fmt::Display for Presence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}
