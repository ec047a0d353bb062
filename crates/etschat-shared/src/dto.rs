//! Loose server DTOs and the single normalization boundary.
//!
//! The REST endpoints and the socket gateway are not strict about field
//! presence or naming, so the raw shapes here accept every variant observed
//! in the wild (missing ids, numeric timestamps, `content` vs `text`).
//! Conversion into the strict [`crate::types`] models happens exactly once,
//! here; nothing downstream sees an `Option` where the domain has a value.

use serde::Deserialize;
use serde_json::Value;

use crate::types::{Conversation, ConversationKind, Message, User};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A message as the server may deliver it, over REST or the socket.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawMessage {
    pub id: Option<String>,
    #[serde(alias = "conversation_id")]
    pub conversation_id: Option<String>,
    #[serde(alias = "sender_id", alias = "sender")]
    pub sender_id: Option<String>,
    #[serde(alias = "content", alias = "message")]
    pub text: Option<String>,
    /// String (ISO-8601) or number (epoch millis), depending on the source.
    pub timestamp: Option<Value>,
    #[serde(alias = "is_local")]
    pub is_local: bool,
}

impl RawMessage {
    /// The timestamp as a string, preserving whichever representation the
    /// server used. Numeric epochs stay numeric; `time::parse_epoch_millis`
    /// handles both downstream.
    pub fn timestamp_string(&self) -> Option<String> {
        match self.timestamp.as_ref()? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Convert into a strict [`Message`].
    ///
    /// Returns `None` for records with no usable conversation id or
    /// timestamp; such entries are malformed and get filtered out at the
    /// boundary. A missing message id is derived deterministically as
    /// `conversationId-timestamp` so redelivered frames produce the same id.
    pub fn into_message(self, fallback_conversation: Option<&str>) -> Option<Message> {
        let timestamp = self.timestamp_string()?;
        let conversation_id = self
            .conversation_id
            .filter(|c| !c.trim().is_empty())
            .or_else(|| fallback_conversation.map(str::to_string))?;
        let id = match self.id.filter(|i| !i.trim().is_empty()) {
            Some(id) => id,
            None => format!("{conversation_id}-{timestamp}"),
        };
        Some(Message {
            id,
            conversation_id,
            sender_id: self.sender_id.unwrap_or_default(),
            text: self.text.unwrap_or_default(),
            timestamp,
            is_local: self.is_local,
        })
    }
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

/// A conversation record as returned by the server.
///
/// The `type` field is untrusted; classification is re-derived from the
/// participant count by the normalizer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawConversation {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
    #[serde(alias = "participant_ids", alias = "participants", alias = "members")]
    pub participant_ids: Vec<Value>,
    #[serde(alias = "admin_ids", alias = "admins")]
    pub admin_ids: Vec<Value>,
    #[serde(alias = "last_message")]
    pub last_message: Option<RawMessage>,
}

impl RawConversation {
    /// Convert into a strict [`Conversation`], or `None` when the record has
    /// no id at all.
    ///
    /// Participant and admin lists are normalized here (nulls dropped,
    /// numbers coerced to strings); the kind is provisional and gets
    /// re-derived by the normalizer.
    pub fn into_conversation(self) -> Option<Conversation> {
        let id = self.id.filter(|i| !i.trim().is_empty())?;
        let kind = match self.kind.as_deref() {
            Some("direct") => ConversationKind::Direct,
            _ => ConversationKind::Group,
        };
        let last_message = self
            .last_message
            .and_then(|raw| raw.into_message(Some(&id)));
        Some(Conversation {
            participant_ids: normalize_id_list(&self.participant_ids),
            admin_ids: normalize_id_list(&self.admin_ids),
            id,
            kind,
            name: self.name.unwrap_or_default(),
            last_message,
        })
    }
}

/// Drop nulls and coerce everything else to a string id.
pub fn normalize_id_list(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// A user directory entry as returned by the server.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawUser {
    pub id: Option<Value>,
    #[serde(alias = "full_name", alias = "fullName", alias = "displayName")]
    pub name: Option<String>,
    pub email: Option<String>,
}

impl RawUser {
    pub fn into_user(self) -> Option<User> {
        let id = match self.id? {
            Value::String(s) if !s.trim().is_empty() => s,
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(User {
            id,
            name: self.name.filter(|n| !n.trim().is_empty()),
            email: self.email.filter(|e| !e.trim().is_empty()),
        })
    }
}
