//! Conversation normalization.
//!
//! Server conversation records are untrustworthy in two ways: the `type`
//! field does not reliably reflect the participant count, and display names
//! are frequently missing, placeholder text ("Direct Chat"), or opaque
//! system ids. Normalization re-derives both from the participant list and
//! the user directory.

use std::collections::HashMap;

use etschat_shared::constants::{
    DIRECT_NAME_PREFIX, GROUP_CHAT_NAME, GROUP_NAME_PARTICIPANTS, UNKNOWN_USER_NAME,
};
use etschat_shared::types::{Conversation, ConversationKind, User};

/// Whether a name is an opaque system id rather than something a human
/// would read: hex-like, optionally dashed, with either a dash present or
/// at least 16 hex characters.
pub fn looks_like_system_id(name: &str) -> bool {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return false;
    }
    let mut hex_count = 0usize;
    let mut has_dash = false;
    for c in trimmed.chars() {
        if c.is_ascii_hexdigit() {
            hex_count += 1;
        } else if c == '-' {
            has_dash = true;
        } else {
            return false;
        }
    }
    has_dash || hex_count >= 16
}

/// Placeholder names the server fills in when it has nothing better.
pub fn is_placeholder_name(name: &str) -> bool {
    let lowered = name.trim().to_lowercase();
    lowered == "chat" || lowered == "chat conversation" || lowered.starts_with("direct chat")
}

/// A name that needs replacing: empty, system-id-like, `direct-` prefixed,
/// or a known placeholder.
fn is_synthetic(name: &str) -> bool {
    let trimmed = name.trim();
    trimmed.is_empty()
        || looks_like_system_id(trimmed)
        || trimmed.starts_with(DIRECT_NAME_PREFIX)
        || is_placeholder_name(trimmed)
}

/// Derive a display name from the local part of an email address:
/// split on `.`/`_`/`-`, title-case each token, join with spaces.
pub fn name_from_email(email: &str) -> Option<String> {
    let local = email.split('@').next()?.trim();
    if local.is_empty() {
        return None;
    }
    let tokens: Vec<String> = local
        .split(['.', '_', '-'])
        .filter(|t| !t.is_empty())
        .map(title_case)
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

fn title_case(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Best display name for a user: their real name, else one derived from
/// their email, else the raw (synthetic) name, else their id, else
/// "Unknown User".
pub fn display_name_for_user(user: Option<&User>, fallback_id: &str) -> String {
    let raw_name = user
        .and_then(|u| u.name.as_deref())
        .unwrap_or("")
        .trim();
    if !raw_name.is_empty() && !is_synthetic(raw_name) {
        return raw_name.to_string();
    }
    if let Some(derived) = user
        .and_then(|u| u.email.as_deref())
        .and_then(name_from_email)
    {
        return derived;
    }
    if !raw_name.is_empty() {
        return raw_name.to_string();
    }
    if !fallback_id.trim().is_empty() {
        return fallback_id.to_string();
    }
    UNKNOWN_USER_NAME.to_string()
}

/// Classify by participant count. One or two participants make a direct
/// conversation; zero or more than two make a group.
pub fn classify(participant_count: usize) -> ConversationKind {
    if participant_count == 1 || participant_count == 2 {
        ConversationKind::Direct
    } else {
        ConversationKind::Group
    }
}

/// Produce a normalized copy of a conversation: participant ids cleaned,
/// kind re-derived from the participant count (authoritative over any
/// server-provided type, admin list or not), and a human display name.
pub fn normalize_conversation(
    conversation: &Conversation,
    users: &HashMap<String, User>,
    current_user_id: &str,
) -> Conversation {
    let participant_ids: Vec<String> = conversation
        .participant_ids
        .iter()
        .filter(|id| !id.trim().is_empty())
        .cloned()
        .collect();
    let kind = classify(participant_ids.len());
    let name = match kind {
        ConversationKind::Direct => {
            direct_name(conversation, &participant_ids, users, current_user_id)
        }
        ConversationKind::Group => {
            group_name(conversation, &participant_ids, users, current_user_id)
        }
    };
    Conversation {
        kind,
        name,
        participant_ids,
        ..conversation.clone()
    }
}

fn direct_name(
    conversation: &Conversation,
    participant_ids: &[String],
    users: &HashMap<String, User>,
    current_user_id: &str,
) -> String {
    match participant_ids.iter().find(|id| *id != current_user_id) {
        Some(other_id) => display_name_for_user(users.get(other_id), other_id),
        // Degenerate self-only conversation: keep a usable stored name if
        // there is one.
        None if !is_synthetic(&conversation.name) => conversation.name.trim().to_string(),
        None => UNKNOWN_USER_NAME.to_string(),
    }
}

fn group_name(
    conversation: &Conversation,
    participant_ids: &[String],
    users: &HashMap<String, User>,
    current_user_id: &str,
) -> String {
    if !is_synthetic(&conversation.name) {
        return conversation.name.trim().to_string();
    }
    let derived: Vec<String> = participant_ids
        .iter()
        .filter(|id| *id != current_user_id)
        .take(GROUP_NAME_PARTICIPANTS)
        .map(|id| display_name_for_user(users.get(id), id))
        .collect();
    if !derived.is_empty() {
        return derived.join(", ");
    }
    let original = conversation.name.trim();
    if !original.is_empty() {
        original.to_string()
    } else {
        GROUP_CHAT_NAME.to_string()
    }
}
