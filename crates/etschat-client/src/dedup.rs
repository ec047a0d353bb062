//! Conversation deduplication.
//!
//! The server can represent one logical relationship as several records,
//! most commonly a direct conversation stored once as a two-party record
//! and once as a degenerate "group". Records are collapsed before display;
//! the final list is re-sorted by recency immediately afterwards, so the
//! groups-before-directs output order here carries no meaning.

use std::collections::HashMap;

use etschat_shared::types::{Conversation, ConversationKind};

/// Sorted, pipe-joined set of participant ids; the identity of a direct
/// conversation regardless of which record the server sent.
pub fn participant_key(conversation: &Conversation) -> String {
    let mut ids: Vec<&str> = conversation
        .participant_ids
        .iter()
        .map(String::as_str)
        .filter(|id| !id.trim().is_empty())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids.join("|")
}

/// Collapse duplicate conversation records.
///
/// Direct conversations are keyed by participant set (conversation id when
/// that set is empty); among conflicting records the one with the latest
/// `last_message` timestamp survives. Groups are keyed by their own id and
/// only merge when the server reuses an id.
pub fn dedupe_conversations(conversations: &[Conversation]) -> Vec<Conversation> {
    let mut groups: Vec<Conversation> = Vec::new();
    let mut group_index: HashMap<String, usize> = HashMap::new();
    let mut directs: Vec<Conversation> = Vec::new();
    let mut direct_index: HashMap<String, usize> = HashMap::new();

    for (position, conversation) in conversations.iter().enumerate() {
        let (key, bucket, index) = match conversation.kind {
            ConversationKind::Group => {
                let key = if !conversation.id.trim().is_empty() {
                    conversation.id.clone()
                } else {
                    let participants = participant_key(conversation);
                    if participants.is_empty() {
                        format!("group-{position}")
                    } else {
                        participants
                    }
                };
                (key, &mut groups, &mut group_index)
            }
            ConversationKind::Direct => {
                let participants = participant_key(conversation);
                let key = if participants.is_empty() {
                    conversation.id.clone()
                } else {
                    participants
                };
                (key, &mut directs, &mut direct_index)
            }
        };

        match index.get(&key) {
            Some(&existing) => {
                if conversation.last_message_millis() > bucket[existing].last_message_millis() {
                    bucket[existing] = conversation.clone();
                }
            }
            None => {
                index.insert(key, bucket.len());
                bucket.push(conversation.clone());
            }
        }
    }

    groups.extend(directs);
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use etschat_shared::types::Message;

    fn direct(id: &str, participants: &[&str], last_ts: Option<&str>) -> Conversation {
        Conversation {
            id: id.to_string(),
            kind: ConversationKind::Direct,
            name: String::new(),
            participant_ids: participants.iter().map(|p| p.to_string()).collect(),
            admin_ids: Vec::new(),
            last_message: last_ts.map(|ts| Message {
                id: format!("{id}-last"),
                conversation_id: id.to_string(),
                sender_id: "u1".to_string(),
                text: "last".to_string(),
                timestamp: ts.to_string(),
                is_local: false,
            }),
        }
    }

    #[test]
    fn test_direct_dedup_keeps_latest_record() {
        let older = direct("c1", &["u1", "u2"], Some("2024-03-01T12:00:00Z"));
        let newer = direct("c2", &["u2", "u1"], Some("2024-03-02T12:00:00Z"));
        let deduped = dedupe_conversations(&[older, newer.clone()]);
        assert_eq!(deduped, vec![newer]);
    }

    #[test]
    fn test_direct_dedup_is_order_independent() {
        let older = direct("c1", &["u1", "u2"], Some("2024-03-01T12:00:00Z"));
        let newer = direct("c2", &["u2", "u1"], Some("2024-03-02T12:00:00Z"));
        let deduped = dedupe_conversations(&[newer.clone(), older]);
        assert_eq!(deduped, vec![newer]);
    }

    #[test]
    fn test_missing_last_message_counts_as_zero() {
        let bare = direct("c1", &["u1", "u2"], None);
        let dated = direct("c2", &["u1", "u2"], Some("2024-03-01T12:00:00Z"));
        let deduped = dedupe_conversations(&[bare, dated.clone()]);
        assert_eq!(deduped, vec![dated]);
    }

    #[test]
    fn test_groups_are_not_merged_across_ids() {
        let mut a = direct("g1", &["u1", "u2", "u3"], None);
        a.kind = ConversationKind::Group;
        let mut b = direct("g2", &["u1", "u2", "u3"], None);
        b.kind = ConversationKind::Group;
        assert_eq!(dedupe_conversations(&[a, b]).len(), 2);
    }

    #[test]
    fn test_groups_come_before_directs() {
        let d = direct("c1", &["u1", "u2"], None);
        let mut g = direct("g1", &["u1", "u2", "u3"], None);
        g.kind = ConversationKind::Group;
        let deduped = dedupe_conversations(&[d.clone(), g.clone()]);
        assert_eq!(deduped[0].id, "g1");
        assert_eq!(deduped[1].id, "c1");
    }

    #[test]
    fn test_direct_with_no_participants_falls_back_to_id() {
        let a = direct("c1", &[], None);
        let b = direct("c2", &[], None);
        assert_eq!(dedupe_conversations(&[a, b]).len(), 2);
    }
}
