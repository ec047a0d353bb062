//! Per-user chat session state.
//!
//! [`ChatSession`] is the single owner of the in-memory message cache and
//! recency map for the duration of a login. It is rebuilt from local
//! storage on mount, mirrored back to storage on every mutation, and
//! cleared (memory only) on logout. All mutation goes through the merge
//! engine, so the per-conversation invariant — at most one survivor per
//! equivalence class, remote over local — holds no matter which path a
//! message arrived by.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use etschat_shared::protocol::ChatFrame;
use etschat_shared::types::{Conversation, Message};
use etschat_store::ChatStore;

use crate::events::{AppEvent, EventBus};
use crate::merge;
use crate::recency::{RecencyTracker, Stamp};

/// Owns one logged-in user's chat state.
pub struct ChatSession {
    user_id: String,
    cache: HashMap<String, Vec<Message>>,
    recency: RecencyTracker,
    store: Option<Arc<ChatStore>>,
    events: Option<EventBus>,
}

impl ChatSession {
    /// In-memory session with no persistence.
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            cache: HashMap::new(),
            recency: RecencyTracker::new(),
            store: None,
            events: None,
        }
    }

    /// Session backed by the given store.
    ///
    /// Cached messages are validated (malformed entries dropped) and sorted
    /// by running them through the merge engine against an empty list; each
    /// conversation with cached messages seeds the recency tracker with its
    /// latest timestamp.
    pub fn with_store(user_id: &str, store: Arc<ChatStore>) -> Self {
        let mut recency = RecencyTracker::with_store(Arc::clone(&store));
        let mut cache = HashMap::new();
        for (conversation_id, raw_entries) in store.load_message_cache() {
            let entries: Vec<Message> = raw_entries
                .into_iter()
                .filter_map(|raw| raw.into_message(Some(&conversation_id)))
                .collect();
            let validated = merge::merge(&[], &entries);
            if let Some(latest) = validated.last() {
                recency.update(
                    &conversation_id,
                    Some(Stamp::Text(latest.timestamp.clone())),
                    false,
                );
            }
            if !validated.is_empty() {
                cache.insert(conversation_id, validated);
            }
        }
        debug!(user = %user_id, conversations = cache.len(), "chat session restored from cache");
        Self {
            user_id: user_id.to_string(),
            cache,
            recency,
            store: Some(store),
            events: None,
        }
    }

    /// Attach the application event bus; subsequent mutations publish
    /// [`AppEvent`]s to it.
    pub fn attach_events(&mut self, events: EventBus) {
        self.events = Some(events);
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The current merged message list for a conversation.
    pub fn messages(&self, conversation_id: &str) -> &[Message] {
        self.cache
            .get(conversation_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Merge incoming messages (REST page, socket frame, anywhere) into a
    /// conversation, persist the cache, and bump recency.
    pub fn apply_incoming(&mut self, conversation_id: &str, incoming: &[Message]) -> &[Message] {
        let entry = self.cache.entry(conversation_id.to_string()).or_default();
        *entry = merge::merge(entry, incoming);
        if let Some(latest) = entry.last() {
            let stamp = Stamp::Text(latest.timestamp.clone());
            self.recency.update(conversation_id, Some(stamp), false);
        }
        self.persist();
        self.emit(AppEvent::MessagesUpdated {
            conversation_id: conversation_id.to_string(),
        });
        self.messages(conversation_id)
    }

    /// Merge a decoded socket chat frame. Returns the strict message when
    /// the frame was well-formed enough to display.
    pub fn apply_chat_frame(&mut self, frame: &ChatFrame) -> Option<Message> {
        let message = frame.to_raw_message().into_message(None)?;
        let conversation_id = message.conversation_id.clone();
        self.apply_incoming(&conversation_id, std::slice::from_ref(&message));
        Some(message)
    }

    /// Insert an optimistic local echo for a message this user just sent.
    /// The returned echo is replaced automatically once the server
    /// confirmation arrives through [`Self::apply_incoming`].
    pub fn record_local_send(&mut self, conversation_id: &str, text: &str) -> Message {
        let echo = Message::local_echo(conversation_id, &self.user_id, text);
        self.apply_incoming(conversation_id, std::slice::from_ref(&echo));
        echo
    }

    /// Deduplicate and sort conversations for the sidebar, most recent
    /// first. See [`RecencyTracker::sort_by_recency`]. Publishes
    /// [`AppEvent::ConversationsUpdated`] when the visible order changed.
    pub fn sort_conversations(
        &self,
        conversations: &[Conversation],
        previous: Option<&[Conversation]>,
    ) -> Vec<Conversation> {
        let sorted = self.recency.sort_by_recency(conversations, previous);
        let unchanged = previous.is_some_and(|prev| {
            prev.len() == sorted.len()
                && prev.iter().zip(sorted.iter()).all(|(a, b)| a.id == b.id)
        });
        if !unchanged {
            self.emit(AppEvent::ConversationsUpdated);
        }
        sorted
    }

    pub fn recency(&self) -> &RecencyTracker {
        &self.recency
    }

    pub fn recency_mut(&mut self) -> &mut RecencyTracker {
        &mut self.recency
    }

    /// Logout: drop in-memory state. Storage is left intact for the next
    /// login.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.recency.clear();
    }

    fn persist(&self) {
        if let Some(store) = self.store.as_ref() {
            if let Err(e) = store.save_message_cache(&self.cache) {
                warn!(error = %e, "failed to persist message cache");
            }
        }
    }

    fn emit(&self, event: AppEvent) {
        if let Some(events) = self.events.as_ref() {
            events.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(id: &str, conversation: &str, text: &str, timestamp: &str) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: conversation.to_string(),
            sender_id: "u1".to_string(),
            text: text.to_string(),
            timestamp: timestamp.to_string(),
            is_local: false,
        }
    }

    #[test]
    fn test_local_send_then_server_confirmation() {
        let mut session = ChatSession::new("u1");
        let echo = session.record_local_send("c1", "hi");
        assert_eq!(session.messages("c1").len(), 1);
        assert!(session.messages("c1")[0].is_local);

        // Server echoes the message back with its own id and timestamp.
        let confirmed = Message {
            id: "srv-1".to_string(),
            is_local: false,
            ..echo.clone()
        };
        session.apply_incoming("c1", &[confirmed.clone()]);
        assert_eq!(session.messages("c1"), &[confirmed]);
    }

    #[test]
    fn test_apply_incoming_is_convergent_across_sources() {
        // The same message arrives over REST and the socket; order must
        // not matter and nothing duplicates.
        let msg = remote("m1", "c1", "hello", "2024-03-01T12:00:00Z");
        let mut session = ChatSession::new("u1");
        session.apply_incoming("c1", &[msg.clone()]);
        session.apply_incoming("c1", &[msg.clone()]);
        assert_eq!(session.messages("c1"), &[msg]);
    }

    #[test]
    fn test_apply_chat_frame_without_timestamp_is_dropped() {
        let mut session = ChatSession::new("u1");
        let frame: ChatFrame =
            serde_json::from_str(r#"{"conversationId":"c1","text":"hi"}"#).unwrap();
        assert!(session.apply_chat_frame(&frame).is_none());
        assert!(session.messages("c1").is_empty());
    }

    #[test]
    fn test_mount_restores_and_seeds_recency() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ChatStore::open_at(dir.path(), "u1").unwrap());

        {
            let mut session = ChatSession::with_store("u1", Arc::clone(&store));
            session.apply_incoming(
                "c1",
                &[
                    remote("m2", "c1", "later", "2024-03-01T12:00:10Z"),
                    remote("m1", "c1", "earlier", "2024-03-01T12:00:00Z"),
                ],
            );
        }

        let restored = ChatSession::with_store("u1", Arc::new(
            ChatStore::open_at(dir.path(), "u1").unwrap(),
        ));
        let messages = restored.messages("c1");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "m1");
        assert_eq!(
            restored.recency().get("c1"),
            Some(1_709_294_410_000),
        );
    }

    #[test]
    fn test_mutations_publish_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let mut session = ChatSession::new("u1");
        session.attach_events(bus);

        session.apply_incoming("c1", &[remote("m1", "c1", "hi", "2024-03-01T12:00:00Z")]);
        assert_eq!(
            rx.try_recv().unwrap(),
            AppEvent::MessagesUpdated {
                conversation_id: "c1".to_string(),
            }
        );

        let list = [Conversation {
            id: "c1".to_string(),
            kind: etschat_shared::types::ConversationKind::Direct,
            name: "c1".to_string(),
            participant_ids: vec!["u1".to_string(), "u2".to_string()],
            admin_ids: Vec::new(),
            last_message: None,
        }];
        let sorted = session.sort_conversations(&list, None);
        assert_eq!(rx.try_recv().unwrap(), AppEvent::ConversationsUpdated);

        // An identical re-sort publishes nothing.
        session.sort_conversations(&list, Some(&sorted));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_clear_keeps_storage() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ChatStore::open_at(dir.path(), "u1").unwrap());

        let mut session = ChatSession::with_store("u1", Arc::clone(&store));
        session.apply_incoming("c1", &[remote("m1", "c1", "hi", "2024-03-01T12:00:00Z")]);
        session.clear();
        assert!(session.messages("c1").is_empty());

        // Next login still finds the cache on disk.
        let next = ChatSession::with_store("u1", store);
        assert_eq!(next.messages("c1").len(), 1);
    }
}
