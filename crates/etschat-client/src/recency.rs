//! Conversation recency tracking.
//!
//! Maintains, per conversation, the most recent known activity timestamp.
//! The map is monotonic: a write only lands when the new value is strictly
//! greater than the stored one, and the whole map is persisted after every
//! write. Persistence failures are logged and swallowed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use etschat_shared::time;
use etschat_shared::types::Conversation;
use etschat_store::ChatStore;

use crate::dedup::dedupe_conversations;

/// A timestamp in any of the forms call sites have on hand.
#[derive(Debug, Clone)]
pub enum Stamp {
    Millis(i64),
    Text(String),
    Time(DateTime<Utc>),
}

impl Stamp {
    fn resolve(&self) -> Option<i64> {
        match self {
            Stamp::Millis(millis) => Some(*millis),
            Stamp::Text(text) => time::parse_epoch_millis(text),
            Stamp::Time(dt) => Some(dt.timestamp_millis()),
        }
    }
}

impl From<i64> for Stamp {
    fn from(millis: i64) -> Self {
        Stamp::Millis(millis)
    }
}

impl From<&str> for Stamp {
    fn from(text: &str) -> Self {
        Stamp::Text(text.to_string())
    }
}

impl From<DateTime<Utc>> for Stamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Stamp::Time(dt)
    }
}

/// Per-conversation latest-activity map, optionally backed by the store.
pub struct RecencyTracker {
    map: HashMap<String, i64>,
    store: Option<Arc<ChatStore>>,
}

impl RecencyTracker {
    /// In-memory tracker with no persistence.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            store: None,
        }
    }

    /// Tracker seeded from (and persisted to) the given store.
    pub fn with_store(store: Arc<ChatStore>) -> Self {
        Self {
            map: store.load_recency(),
            store: Some(store),
        }
    }

    /// Record activity for a conversation.
    ///
    /// Resolution failures leave the stored value untouched unless
    /// `fallback_to_now` is set and no value exists yet, in which case the
    /// current time is recorded. Returns the value now stored (if any).
    pub fn update(
        &mut self,
        conversation_id: &str,
        timestamp: Option<Stamp>,
        fallback_to_now: bool,
    ) -> Option<i64> {
        let resolved = timestamp.as_ref().and_then(Stamp::resolve);
        let millis = match resolved {
            Some(millis) => millis,
            None if fallback_to_now && !self.map.contains_key(conversation_id) => {
                time::now_millis()
            }
            None => return self.map.get(conversation_id).copied(),
        };
        let current = self.map.get(conversation_id).copied();
        if current.map_or(true, |stored| millis > stored) {
            self.map.insert(conversation_id.to_string(), millis);
            self.persist();
        }
        self.map.get(conversation_id).copied()
    }

    /// The stored recency value for a conversation.
    pub fn get(&self, conversation_id: &str) -> Option<i64> {
        self.map.get(conversation_id).copied()
    }

    /// Sort key for one conversation: the tracked recency value, falling
    /// back to the denormalized last message, else epoch zero.
    fn sort_value(&self, conversation: &Conversation) -> i64 {
        self.get(&conversation.id)
            .unwrap_or_else(|| conversation.last_message_millis())
    }

    /// Deduplicate and sort conversations, most recent first.
    ///
    /// When the sorted result is element-for-element id-identical to
    /// `previous`, that previous list is returned unchanged so callers can
    /// skip a re-render.
    pub fn sort_by_recency(
        &self,
        conversations: &[Conversation],
        previous: Option<&[Conversation]>,
    ) -> Vec<Conversation> {
        let mut deduped = dedupe_conversations(conversations);
        deduped.sort_by(|a, b| self.sort_value(b).cmp(&self.sort_value(a)));
        if let Some(previous) = previous {
            let unchanged = previous.len() == deduped.len()
                && previous
                    .iter()
                    .zip(deduped.iter())
                    .all(|(a, b)| a.id == b.id);
            if unchanged {
                return previous.to_vec();
            }
        }
        deduped
    }

    /// Drop all in-memory values. Storage is left untouched.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    fn persist(&self) {
        if let Some(store) = self.store.as_ref() {
            if let Err(e) = store.save_recency(&self.map) {
                warn!(error = %e, "failed to persist recency map");
            }
        }
    }
}

impl Default for RecencyTracker {
    fn default() -> Self {
        Self::new()
    }
}
