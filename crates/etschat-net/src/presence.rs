//! User presence tracking.
//!
//! Maintains an in-memory map of online/offline status and last-seen
//! timestamps, fed by the socket client's status frames and chat-message
//! sender ids.

use std::collections::HashMap;

use tracing::debug;

use etschat_shared::types::Presence;

/// Tracks the presence state of every user seen on the socket.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    statuses: HashMap<String, Presence>,
    last_seen: HashMap<String, i64>,
}

impl PresenceTracker {
    /// Create a new, empty presence tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a status update for a user.
    pub fn set_status(&mut self, user_id: &str, status: Presence) {
        debug!(user = %user_id, status = %status, "presence update");
        self.statuses.insert(user_id.to_string(), status);
    }

    /// Record activity from a user (e.g. a chat message they sent).
    pub fn mark_seen(&mut self, user_id: &str, epoch_millis: i64) {
        self.last_seen.insert(user_id.to_string(), epoch_millis);
    }

    /// Last known status for a user, if any frame mentioned them.
    pub fn status(&self, user_id: &str) -> Option<Presence> {
        self.statuses.get(user_id).copied()
    }

    /// Whether the user is currently known to be online.
    ///
    /// Users we have never heard about count as offline.
    pub fn is_online(&self, user_id: &str) -> bool {
        self.status(user_id).map(Presence::is_online).unwrap_or(false)
    }

    /// Epoch millis of the user's most recent observed activity.
    pub fn last_seen(&self, user_id: &str) -> Option<i64> {
        self.last_seen.get(user_id).copied()
    }

    /// Ids of all users currently marked online.
    pub fn online_users(&self) -> Vec<String> {
        self.statuses
            .iter()
            .filter(|(_, status)| status.is_online())
            .map(|(id, _)| id.clone())
            .collect()
    }
}
