//! In-process application events.
//!
//! UI layers subscribe to a broadcast channel instead of polling session
//! state. Emission is fire-and-forget; a bus with no live subscribers is
//! normal during startup and teardown.
//!
//! Chat-side events are emitted by [`crate::session::ChatSession`] (message
//! and conversation-list changes) and by the socket bridge below (presence).
//! [`AppEvent::AttendanceUpdated`] travels the other direction: the
//! embedding application's attendance views publish it and chat components
//! only observe it.

use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use etschat_net::{ListenerId, SocketClient};
use etschat_shared::protocol::SocketEvent;

/// Events the chat layer publishes to the rest of the application.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// A conversation's merged message list changed.
    MessagesUpdated { conversation_id: String },
    /// A user's presence changed.
    PresenceChanged { user_id: String, online: bool },
    /// The visible conversation list was re-sorted or re-deduplicated.
    ConversationsUpdated,
    /// An attendance record elsewhere in the application changed.
    AttendanceUpdated,
}

/// Broadcast fan-out for [`AppEvent`].
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: AppEvent) {
        if self.sender.send(event.clone()).is_err() {
            debug!(?event, "no subscribers for event");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Forward decoded socket events onto the bus.
///
/// Status frames become [`AppEvent::PresenceChanged`]; chat frames are not
/// forwarded here because [`crate::session::ChatSession::apply_incoming`]
/// emits [`AppEvent::MessagesUpdated`] only after the merge actually lands.
/// The task ends when the sending side of `events` is dropped.
pub fn forward_socket_events(mut events: mpsc::UnboundedReceiver<SocketEvent>, bus: EventBus) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let SocketEvent::Status { user_id, status } = event {
                bus.emit(AppEvent::PresenceChanged {
                    user_id,
                    online: status.is_online(),
                });
            }
        }
        debug!("socket event forwarding stopped");
    });
}

/// Register a bus-forwarding listener on the shared socket client.
///
/// The returned id detaches the bridge via `SocketClient::remove_listener`.
pub fn attach_socket(socket: &SocketClient, bus: &EventBus) -> ListenerId {
    let (id, rx) = socket.add_listener();
    forward_socket_events(rx, bus.clone());
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use etschat_shared::types::Presence;

    #[tokio::test]
    async fn test_events_reach_all_subscribers() {
        let bus = EventBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.emit(AppEvent::ConversationsUpdated);
        assert_eq!(a.recv().await.unwrap(), AppEvent::ConversationsUpdated);
        assert_eq!(b.recv().await.unwrap(), AppEvent::ConversationsUpdated);
    }

    #[test]
    fn test_emit_without_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.emit(AppEvent::AttendanceUpdated);
    }

    #[tokio::test]
    async fn test_status_frames_become_presence_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let (tx, events) = mpsc::unbounded_channel();
        forward_socket_events(events, bus.clone());

        tx.send(SocketEvent::Status {
            user_id: "u1".to_string(),
            status: Presence::Online,
        })
        .unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            AppEvent::PresenceChanged {
                user_id: "u1".to_string(),
                online: true,
            }
        );

        // Chat frames are not forwarded by the bridge.
        tx.send(SocketEvent::Chat(Default::default())).unwrap();
        tx.send(SocketEvent::Status {
            user_id: "u1".to_string(),
            status: Presence::Offline,
        })
        .unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            AppEvent::PresenceChanged {
                user_id: "u1".to_string(),
                online: false,
            }
        );
    }

    #[tokio::test]
    async fn test_attach_socket_bridges_listener_to_bus() {
        let socket = SocketClient::new(etschat_net::SocketConfig::new("ws://unused.example"));
        let bus = EventBus::default();
        let id = attach_socket(&socket, &bus);
        socket.remove_listener(id);
    }
}
