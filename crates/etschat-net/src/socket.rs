//! The shared WebSocket gateway connection.
//!
//! Exactly one [`SocketClient`] exists per process; every UI component
//! multiplexes through [`SocketClient::add_listener`]. The connection runs
//! in a background tokio task; external code interacts only through the
//! cheaply-cloneable handle, so the single-connection invariant holds no
//! matter how many components are mounted.
//!
//! Sends issued while disconnected are queued and flushed FIFO when the
//! connection (re)opens. A dropped connection reconnects after a fixed
//! delay for as long as intent-to-stay-connected is set; `disconnect()`
//! clears that intent and invalidates any pending reconnect via a
//! generation counter.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};
use url::Url;

use etschat_shared::constants::RECONNECT_DELAY_MS;
use etschat_shared::protocol::{decode_frame, ActionFrame, SocketEvent};
use etschat_shared::time;
use etschat_shared::types::Presence;

use crate::presence::PresenceTracker;

/// Configuration for the gateway connection.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Gateway endpoint (`ws://` or `wss://`), without the token.
    pub endpoint: String,
    /// Delay before a dropped connection is retried.
    pub reconnect_delay: Duration,
}

impl SocketConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            reconnect_delay: Duration::from_millis(RECONNECT_DELAY_MS),
        }
    }
}

/// Identifies a registered listener for [`SocketClient::remove_listener`].
pub type ListenerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting,
    Open,
}

struct ConnState {
    phase: Phase,
    /// Intent-to-stay-connected; cleared only by `disconnect()`.
    keep_alive: bool,
    /// Last-supplied session token, reused across reconnects.
    token: Option<String>,
    /// Outbound frames awaiting a connection, flushed FIFO on open.
    queue: VecDeque<ActionFrame>,
    /// Sender into the write task of the live connection, if open.
    writer: Option<mpsc::UnboundedSender<String>>,
    listeners: HashMap<ListenerId, mpsc::UnboundedSender<SocketEvent>>,
    next_listener_id: ListenerId,
    /// Bumped on every connect/disconnect; a connection task whose
    /// generation is stale must stand down without touching state.
    generation: u64,
}

struct Inner {
    config: SocketConfig,
    state: Mutex<ConnState>,
    presence: Mutex<PresenceTracker>,
}

/// Handle to the process-wide gateway connection.
#[derive(Clone)]
pub struct SocketClient {
    inner: Arc<Inner>,
}

impl SocketClient {
    pub fn new(config: SocketConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(ConnState {
                    phase: Phase::Idle,
                    keep_alive: false,
                    token: None,
                    queue: VecDeque::new(),
                    writer: None,
                    listeners: HashMap::new(),
                    next_listener_id: 0,
                    generation: 0,
                }),
                presence: Mutex::new(PresenceTracker::new()),
            }),
        }
    }

    /// Open the connection, reusing the last token when `token` is `None`.
    ///
    /// No-op while already open or connecting. Marks
    /// intent-to-stay-connected so a later drop triggers a reconnect.
    pub fn connect(&self, token: Option<&str>) {
        let generation = {
            let mut st = self.inner.lock_state();
            if let Some(token) = token {
                st.token = Some(token.to_string());
            }
            st.keep_alive = true;
            if st.phase != Phase::Idle {
                return;
            }
            st.phase = Phase::Connecting;
            st.generation += 1;
            st.generation
        };
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            run_connection(inner, generation).await;
        });
    }

    /// Tear the connection down and stop reconnecting.
    ///
    /// Cancels any pending reconnect, closes the socket (a mid-handshake
    /// open is closed as soon as the handshake finishes), and drops the
    /// outbound queue.
    pub fn disconnect(&self) {
        let mut st = self.inner.lock_state();
        st.keep_alive = false;
        st.generation += 1;
        st.phase = Phase::Idle;
        // Dropping the writer ends the write task, which closes the socket.
        st.writer = None;
        st.queue.clear();
        info!("socket disconnected");
    }

    /// Send a chat message. Returns whether transmission was immediate;
    /// queued frames are delivered once the connection opens either way.
    pub fn send_message(&self, conversation_id: &str, text: &str) -> bool {
        self.send_frame(ActionFrame::SendMessage {
            conversation_id: conversation_id.to_string(),
            text: text.to_string(),
        })
    }

    /// Broadcast the local user's presence.
    pub fn send_status_update(&self, user_id: &str, status: Presence) -> bool {
        self.send_frame(ActionFrame::StatusUpdate {
            user_id: user_id.to_string(),
            status,
        })
    }

    pub fn notify_conversation_cleared(&self, conversation_id: &str) -> bool {
        self.send_frame(ActionFrame::ConversationCleared {
            conversation_id: conversation_id.to_string(),
        })
    }

    pub fn notify_conversation_deleted(&self, conversation_id: &str) -> bool {
        self.send_frame(ActionFrame::ConversationDeleted {
            conversation_id: conversation_id.to_string(),
        })
    }

    fn send_frame(&self, frame: ActionFrame) -> bool {
        {
            let mut st = self.inner.lock_state();
            if st.phase == Phase::Open {
                if let Some(writer) = st.writer.as_ref() {
                    match frame.to_json() {
                        Ok(json) => {
                            if writer.send(json).is_ok() {
                                return true;
                            }
                            // Write task already gone; fall through to queue.
                        }
                        Err(e) => {
                            error!(error = %e, "failed to encode outbound frame");
                            return false;
                        }
                    }
                }
            }
            st.queue.push_back(frame);
        }
        // Self-heal a stale or missing connection.
        self.connect(None);
        false
    }

    /// Register a listener; every decoded event is fanned out to all
    /// registered listeners.
    pub fn add_listener(&self) -> (ListenerId, mpsc::UnboundedReceiver<SocketEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut st = self.inner.lock_state();
        let id = st.next_listener_id;
        st.next_listener_id += 1;
        st.listeners.insert(id, tx);
        (id, rx)
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.inner.lock_state().listeners.remove(&id);
    }

    /// Whether the user is currently known to be online.
    pub fn is_online(&self, user_id: &str) -> bool {
        self.inner.lock_presence().is_online(user_id)
    }

    /// Epoch millis of the user's most recent observed activity.
    pub fn last_seen(&self, user_id: &str) -> Option<i64> {
        self.inner.lock_presence().last_seen(user_id)
    }

    /// Ids of all users currently marked online.
    pub fn online_users(&self) -> Vec<String> {
        self.inner.lock_presence().online_users()
    }

    #[cfg(test)]
    fn handle_raw_frame(&self, raw: &str) {
        self.inner.handle_frame(raw);
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, ConnState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_presence(&self) -> MutexGuard<'_, PresenceTracker> {
        self.presence
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Build the endpoint URL, attaching the session token as a query
    /// parameter when one was supplied.
    fn endpoint_url(&self) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.config.endpoint)?;
        let token = self.lock_state().token.clone();
        if let Some(token) = token {
            url.query_pairs_mut().append_pair("token", &token);
        }
        Ok(url)
    }

    /// Decode a text frame, apply presence side effects, and fan out.
    ///
    /// Malformed frames are logged and dropped; no listener sees them.
    fn handle_frame(&self, raw: &str) {
        let Some(event) = decode_frame(raw) else {
            warn!("dropping malformed socket frame");
            return;
        };
        match &event {
            SocketEvent::Status { user_id, status } => {
                self.lock_presence().set_status(user_id, *status);
            }
            SocketEvent::Chat(frame) => {
                if let Some(sender) = frame.sender_id.as_deref().filter(|s| !s.is_empty()) {
                    self.lock_presence().mark_seen(sender, time::now_millis());
                }
            }
        }
        let mut st = self.lock_state();
        st.listeners.retain(|_, tx| tx.send(event.clone()).is_ok());
    }
}

/// Drive one connection attempt plus its reconnect loop.
///
/// Stands down as soon as the state generation no longer matches, which is
/// how `disconnect()` and superseding `connect()` calls cancel it.
async fn run_connection(inner: Arc<Inner>, generation: u64) {
    loop {
        let url = match inner.endpoint_url() {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e, "invalid socket endpoint");
                let mut st = inner.lock_state();
                if st.generation == generation {
                    st.phase = Phase::Idle;
                    st.keep_alive = false;
                }
                return;
            }
        };

        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                let (mut write, mut read) = stream.split();
                let (tx, mut rx) = mpsc::unbounded_channel::<String>();

                // Install the writer and take the queued frames in one
                // critical section so nothing can interleave between them.
                let queued: Vec<String> = {
                    let mut st = inner.lock_state();
                    if st.generation != generation {
                        // Disconnected mid-handshake; dropping the stream
                        // closes the freshly-opened socket.
                        return;
                    }
                    st.phase = Phase::Open;
                    st.writer = Some(tx.clone());
                    st.queue
                        .drain(..)
                        .filter_map(|frame| match frame.to_json() {
                            Ok(json) => Some(json),
                            Err(e) => {
                                error!(error = %e, "failed to encode queued frame");
                                None
                            }
                        })
                        .collect()
                };
                info!(queued = queued.len(), "socket open, flushing queue");
                for json in queued {
                    let _ = tx.send(json);
                }

                let write_task = tokio::spawn(async move {
                    while let Some(text) = rx.recv().await {
                        if write.send(WsMessage::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    let _ = write.close().await;
                });

                while let Some(frame) = read.next().await {
                    match frame {
                        Ok(WsMessage::Text(text)) => inner.handle_frame(text.as_str()),
                        Ok(WsMessage::Close(_)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            // An error is observed but only the loop exit
                            // below schedules the reconnect, so a close
                            // following an error never double-schedules.
                            error!(error = %e, "socket read error");
                            break;
                        }
                    }
                }
                write_task.abort();
                debug!("socket connection closed");
            }
            Err(e) => {
                warn!(error = %e, "socket connect failed");
            }
        }

        // Decide whether this task owns a reconnect.
        {
            let mut st = inner.lock_state();
            if st.generation != generation {
                return;
            }
            st.writer = None;
            if !st.keep_alive {
                st.phase = Phase::Idle;
                return;
            }
            // Stay in Connecting through the backoff so concurrent
            // `connect()` calls remain no-ops.
            st.phase = Phase::Connecting;
        }
        tokio::time::sleep(inner.config.reconnect_delay).await;
        {
            let mut st = inner.lock_state();
            if st.generation != generation {
                return;
            }
            if !st.keep_alive {
                st.phase = Phase::Idle;
                return;
            }
        }
        debug!("reconnecting socket");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tokio::time::timeout;

    fn text_of(msg: WsMessage) -> Value {
        match msg {
            WsMessage::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn test_endpoint_url_carries_token() {
        let client = SocketClient::new(SocketConfig::new("ws://gateway.example/chat"));
        client.inner.lock_state().token = Some("abc123".to_string());
        let url = client.inner.endpoint_url().unwrap();
        assert_eq!(url.as_str(), "ws://gateway.example/chat?token=abc123");
    }

    #[test]
    fn test_listener_fanout_and_presence_side_effects() {
        let client = SocketClient::new(SocketConfig::new("ws://unused.example"));
        let (id_a, mut rx_a) = client.add_listener();
        let (_id_b, mut rx_b) = client.add_listener();

        client.handle_raw_frame(r#"{"type":"status","userId":"u1","status":"online"}"#);
        assert!(client.is_online("u1"));
        assert!(matches!(
            rx_a.try_recv().unwrap(),
            SocketEvent::Status { .. }
        ));
        assert!(matches!(
            rx_b.try_recv().unwrap(),
            SocketEvent::Status { .. }
        ));

        client.handle_raw_frame(r#"{"conversationId":"c1","senderId":"u2","text":"hi"}"#);
        assert!(client.last_seen("u2").is_some());
        assert!(matches!(rx_a.try_recv().unwrap(), SocketEvent::Chat(_)));
        assert!(matches!(rx_b.try_recv().unwrap(), SocketEvent::Chat(_)));

        client.remove_listener(id_a);
        client.handle_raw_frame(r#"{"conversationId":"c1","text":"again"}"#);
        assert!(rx_a.try_recv().is_err());
        assert!(matches!(rx_b.try_recv().unwrap(), SocketEvent::Chat(_)));
    }

    #[test]
    fn test_malformed_frame_reaches_no_listener() {
        let client = SocketClient::new(SocketConfig::new("ws://unused.example"));
        let (_id, mut rx) = client.add_listener();
        client.handle_raw_frame("{not json");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_queued_frames_flush_once_in_order() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut config = SocketConfig::new(format!("ws://{addr}"));
        config.reconnect_delay = Duration::from_millis(50);
        let client = SocketClient::new(config);

        // Disconnected: both sends queue and report non-immediate delivery.
        assert!(!client.send_message("c1", "first"));
        assert!(!client.send_message("c1", "second"));

        // The queued sends triggered connect(); accept and expect both
        // frames exactly once, in original order.
        let (stream, _) = listener.accept().await.unwrap();
        let mut server = tokio_tungstenite::accept_async(stream).await.unwrap();

        let first = text_of(server.next().await.unwrap().unwrap());
        assert_eq!(first["action"], "sendMessage");
        assert_eq!(first["text"], "first");
        let second = text_of(server.next().await.unwrap().unwrap());
        assert_eq!(second["text"], "second");

        // Drop the connection; the client reconnects and must not replay
        // the already-flushed frames on the new open.
        drop(server);
        let (stream, _) = listener.accept().await.unwrap();
        let mut server = tokio_tungstenite::accept_async(stream).await.unwrap();

        client.send_message("c1", "third");
        let next = timeout(Duration::from_secs(5), server.next())
            .await
            .expect("expected a frame after reconnect")
            .unwrap()
            .unwrap();
        assert_eq!(text_of(next)["text"], "third");

        client.disconnect();
    }

    #[tokio::test]
    async fn test_disconnect_stops_reconnect_and_drops_queue() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut config = SocketConfig::new(format!("ws://{addr}"));
        config.reconnect_delay = Duration::from_millis(50);
        let client = SocketClient::new(config);

        assert!(!client.send_message("c1", "never sent"));
        client.disconnect();

        // No connection attempt should land after disconnect.
        let accepted = timeout(Duration::from_millis(500), listener.accept()).await;
        if let Ok(Ok((stream, _))) = accepted {
            // A connect that raced the disconnect may still complete the
            // TCP handshake, but the queue was dropped: the socket must
            // yield no frames before closing.
            if let Ok(mut server) = tokio_tungstenite::accept_async(stream).await {
                match timeout(Duration::from_millis(500), server.next()).await {
                    Ok(Some(Ok(WsMessage::Text(text)))) => {
                        panic!("unexpected frame after disconnect: {text}")
                    }
                    _ => {}
                }
            }
        }
    }
}
