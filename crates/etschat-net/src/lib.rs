// WebSocket gateway client: one shared connection, reconnect with queued
// sends, and presence tracking.

pub mod presence;
pub mod socket;

pub use presence::PresenceTracker;
pub use socket::{ListenerId, SocketClient, SocketConfig};
