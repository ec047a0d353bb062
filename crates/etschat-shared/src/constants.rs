/// Prefix marking optimistic local message ids not yet confirmed by the server.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Time window for matching a local echo against its server confirmation.
pub const ECHO_WINDOW_MS: i64 = 5_000;

/// Delay before a dropped socket connection is retried.
pub const RECONNECT_DELAY_MS: u64 = 2_000;

/// Display name used when nothing better can be derived for a user.
pub const UNKNOWN_USER_NAME: &str = "Unknown User";

/// Fallback display name for group conversations.
pub const GROUP_CHAT_NAME: &str = "Group Chat";

/// Prefix of synthetic conversation/user names produced by the server
/// for lazily-created direct conversations.
pub const DIRECT_NAME_PREFIX: &str = "direct-";

/// How many participant names are joined into a derived group name.
pub const GROUP_NAME_PARTICIPANTS: usize = 3;
