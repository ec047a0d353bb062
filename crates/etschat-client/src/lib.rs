pub mod api;
pub mod dedup;
pub mod events;
pub mod merge;
pub mod normalize;
pub mod recency;
pub mod session;

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber for an embedding application.
///
/// Honors `RUST_LOG` when set; otherwise chat crates log at debug and
/// everything else at warn.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("etschat_client=debug,etschat_net=debug,etschat_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
