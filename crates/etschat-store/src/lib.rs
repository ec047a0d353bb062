//! # etschat-store
//!
//! Per-user local persistence for the chat client: the message cache and
//! the conversation recency map, stored as JSON files in the platform data
//! directory.
//!
//! Persistence here is a continuity aid, never a correctness requirement.
//! Reads degrade to empty maps; writes return a `Result` that callers are
//! expected to log and swallow so a full disk or quota failure never
//! interrupts the chat flow.

pub mod store;

mod error;

pub use error::StoreError;
pub use store::ChatStore;
