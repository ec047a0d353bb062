//! Shared domain types and wire protocol for the ETS chat client.
//!
//! Everything the server sends is deserialized into the loose DTO shapes in
//! [`dto`] and converted exactly once into the strict types in [`types`];
//! the loose shapes never leak past that boundary.

pub mod constants;
pub mod dto;
pub mod protocol;
pub mod time;
pub mod types;

pub use protocol::{decode_frame, ActionFrame, ChatFrame, SocketEvent};
pub use types::{Conversation, ConversationKind, Message, Presence, User};
