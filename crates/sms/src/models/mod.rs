//! Domain models for SMS entities

mod conversation;
mod message;

pub use conversation::{Conversation, group_conversations};
pub use message::{ConversationId, DatabaseId, Direction, Message, VoipId};
