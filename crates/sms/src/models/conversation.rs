//! Derived conversation grouping
//!
//! A conversation is not persisted; it is computed from the non-deleted,
//! non-draft messages of a `(line, contact)` pair.

use super::{ConversationId, Message};

/// A line's message history with a single remote party, ordered by date from
/// least recent to most recent.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: ConversationId,
    /// Visible messages only, sorted ascending by date then database id.
    pub messages: Vec<Message>,
}

impl Conversation {
    /// The newest message in the conversation, if any.
    pub fn most_recent(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Whether any incoming message is still unread.
    pub fn has_unread(&self) -> bool {
        self.messages.iter().any(|m| m.is_incoming() && m.unread)
    }
}

/// Group visible messages into conversations, newest conversation first.
///
/// Tombstoned and draft rows are filtered out here, so callers may pass any
/// message subset without pre-filtering.
pub fn group_conversations(messages: Vec<Message>) -> Vec<Conversation> {
    let mut grouped: Vec<Conversation> = Vec::new();

    for message in messages {
        if !message.is_visible() {
            continue;
        }
        let id = message.conversation_id();
        match grouped.iter_mut().find(|c| c.id == id) {
            Some(conversation) => conversation.messages.push(message),
            None => grouped.push(Conversation {
                id,
                messages: vec![message],
            }),
        }
    }

    for conversation in &mut grouped {
        conversation
            .messages
            .sort_by(|a, b| a.date.cmp(&b.date).then(a.database_id.cmp(&b.database_id)));
    }

    grouped.sort_by(|a, b| {
        let a_date = a.most_recent().map(|m| m.date);
        let b_date = b.most_recent().map(|m| m.date);
        b_date.cmp(&a_date)
    });

    grouped
}
