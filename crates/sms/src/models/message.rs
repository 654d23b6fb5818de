//! Message model representing one SMS in the local replica

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local row identity, assigned on first persist and stable for the row's
/// lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatabaseId(pub i64);

impl DatabaseId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl From<i64> for DatabaseId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Remote-assigned message identity. Absent until the message has
/// round-tripped through the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoipId(pub i64);

impl VoipId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl From<i64> for VoipId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Whether a message was received by the line or sent from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    /// Wire encoding used by the remote API: 0 = outgoing, 1 = incoming.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Direction::Outgoing),
            1 => Some(Direction::Incoming),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Direction::Outgoing => 0,
            Direction::Incoming => 1,
        }
    }
}

/// Identifies a conversation: the line plus the remote party.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId {
    pub line: String,
    pub contact: String,
}

impl ConversationId {
    pub fn new(line: impl Into<String>, contact: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            contact: contact.into(),
        }
    }
}

/// A single SMS message.
///
/// Rows are created by remote retrieval, by outbound send, or by draft
/// editing. `unread` is locally owned state layered onto remote content and
/// is never overwritten during reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Local row identity; `None` until the row has been persisted.
    pub database_id: Option<DatabaseId>,
    /// Remote identity; unique per `(line, voip_id)` once present.
    pub voip_id: Option<VoipId>,
    /// Send/receive instant.
    pub date: DateTime<Utc>,
    pub direction: Direction,
    /// The account identifier this message belongs to.
    pub line: String,
    /// Remote party address.
    pub contact: String,
    pub text: String,
    /// Meaningful only for incoming messages; locally owned.
    pub unread: bool,
    /// Tombstone flag. A tombstoned row is retained only while it has a
    /// `voip_id` to propagate.
    pub deleted: bool,
    /// Outgoing delivery state. Never both true with
    /// `delivery_in_progress`.
    pub delivered: bool,
    pub delivery_in_progress: bool,
    /// An in-progress, unsent composition; excluded from all conversation
    /// and history queries.
    pub draft: bool,
}

impl Message {
    /// Create a new message builder.
    pub fn builder(line: impl Into<String>, contact: impl Into<String>) -> MessageBuilder {
        MessageBuilder::new(line, contact)
    }

    pub fn is_incoming(&self) -> bool {
        self.direction == Direction::Incoming
    }

    pub fn is_outgoing(&self) -> bool {
        self.direction == Direction::Outgoing
    }

    pub fn conversation_id(&self) -> ConversationId {
        ConversationId::new(self.line.clone(), self.contact.clone())
    }

    /// Whether the row shows up in conversation/history queries.
    pub fn is_visible(&self) -> bool {
        !self.deleted && !self.draft
    }
}

/// Builder for creating Message instances
pub struct MessageBuilder {
    database_id: Option<DatabaseId>,
    voip_id: Option<VoipId>,
    date: Option<DateTime<Utc>>,
    direction: Direction,
    line: String,
    contact: String,
    text: String,
    unread: bool,
    deleted: bool,
    delivered: bool,
    delivery_in_progress: bool,
    draft: bool,
}

impl MessageBuilder {
    fn new(line: impl Into<String>, contact: impl Into<String>) -> Self {
        Self {
            database_id: None,
            voip_id: None,
            date: None,
            direction: Direction::Outgoing,
            line: line.into(),
            contact: contact.into(),
            text: String::new(),
            unread: false,
            deleted: false,
            delivered: false,
            delivery_in_progress: false,
            draft: false,
        }
    }

    pub fn database_id(mut self, id: DatabaseId) -> Self {
        self.database_id = Some(id);
        self
    }

    pub fn voip_id(mut self, id: VoipId) -> Self {
        self.voip_id = Some(id);
        self
    }

    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn unread(mut self, unread: bool) -> Self {
        self.unread = unread;
        self
    }

    pub fn deleted(mut self, deleted: bool) -> Self {
        self.deleted = deleted;
        self
    }

    pub fn delivered(mut self, delivered: bool) -> Self {
        self.delivered = delivered;
        self
    }

    pub fn delivery_in_progress(mut self, delivery_in_progress: bool) -> Self {
        self.delivery_in_progress = delivery_in_progress;
        self
    }

    pub fn draft(mut self, draft: bool) -> Self {
        self.draft = draft;
        self
    }

    pub fn build(self) -> Message {
        Message {
            database_id: self.database_id,
            voip_id: self.voip_id,
            date: self.date.unwrap_or_else(Utc::now),
            direction: self.direction,
            line: self.line,
            contact: self.contact,
            text: self.text,
            unread: self.unread,
            deleted: self.deleted,
            delivered: self.delivered,
            delivery_in_progress: self.delivery_in_progress,
            draft: self.draft,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_codes() {
        assert_eq!(Direction::from_code(0), Some(Direction::Outgoing));
        assert_eq!(Direction::from_code(1), Some(Direction::Incoming));
        assert_eq!(Direction::from_code(2), None);
        assert_eq!(Direction::Incoming.code(), 1);
        assert_eq!(Direction::Outgoing.code(), 0);
    }

    #[test]
    fn test_builder_defaults() {
        let msg = Message::builder("5551230000", "5559870000")
            .direction(Direction::Incoming)
            .text("hello")
            .unread(true)
            .build();

        assert_eq!(msg.database_id, None);
        assert_eq!(msg.voip_id, None);
        assert!(msg.is_incoming());
        assert!(msg.is_visible());
        assert!(!msg.delivered);
        assert!(!msg.delivery_in_progress);
    }

    #[test]
    fn test_visibility() {
        let mut msg = Message::builder("5551230000", "5559870000")
            .text("hi")
            .build();
        assert!(msg.is_visible());

        msg.deleted = true;
        assert!(!msg.is_visible());

        msg.deleted = false;
        msg.draft = true;
        assert!(!msg.is_visible());
    }

    #[test]
    fn test_serialization_round_trip() {
        let msg = Message::builder("5551230000", "5559870000")
            .voip_id(VoipId::new(42))
            .direction(Direction::Incoming)
            .text("payload")
            .unread(true)
            .build();

        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }
}
