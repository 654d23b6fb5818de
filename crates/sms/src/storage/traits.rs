//! Storage trait for the local message replica

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{DatabaseId, Message, VoipId};

/// Persistent store for the local replica of a line's message history.
///
/// Every operation is total: looking up an absent row yields `None` or an
/// empty list, and mutating an absent row is a no-op. Errors are reserved
/// for storage-layer failures.
pub trait MessageStore: Send + Sync {
    /// Insert or replace a message, returning its row id.
    ///
    /// Deduplication order: a message carrying a `database_id` replaces that
    /// row in place; otherwise a message carrying a `voip_id` replaces the
    /// existing `(line, voip_id)` row if one exists; otherwise a new row is
    /// inserted.
    fn upsert(&self, message: Message) -> Result<DatabaseId>;

    /// Fetch a single message by row id.
    fn get(&self, id: DatabaseId) -> Result<Option<Message>>;

    /// Fetch the message holding a given remote identity on a line.
    fn get_by_voip_id(&self, line: &str, voip_id: VoipId) -> Result<Option<Message>>;

    /// The newest visible message on a line, if any.
    fn most_recent(&self, line: &str) -> Result<Option<Message>>;

    /// Every row on a line, tombstones and drafts included.
    fn all_messages(&self, line: &str) -> Result<Vec<Message>>;

    /// Non-deleted, non-draft rows on a line, oldest first.
    fn visible_messages(&self, line: &str) -> Result<Vec<Message>>;

    /// Tombstoned (deleted, non-draft) rows on a line.
    fn tombstones(&self, line: &str) -> Result<Vec<Message>>;

    /// Visible messages of one conversation, oldest first.
    fn conversation_messages(&self, line: &str, contact: &str) -> Result<Vec<Message>>;

    /// Unread incoming messages of a conversation dated at or after the
    /// conversation's most recent outgoing message, newest first.
    fn unread_since_last_outgoing(&self, line: &str, contact: &str) -> Result<Vec<Message>>;

    /// Flag an outgoing message as currently being delivered.
    fn mark_sending(&self, id: DatabaseId) -> Result<()>;

    /// Flag an outgoing message as having failed delivery.
    fn mark_failed(&self, id: DatabaseId) -> Result<()>;

    /// Clear the unread flag on every message in a conversation.
    fn mark_conversation_read(&self, line: &str, contact: &str) -> Result<()>;

    /// Set the unread flag on the conversation's incoming messages.
    fn mark_conversation_unread(&self, line: &str, contact: &str) -> Result<()>;

    /// Delete a message locally. A row with a remote identity is tombstoned
    /// so the deletion can be propagated; a purely local row is removed.
    fn soft_delete(&self, id: DatabaseId) -> Result<()>;

    /// Soft-delete every non-draft message in a conversation.
    fn soft_delete_conversation(&self, line: &str, contact: &str) -> Result<()>;

    /// Remove a row outright, without leaving a tombstone.
    fn hard_delete(&self, id: DatabaseId) -> Result<()>;

    /// Remove every row on a line.
    fn remove_all(&self, line: &str) -> Result<()>;

    /// The draft row for a conversation, if one exists.
    fn draft(&self, line: &str, contact: &str) -> Result<Option<Message>>;

    /// Replace the conversation's draft text. `None` or empty text discards
    /// the draft.
    fn set_draft(&self, line: &str, contact: &str, text: Option<&str>) -> Result<()>;

    /// When the line last finished a full (non-recent-only) synchronization.
    fn last_complete_sync(&self, line: &str) -> Result<Option<DateTime<Utc>>>;

    /// Record the completion instant of a full synchronization.
    fn set_last_complete_sync(&self, line: &str, at: DateTime<Utc>) -> Result<()>;
}
