//! Query API for UI consumption
//!
//! Provides high-level query functions that return data formatted for
//! display: conversation lists with unread badges, and single-conversation
//! detail with its draft.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{Conversation, Message, group_conversations};
use crate::storage::MessageStore;

/// Summary information for displaying a conversation in a list
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    /// Remote party address
    pub contact: String,
    /// Text of the newest message
    pub snippet: String,
    /// Timestamp of the newest message
    pub last_message_at: DateTime<Utc>,
    pub message_count: usize,
    /// Whether any incoming message is still unread
    pub is_unread: bool,
}

impl From<&Conversation> for ConversationSummary {
    fn from(conversation: &Conversation) -> Self {
        let (snippet, last_message_at) = match conversation.most_recent() {
            Some(newest) => (newest.text.clone(), newest.date),
            None => (String::new(), Utc::now()),
        };

        Self {
            contact: conversation.id.contact.clone(),
            snippet,
            last_message_at,
            message_count: conversation.messages.len(),
            is_unread: conversation.has_unread(),
        }
    }
}

/// Detailed conversation information: its messages plus any draft
#[derive(Debug, Clone)]
pub struct ConversationDetail {
    pub contact: String,
    /// Visible messages, oldest first.
    pub messages: Vec<Message>,
    /// The unsent composition, if one is saved.
    pub draft: Option<String>,
}

/// List a line's conversations, newest first.
pub fn list_conversations(store: &dyn MessageStore, line: &str) -> Result<Vec<ConversationSummary>> {
    let messages = store.visible_messages(line)?;
    Ok(group_conversations(messages)
        .iter()
        .map(ConversationSummary::from)
        .collect())
}

/// Load one conversation's history and draft. A conversation with no
/// messages and no draft yields `None`.
pub fn get_conversation(
    store: &dyn MessageStore,
    line: &str,
    contact: &str,
) -> Result<Option<ConversationDetail>> {
    let messages = store.conversation_messages(line, contact)?;
    let draft = store.draft(line, contact)?.map(|d| d.text);

    if messages.is_empty() && draft.is_none() {
        return Ok(None);
    }

    Ok(Some(ConversationDetail {
        contact: contact.to_string(),
        messages,
        draft,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use crate::storage::InMemoryMessageStore;
    use chrono::Duration;

    const LINE: &str = "5551230000";

    fn seed(store: &InMemoryMessageStore, contact: &str, age_hours: i64, unread: bool) {
        store
            .upsert(
                Message::builder(LINE, contact)
                    .direction(Direction::Incoming)
                    .date(Utc::now() - Duration::hours(age_hours))
                    .text(format!("from {} ({}h ago)", contact, age_hours))
                    .unread(unread)
                    .build(),
            )
            .unwrap();
    }

    #[test]
    fn test_list_conversations_orders_and_badges() {
        let store = InMemoryMessageStore::new();
        seed(&store, "5550001111", 5, false);
        seed(&store, "5550002222", 1, true);

        let summaries = list_conversations(&store, LINE).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].contact, "5550002222");
        assert!(summaries[0].is_unread);
        assert!(!summaries[1].is_unread);
    }

    #[test]
    fn test_get_conversation_includes_draft() {
        let store = InMemoryMessageStore::new();
        seed(&store, "5550001111", 2, false);
        store
            .set_draft(LINE, "5550001111", Some("on my way"))
            .unwrap();

        let detail = get_conversation(&store, LINE, "5550001111").unwrap().unwrap();
        assert_eq!(detail.messages.len(), 1);
        assert_eq!(detail.draft.as_deref(), Some("on my way"));
    }

    #[test]
    fn test_get_conversation_absent_is_none() {
        let store = InMemoryMessageStore::new();
        assert!(get_conversation(&store, LINE, "5559999999").unwrap().is_none());
    }

    #[test]
    fn test_draft_only_conversation_is_returned() {
        let store = InMemoryMessageStore::new();
        store.set_draft(LINE, "5550003333", Some("hello?")).unwrap();

        let detail = get_conversation(&store, LINE, "5550003333").unwrap().unwrap();
        assert!(detail.messages.is_empty());
        assert_eq!(detail.draft.as_deref(), Some("hello?"));
    }
}
