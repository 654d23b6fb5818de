//! In-memory message storage for tests and ephemeral use

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::traits::MessageStore;
use crate::models::{DatabaseId, Message, VoipId};

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: BTreeMap<i64, Message>,
    last_complete_sync: BTreeMap<String, DateTime<Utc>>,
}

/// In-memory message store
///
/// Mirrors the SQLite implementation's semantics behind a single mutex.
/// Rows iterate in insertion order, which also serves as the date tiebreak.
#[derive(Default)]
pub struct InMemoryMessageStore {
    inner: Mutex<Inner>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect_sorted(inner: &Inner, mut filter: impl FnMut(&Message) -> bool) -> Vec<Message> {
        let mut messages: Vec<Message> = inner.rows.values().filter(|m| filter(m)).cloned().collect();
        messages.sort_by(|a, b| a.date.cmp(&b.date).then(a.database_id.cmp(&b.database_id)));
        messages
    }
}

impl MessageStore for InMemoryMessageStore {
    fn upsert(&self, mut message: Message) -> Result<DatabaseId> {
        let mut inner = self.inner.lock().unwrap();

        let existing = if let Some(id) = message.database_id {
            inner.rows.contains_key(&id.as_i64()).then_some(id)
        } else if let Some(voip_id) = message.voip_id {
            inner
                .rows
                .values()
                .find(|m| m.line == message.line && m.voip_id == Some(voip_id))
                .and_then(|m| m.database_id)
        } else {
            None
        };

        let id = match existing {
            Some(id) => id,
            None => {
                inner.next_id += 1;
                DatabaseId::new(inner.next_id)
            }
        };

        message.database_id = Some(id);
        inner.rows.insert(id.as_i64(), message);
        Ok(id)
    }

    fn get(&self, id: DatabaseId) -> Result<Option<Message>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.rows.get(&id.as_i64()).cloned())
    }

    fn get_by_voip_id(&self, line: &str, voip_id: VoipId) -> Result<Option<Message>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .rows
            .values()
            .find(|m| m.line == line && m.voip_id == Some(voip_id))
            .cloned())
    }

    fn most_recent(&self, line: &str) -> Result<Option<Message>> {
        let inner = self.inner.lock().unwrap();
        Ok(Self::collect_sorted(&inner, |m| m.line == line && m.is_visible())
            .pop())
    }

    fn all_messages(&self, line: &str) -> Result<Vec<Message>> {
        let inner = self.inner.lock().unwrap();
        Ok(Self::collect_sorted(&inner, |m| m.line == line))
    }

    fn visible_messages(&self, line: &str) -> Result<Vec<Message>> {
        let inner = self.inner.lock().unwrap();
        Ok(Self::collect_sorted(&inner, |m| m.line == line && m.is_visible()))
    }

    fn tombstones(&self, line: &str) -> Result<Vec<Message>> {
        let inner = self.inner.lock().unwrap();
        Ok(Self::collect_sorted(&inner, |m| {
            m.line == line && m.deleted && !m.draft
        }))
    }

    fn conversation_messages(&self, line: &str, contact: &str) -> Result<Vec<Message>> {
        let inner = self.inner.lock().unwrap();
        Ok(Self::collect_sorted(&inner, |m| {
            m.line == line && m.contact == contact && m.is_visible()
        }))
    }

    fn unread_since_last_outgoing(&self, line: &str, contact: &str) -> Result<Vec<Message>> {
        let inner = self.inner.lock().unwrap();

        let last_outgoing = inner
            .rows
            .values()
            .filter(|m| m.line == line && m.contact == contact && m.is_outgoing() && m.is_visible())
            .map(|m| m.date)
            .max();

        let mut unread = Self::collect_sorted(&inner, |m| {
            m.line == line
                && m.contact == contact
                && m.is_visible()
                && m.is_incoming()
                && m.unread
                && last_outgoing.is_none_or(|cutoff| m.date >= cutoff)
        });
        unread.reverse();
        Ok(unread)
    }

    fn mark_sending(&self, id: DatabaseId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(message) = inner.rows.get_mut(&id.as_i64()) {
            message.delivered = false;
            message.delivery_in_progress = true;
        }
        Ok(())
    }

    fn mark_failed(&self, id: DatabaseId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(message) = inner.rows.get_mut(&id.as_i64()) {
            message.delivered = false;
            message.delivery_in_progress = false;
        }
        Ok(())
    }

    fn mark_conversation_read(&self, line: &str, contact: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for message in inner.rows.values_mut() {
            if message.line == line && message.contact == contact {
                message.unread = false;
            }
        }
        Ok(())
    }

    fn mark_conversation_unread(&self, line: &str, contact: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for message in inner.rows.values_mut() {
            if message.line == line && message.contact == contact && message.is_incoming() {
                message.unread = true;
            }
        }
        Ok(())
    }

    fn soft_delete(&self, id: DatabaseId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let has_remote_identity = match inner.rows.get(&id.as_i64()) {
            Some(message) => message.voip_id.is_some(),
            None => return Ok(()),
        };

        if has_remote_identity {
            if let Some(message) = inner.rows.get_mut(&id.as_i64()) {
                message.deleted = true;
            }
        } else {
            inner.rows.remove(&id.as_i64());
        }
        Ok(())
    }

    fn soft_delete_conversation(&self, line: &str, contact: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();

        inner.rows.retain(|_, m| {
            !(m.line == line && m.contact == contact && !m.draft && m.voip_id.is_none())
        });
        for message in inner.rows.values_mut() {
            if message.line == line && message.contact == contact && !message.draft {
                message.deleted = true;
            }
        }
        Ok(())
    }

    fn hard_delete(&self, id: DatabaseId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.rows.remove(&id.as_i64());
        Ok(())
    }

    fn remove_all(&self, line: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.rows.retain(|_, m| m.line != line);
        inner.last_complete_sync.remove(line);
        Ok(())
    }

    fn draft(&self, line: &str, contact: &str) -> Result<Option<Message>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .rows
            .values()
            .find(|m| m.line == line && m.contact == contact && m.draft)
            .cloned())
    }

    fn set_draft(&self, line: &str, contact: &str, text: Option<&str>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();

        let existing = inner
            .rows
            .values()
            .find(|m| m.line == line && m.contact == contact && m.draft)
            .and_then(|m| m.database_id);

        match text {
            None | Some("") => {
                if let Some(id) = existing {
                    inner.rows.remove(&id.as_i64());
                }
            }
            Some(text) => match existing {
                Some(id) => {
                    if let Some(message) = inner.rows.get_mut(&id.as_i64()) {
                        message.text = text.to_string();
                        message.date = Utc::now();
                    }
                }
                None => {
                    inner.next_id += 1;
                    let id = DatabaseId::new(inner.next_id);
                    let draft = Message::builder(line, contact)
                        .database_id(id)
                        .text(text)
                        .draft(true)
                        .build();
                    inner.rows.insert(id.as_i64(), draft);
                }
            },
        }
        Ok(())
    }

    fn last_complete_sync(&self, line: &str) -> Result<Option<DateTime<Utc>>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.last_complete_sync.get(line).copied())
    }

    fn set_last_complete_sync(&self, line: &str, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.last_complete_sync.insert(line.to_string(), at);
        Ok(())
    }
}
