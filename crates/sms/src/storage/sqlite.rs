//! SQLite-backed message storage

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};

use super::traits::MessageStore;
use crate::models::{DatabaseId, Direction, Message, VoipId};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- One row per message, drafts and tombstones included
            CREATE TABLE messages (
                database_id INTEGER PRIMARY KEY AUTOINCREMENT,
                voip_id INTEGER,
                date INTEGER NOT NULL,
                incoming INTEGER NOT NULL,
                line TEXT NOT NULL,
                contact TEXT NOT NULL,
                text TEXT NOT NULL,
                unread INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0,
                delivered INTEGER NOT NULL DEFAULT 0,
                delivery_in_progress INTEGER NOT NULL DEFAULT 0,
                draft INTEGER NOT NULL DEFAULT 0
            );

            -- Remote identity is unique per line once assigned
            CREATE UNIQUE INDEX idx_messages_line_voip_id
                ON messages(line, voip_id) WHERE voip_id IS NOT NULL;

            CREATE INDEX idx_messages_conversation
                ON messages(line, contact, date);

            CREATE INDEX idx_messages_line_date
                ON messages(line, date DESC);

            -- Completion instant of the last full synchronization per line
            CREATE TABLE sync_record (
                line TEXT PRIMARY KEY,
                last_complete_sync_at TEXT NOT NULL
            );
            "#,
        ),
    ])
}

/// Column list shared by every SELECT that materializes a full message.
const MESSAGE_COLUMNS: &str = "database_id, voip_id, date, incoming, line, contact, text, \
     unread, deleted, delivered, delivery_in_progress, draft";

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let incoming: bool = row.get(3)?;
    let date_secs: i64 = row.get(2)?;

    Ok(Message {
        database_id: Some(DatabaseId::new(row.get(0)?)),
        voip_id: row.get::<_, Option<i64>>(1)?.map(VoipId::new),
        date: DateTime::from_timestamp(date_secs, 0).unwrap_or_else(Utc::now),
        direction: if incoming {
            Direction::Incoming
        } else {
            Direction::Outgoing
        },
        line: row.get(4)?,
        contact: row.get(5)?,
        text: row.get(6)?,
        unread: row.get(7)?,
        deleted: row.get(8)?,
        delivered: row.get(9)?,
        delivery_in_progress: row.get(10)?,
        draft: row.get(11)?,
    })
}

/// SQLite-backed message store
///
/// A single connection behind a mutex. All queries go through prepared
/// statements; migrations run on open.
pub struct SqliteMessageStore {
    conn: Mutex<Connection>,
}

impl SqliteMessageStore {
    /// Open (or create) the database at `db_path` and bring it up to the
    /// latest schema.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL allows concurrent readers during writes; NORMAL sync is safe
        // under WAL. The cache/temp settings keep hot pages in memory.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query_messages(
        &self,
        where_clause: &str,
        order_clause: &str,
        bind: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Message>> {
        let conn = self.conn.lock().unwrap();

        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE {where_clause} {order_clause}"
        );
        let mut stmt = conn.prepare(&sql)?;

        let messages = stmt
            .query_map(bind, message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    fn update_fields(
        conn: &Connection,
        id: DatabaseId,
        message: &Message,
    ) -> rusqlite::Result<()> {
        conn.execute(
            "UPDATE messages SET
                voip_id = ?,
                date = ?,
                incoming = ?,
                line = ?,
                contact = ?,
                text = ?,
                unread = ?,
                deleted = ?,
                delivered = ?,
                delivery_in_progress = ?,
                draft = ?
             WHERE database_id = ?",
            params![
                message.voip_id.map(|v| v.as_i64()),
                message.date.timestamp(),
                message.is_incoming(),
                message.line,
                message.contact,
                message.text,
                message.unread,
                message.deleted,
                message.delivered,
                message.delivery_in_progress,
                message.draft,
                id.as_i64(),
            ],
        )?;
        Ok(())
    }

    fn insert(conn: &Connection, message: &Message) -> rusqlite::Result<DatabaseId> {
        conn.execute(
            "INSERT INTO messages
             (voip_id, date, incoming, line, contact, text,
              unread, deleted, delivered, delivery_in_progress, draft)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                message.voip_id.map(|v| v.as_i64()),
                message.date.timestamp(),
                message.is_incoming(),
                message.line,
                message.contact,
                message.text,
                message.unread,
                message.deleted,
                message.delivered,
                message.delivery_in_progress,
                message.draft,
            ],
        )?;
        Ok(DatabaseId::new(conn.last_insert_rowid()))
    }
}

impl MessageStore for SqliteMessageStore {
    fn upsert(&self, message: Message) -> Result<DatabaseId> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        // Dedupe by row id first, then by remote identity.
        let existing: Option<i64> = if let Some(id) = message.database_id {
            tx.query_row(
                "SELECT database_id FROM messages WHERE database_id = ?",
                [id.as_i64()],
                |row| row.get(0),
            )
            .optional()?
        } else if let Some(voip_id) = message.voip_id {
            tx.query_row(
                "SELECT database_id FROM messages WHERE line = ? AND voip_id = ?",
                params![message.line, voip_id.as_i64()],
                |row| row.get(0),
            )
            .optional()?
        } else {
            None
        };

        let id = match existing {
            Some(row_id) => {
                let row_id = DatabaseId::new(row_id);
                Self::update_fields(&tx, row_id, &message)?;
                row_id
            }
            None => Self::insert(&tx, &message)?,
        };

        tx.commit()?;
        Ok(id)
    }

    fn get(&self, id: DatabaseId) -> Result<Option<Message>> {
        let conn = self.conn.lock().unwrap();

        let message = conn
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE database_id = ?"),
                [id.as_i64()],
                message_from_row,
            )
            .optional()?;

        Ok(message)
    }

    fn get_by_voip_id(&self, line: &str, voip_id: VoipId) -> Result<Option<Message>> {
        let conn = self.conn.lock().unwrap();

        let message = conn
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE line = ? AND voip_id = ?"),
                params![line, voip_id.as_i64()],
                message_from_row,
            )
            .optional()?;

        Ok(message)
    }

    fn most_recent(&self, line: &str) -> Result<Option<Message>> {
        let conn = self.conn.lock().unwrap();

        let message = conn
            .query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE line = ? AND deleted = 0 AND draft = 0
                     ORDER BY date DESC, database_id DESC LIMIT 1"
                ),
                [line],
                message_from_row,
            )
            .optional()?;

        Ok(message)
    }

    fn all_messages(&self, line: &str) -> Result<Vec<Message>> {
        self.query_messages("line = ?", "ORDER BY date ASC, database_id ASC", &[&line])
    }

    fn visible_messages(&self, line: &str) -> Result<Vec<Message>> {
        self.query_messages(
            "line = ? AND deleted = 0 AND draft = 0",
            "ORDER BY date ASC, database_id ASC",
            &[&line],
        )
    }

    fn tombstones(&self, line: &str) -> Result<Vec<Message>> {
        self.query_messages(
            "line = ? AND deleted = 1 AND draft = 0",
            "ORDER BY date ASC, database_id ASC",
            &[&line],
        )
    }

    fn conversation_messages(&self, line: &str, contact: &str) -> Result<Vec<Message>> {
        self.query_messages(
            "line = ? AND contact = ? AND deleted = 0 AND draft = 0",
            "ORDER BY date ASC, database_id ASC",
            &[&line, &contact],
        )
    }

    fn unread_since_last_outgoing(&self, line: &str, contact: &str) -> Result<Vec<Message>> {
        self.query_messages(
            "line = ?1 AND contact = ?2 AND deleted = 0 AND draft = 0
                 AND incoming = 1 AND unread = 1
                 AND date >= COALESCE(
                     (SELECT MAX(date) FROM messages
                      WHERE line = ?1 AND contact = ?2 AND incoming = 0
                        AND deleted = 0 AND draft = 0),
                     0)",
            "ORDER BY date DESC, database_id DESC",
            &[&line, &contact],
        )
    }

    fn mark_sending(&self, id: DatabaseId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE messages SET delivered = 0, delivery_in_progress = 1 WHERE database_id = ?",
            [id.as_i64()],
        )?;
        Ok(())
    }

    fn mark_failed(&self, id: DatabaseId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE messages SET delivered = 0, delivery_in_progress = 0 WHERE database_id = ?",
            [id.as_i64()],
        )?;
        Ok(())
    }

    fn mark_conversation_read(&self, line: &str, contact: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE messages SET unread = 0 WHERE line = ? AND contact = ?",
            params![line, contact],
        )?;
        Ok(())
    }

    fn mark_conversation_unread(&self, line: &str, contact: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE messages SET unread = 1
             WHERE line = ? AND contact = ? AND incoming = 1",
            params![line, contact],
        )?;
        Ok(())
    }

    fn soft_delete(&self, id: DatabaseId) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        let voip_id: Option<Option<i64>> = conn
            .query_row(
                "SELECT voip_id FROM messages WHERE database_id = ?",
                [id.as_i64()],
                |row| row.get(0),
            )
            .optional()?;

        match voip_id {
            // Rows with a remote identity become tombstones so the deletion
            // can be propagated; purely local rows just disappear.
            Some(Some(_)) => {
                conn.execute(
                    "UPDATE messages SET deleted = 1 WHERE database_id = ?",
                    [id.as_i64()],
                )?;
            }
            Some(None) => {
                conn.execute(
                    "DELETE FROM messages WHERE database_id = ?",
                    [id.as_i64()],
                )?;
            }
            None => {}
        }

        Ok(())
    }

    fn soft_delete_conversation(&self, line: &str, contact: &str) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM messages
             WHERE line = ? AND contact = ? AND draft = 0 AND voip_id IS NULL",
            params![line, contact],
        )?;
        tx.execute(
            "UPDATE messages SET deleted = 1
             WHERE line = ? AND contact = ? AND draft = 0 AND voip_id IS NOT NULL",
            params![line, contact],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn hard_delete(&self, id: DatabaseId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM messages WHERE database_id = ?", [id.as_i64()])?;
        Ok(())
    }

    fn remove_all(&self, line: &str) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM messages WHERE line = ?", [line])?;
        tx.execute("DELETE FROM sync_record WHERE line = ?", [line])?;

        tx.commit()?;
        Ok(())
    }

    fn draft(&self, line: &str, contact: &str) -> Result<Option<Message>> {
        let conn = self.conn.lock().unwrap();

        let message = conn
            .query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE line = ? AND contact = ? AND draft = 1 LIMIT 1"
                ),
                params![line, contact],
                message_from_row,
            )
            .optional()?;

        Ok(message)
    }

    fn set_draft(&self, line: &str, contact: &str, text: Option<&str>) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        match text {
            None | Some("") => {
                tx.execute(
                    "DELETE FROM messages WHERE line = ? AND contact = ? AND draft = 1",
                    params![line, contact],
                )?;
            }
            Some(text) => {
                let updated = tx.execute(
                    "UPDATE messages SET text = ?, date = ?
                     WHERE line = ? AND contact = ? AND draft = 1",
                    params![text, Utc::now().timestamp(), line, contact],
                )?;

                if updated == 0 {
                    let draft = Message::builder(line, contact).text(text).draft(true).build();
                    Self::insert(&tx, &draft)?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn last_complete_sync(&self, line: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();

        let at: Option<String> = conn
            .query_row(
                "SELECT last_complete_sync_at FROM sync_record WHERE line = ?",
                [line],
                |row| row.get(0),
            )
            .optional()?;

        Ok(at.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        }))
    }

    fn set_last_complete_sync(&self, line: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO sync_record (line, last_complete_sync_at) VALUES (?, ?)",
            params![line, at.to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn create_test_store() -> (SqliteMessageStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("sms.test.sqlite");
        let store = SqliteMessageStore::new(&db_path).unwrap();
        (store, dir)
    }

    fn make_message(contact: &str, voip_id: Option<i64>, direction: Direction) -> Message {
        let mut builder = Message::builder("5551230000", contact)
            .direction(direction)
            .date(Utc::now() - Duration::minutes(5))
            .text("hello there")
            .unread(direction == Direction::Incoming);
        if let Some(id) = voip_id {
            builder = builder.voip_id(VoipId::new(id));
        }
        builder.build()
    }

    #[test]
    fn test_insert_and_get() {
        let (store, _dir) = create_test_store();

        let id = store
            .upsert(make_message("5550001111", Some(100), Direction::Incoming))
            .unwrap();

        let loaded = store.get(id).unwrap().unwrap();
        assert_eq!(loaded.database_id, Some(id));
        assert_eq!(loaded.voip_id, Some(VoipId::new(100)));
        assert!(loaded.unread);

        let by_voip = store
            .get_by_voip_id("5551230000", VoipId::new(100))
            .unwrap()
            .unwrap();
        assert_eq!(by_voip.database_id, Some(id));

        assert!(store.get(DatabaseId::new(999)).unwrap().is_none());
    }

    #[test]
    fn test_upsert_dedupes_by_voip_id() {
        let (store, _dir) = create_test_store();

        let first = store
            .upsert(make_message("5550001111", Some(100), Direction::Incoming))
            .unwrap();

        let mut updated = make_message("5550001111", Some(100), Direction::Incoming);
        updated.text = "edited remotely".to_string();
        updated.unread = false;
        let second = store.upsert(updated).unwrap();

        assert_eq!(first, second);
        assert_eq!(store.all_messages("5551230000").unwrap().len(), 1);

        let loaded = store.get(first).unwrap().unwrap();
        assert_eq!(loaded.text, "edited remotely");
        assert!(!loaded.unread);
    }

    #[test]
    fn test_voip_id_uniqueness_is_per_line() {
        let (store, _dir) = create_test_store();

        store
            .upsert(make_message("5550001111", Some(100), Direction::Incoming))
            .unwrap();

        let mut other_line = make_message("5550001111", Some(100), Direction::Incoming);
        other_line.line = "5559990000".to_string();
        store.upsert(other_line).unwrap();

        assert_eq!(store.all_messages("5551230000").unwrap().len(), 1);
        assert_eq!(store.all_messages("5559990000").unwrap().len(), 1);
    }

    #[test]
    fn test_soft_delete_with_remote_identity_leaves_tombstone() {
        let (store, _dir) = create_test_store();

        let id = store
            .upsert(make_message("5550001111", Some(100), Direction::Incoming))
            .unwrap();
        store.soft_delete(id).unwrap();

        let loaded = store.get(id).unwrap().unwrap();
        assert!(loaded.deleted);
        assert_eq!(store.visible_messages("5551230000").unwrap().len(), 0);
        assert_eq!(store.tombstones("5551230000").unwrap().len(), 1);
    }

    #[test]
    fn test_soft_delete_without_remote_identity_removes_row() {
        let (store, _dir) = create_test_store();

        let id = store
            .upsert(make_message("5550001111", None, Direction::Outgoing))
            .unwrap();
        store.soft_delete(id).unwrap();

        assert!(store.get(id).unwrap().is_none());
        assert_eq!(store.tombstones("5551230000").unwrap().len(), 0);
    }

    #[test]
    fn test_soft_delete_conversation() {
        let (store, _dir) = create_test_store();

        store
            .upsert(make_message("5550001111", Some(100), Direction::Incoming))
            .unwrap();
        store
            .upsert(make_message("5550001111", None, Direction::Outgoing))
            .unwrap();
        store
            .upsert(make_message("5550002222", Some(200), Direction::Incoming))
            .unwrap();
        store
            .set_draft("5551230000", "5550001111", Some("half-typed"))
            .unwrap();

        store
            .soft_delete_conversation("5551230000", "5550001111")
            .unwrap();

        // One tombstone to propagate, the local-only row is gone, the other
        // conversation and the draft are untouched.
        assert_eq!(store.tombstones("5551230000").unwrap().len(), 1);
        assert_eq!(store.visible_messages("5551230000").unwrap().len(), 1);
        assert!(store.draft("5551230000", "5550001111").unwrap().is_some());
    }

    #[test]
    fn test_read_state_transitions() {
        let (store, _dir) = create_test_store();

        store
            .upsert(make_message("5550001111", Some(100), Direction::Incoming))
            .unwrap();
        store
            .upsert(make_message("5550001111", Some(101), Direction::Outgoing))
            .unwrap();

        store.mark_conversation_read("5551230000", "5550001111").unwrap();
        let messages = store
            .conversation_messages("5551230000", "5550001111")
            .unwrap();
        assert!(messages.iter().all(|m| !m.unread));

        store
            .mark_conversation_unread("5551230000", "5550001111")
            .unwrap();
        let messages = store
            .conversation_messages("5551230000", "5550001111")
            .unwrap();
        for message in &messages {
            assert_eq!(message.unread, message.is_incoming());
        }
    }

    #[test]
    fn test_unread_since_last_outgoing() {
        let (store, _dir) = create_test_store();
        let base = Utc::now() - Duration::hours(3);

        let mut old_incoming = make_message("5550001111", Some(1), Direction::Incoming);
        old_incoming.date = base;
        store.upsert(old_incoming).unwrap();

        let mut outgoing = make_message("5550001111", Some(2), Direction::Outgoing);
        outgoing.date = base + Duration::hours(1);
        store.upsert(outgoing).unwrap();

        let mut recent_incoming = make_message("5550001111", Some(3), Direction::Incoming);
        recent_incoming.date = base + Duration::hours(2);
        store.upsert(recent_incoming).unwrap();

        let unread = store
            .unread_since_last_outgoing("5551230000", "5550001111")
            .unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].voip_id, Some(VoipId::new(3)));
    }

    #[test]
    fn test_delivery_flags() {
        let (store, _dir) = create_test_store();

        let id = store
            .upsert(make_message("5550001111", None, Direction::Outgoing))
            .unwrap();

        store.mark_sending(id).unwrap();
        let loaded = store.get(id).unwrap().unwrap();
        assert!(loaded.delivery_in_progress);
        assert!(!loaded.delivered);

        store.mark_failed(id).unwrap();
        let loaded = store.get(id).unwrap().unwrap();
        assert!(!loaded.delivery_in_progress);
        assert!(!loaded.delivered);
    }

    #[test]
    fn test_draft_lifecycle() {
        let (store, _dir) = create_test_store();

        assert!(store.draft("5551230000", "5550001111").unwrap().is_none());

        store
            .set_draft("5551230000", "5550001111", Some("first attempt"))
            .unwrap();
        store
            .set_draft("5551230000", "5550001111", Some("second attempt"))
            .unwrap();

        let draft = store.draft("5551230000", "5550001111").unwrap().unwrap();
        assert_eq!(draft.text, "second attempt");
        assert!(draft.draft);

        // Drafts never appear in conversation history.
        assert_eq!(
            store
                .conversation_messages("5551230000", "5550001111")
                .unwrap()
                .len(),
            0
        );

        store.set_draft("5551230000", "5550001111", None).unwrap();
        assert!(store.draft("5551230000", "5550001111").unwrap().is_none());
    }

    #[test]
    fn test_last_complete_sync_round_trip() {
        let (store, _dir) = create_test_store();

        assert!(store.last_complete_sync("5551230000").unwrap().is_none());

        let at = Utc::now();
        store.set_last_complete_sync("5551230000", at).unwrap();

        let loaded = store.last_complete_sync("5551230000").unwrap().unwrap();
        assert_eq!(loaded.timestamp(), at.timestamp());
    }

    #[test]
    fn test_remove_all() {
        let (store, _dir) = create_test_store();

        store
            .upsert(make_message("5550001111", Some(100), Direction::Incoming))
            .unwrap();
        store.set_last_complete_sync("5551230000", Utc::now()).unwrap();

        store.remove_all("5551230000").unwrap();

        assert!(store.all_messages("5551230000").unwrap().is_empty());
        assert!(store.last_complete_sync("5551230000").unwrap().is_none());
    }
}
