//! Per-window reconciliation of remote messages against the local replica

use std::collections::HashSet;

use anyhow::Result;

use super::windows::{Window, window_bounds_utc};
use crate::models::{ConversationId, Message, VoipId};
use crate::storage::MessageStore;

/// Behaviour toggles for one reconciliation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileFlags {
    /// Resurrect locally tombstoned rows that are still present remotely.
    pub retrieve_deleted_messages: bool,
    /// Remove local rows the remote store no longer has.
    pub propagate_remote_deletions: bool,
}

/// What one window's reconciliation changed.
#[derive(Debug, Default)]
pub struct WindowStats {
    pub inserted: usize,
    pub replaced: usize,
    pub removed: usize,
    /// Conversations that gained a new unread incoming message.
    pub new_conversations: Vec<ConversationId>,
}

impl WindowStats {
    pub fn changed_anything(&self) -> bool {
        self.inserted > 0 || self.replaced > 0 || self.removed > 0
    }
}

/// Merge one window's remote messages into the local store.
///
/// Matching is by `(line, voip_id)`. A remote message with no local
/// counterpart is inserted as-is; one matching a live local row replaces
/// every field except `unread`, which stays locally owned. Tombstoned rows
/// are left alone unless `retrieve_deleted_messages` asks for them back, in
/// which case the row is resurrected while still keeping its local `unread`.
///
/// With `propagate_remote_deletions`, local rows carrying a `voip_id` dated
/// inside the window but absent from `remote` are removed outright. The
/// whole pass is idempotent.
pub fn reconcile_window(
    store: &dyn MessageStore,
    line: &str,
    window: &Window,
    remote: &[Message],
    flags: ReconcileFlags,
) -> Result<WindowStats> {
    let mut stats = WindowStats::default();

    for remote_message in remote {
        let Some(voip_id) = remote_message.voip_id else {
            continue;
        };

        match store.get_by_voip_id(line, voip_id)? {
            None => {
                store.upsert(remote_message.clone())?;
                stats.inserted += 1;

                if remote_message.is_incoming() && remote_message.unread {
                    let id = remote_message.conversation_id();
                    if !stats.new_conversations.contains(&id) {
                        stats.new_conversations.push(id);
                    }
                }
            }
            Some(local) if local.deleted => {
                if flags.retrieve_deleted_messages {
                    store.upsert(merge(remote_message, &local))?;
                    stats.replaced += 1;
                }
            }
            Some(local) => {
                let merged = merge(remote_message, &local);
                if merged != local {
                    stats.replaced += 1;
                }
                store.upsert(merged)?;
            }
        }
    }

    if flags.propagate_remote_deletions {
        stats.removed += remove_absent(store, line, window, remote)?;
    }

    Ok(stats)
}

/// Remote fields layered onto local identity and read state.
fn merge(remote: &Message, local: &Message) -> Message {
    let mut merged = remote.clone();
    merged.database_id = local.database_id;
    merged.unread = local.unread;
    merged.deleted = false;
    merged.draft = false;
    merged
}

/// Remove local rows with a remote identity, dated inside the window, that
/// the remote response no longer contains.
fn remove_absent(
    store: &dyn MessageStore,
    line: &str,
    window: &Window,
    remote: &[Message],
) -> Result<usize> {
    let remote_ids: HashSet<VoipId> = remote.iter().filter_map(|m| m.voip_id).collect();
    let (window_start, window_end) = window_bounds_utc(window);

    let mut removed = 0;
    for local in store.visible_messages(line)? {
        let (Some(voip_id), Some(database_id)) = (local.voip_id, local.database_id) else {
            continue;
        };
        if local.date < window_start || local.date >= window_end {
            continue;
        }
        if !remote_ids.contains(&voip_id) {
            store.hard_delete(database_id)?;
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use crate::storage::InMemoryMessageStore;
    use chrono::{NaiveDate, TimeZone, Utc};

    const LINE: &str = "5551230000";

    fn window() -> Window {
        Window {
            start: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
        }
    }

    fn remote_incoming(voip_id: i64, day: u32, text: &str) -> Message {
        Message::builder(LINE, "5550001111")
            .voip_id(VoipId::new(voip_id))
            .direction(Direction::Incoming)
            .date(Utc.with_ymd_and_hms(2024, 3, day, 15, 0, 0).unwrap())
            .text(text)
            .unread(true)
            .build()
    }

    #[test]
    fn test_new_messages_inserted_and_reported() {
        let store = InMemoryMessageStore::new();

        let remote = vec![remote_incoming(1, 2, "first"), remote_incoming(2, 3, "second")];
        let stats =
            reconcile_window(&store, LINE, &window(), &remote, ReconcileFlags::default()).unwrap();

        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.new_conversations.len(), 1);
        assert_eq!(store.visible_messages(LINE).unwrap().len(), 2);
    }

    #[test]
    fn test_merge_preserves_local_read_state() {
        let store = InMemoryMessageStore::new();

        let remote = vec![remote_incoming(1, 2, "original")];
        reconcile_window(&store, LINE, &window(), &remote, ReconcileFlags::default()).unwrap();

        store.mark_conversation_read(LINE, "5550001111").unwrap();

        // The remote copy still claims unread; the local read state wins.
        let stats = reconcile_window(&store, LINE, &window(), &remote, ReconcileFlags::default())
            .unwrap();
        assert_eq!(stats.inserted, 0);

        let local = store.get_by_voip_id(LINE, VoipId::new(1)).unwrap().unwrap();
        assert!(!local.unread);
        assert!(stats.new_conversations.is_empty());
    }

    #[test]
    fn test_tombstones_are_left_alone_by_default() {
        let store = InMemoryMessageStore::new();

        let remote = vec![remote_incoming(1, 2, "delete me")];
        reconcile_window(&store, LINE, &window(), &remote, ReconcileFlags::default()).unwrap();

        let id = store
            .get_by_voip_id(LINE, VoipId::new(1))
            .unwrap()
            .unwrap()
            .database_id
            .unwrap();
        store.soft_delete(id).unwrap();

        let stats = reconcile_window(&store, LINE, &window(), &remote, ReconcileFlags::default())
            .unwrap();
        assert_eq!(stats.inserted + stats.replaced, 0);
        assert!(store.get(id).unwrap().unwrap().deleted);
    }

    #[test]
    fn test_retrieve_deleted_resurrects_tombstones() {
        let store = InMemoryMessageStore::new();

        let remote = vec![remote_incoming(1, 2, "back again")];
        reconcile_window(&store, LINE, &window(), &remote, ReconcileFlags::default()).unwrap();

        store.mark_conversation_read(LINE, "5550001111").unwrap();
        let id = store
            .get_by_voip_id(LINE, VoipId::new(1))
            .unwrap()
            .unwrap()
            .database_id
            .unwrap();
        store.soft_delete(id).unwrap();

        let flags = ReconcileFlags {
            retrieve_deleted_messages: true,
            ..Default::default()
        };
        let stats = reconcile_window(&store, LINE, &window(), &remote, flags).unwrap();
        assert_eq!(stats.replaced, 1);

        let resurrected = store.get(id).unwrap().unwrap();
        assert!(!resurrected.deleted);
        // Read state carried over from before the deletion.
        assert!(!resurrected.unread);
    }

    #[test]
    fn test_remote_deletions_respect_window_bounds() {
        let store = InMemoryMessageStore::new();

        // One row inside the window, one outside it.
        let inside = remote_incoming(1, 5, "inside");
        let mut outside = remote_incoming(2, 5, "outside");
        outside.date = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        store.upsert(inside).unwrap();
        store.upsert(outside).unwrap();

        let flags = ReconcileFlags {
            propagate_remote_deletions: true,
            ..Default::default()
        };
        let stats = reconcile_window(&store, LINE, &window(), &[], flags).unwrap();

        assert_eq!(stats.removed, 1);
        assert!(store.get_by_voip_id(LINE, VoipId::new(1)).unwrap().is_none());
        assert!(store.get_by_voip_id(LINE, VoipId::new(2)).unwrap().is_some());
    }

    #[test]
    fn test_remote_deletion_covers_the_trailing_day() {
        let store = InMemoryMessageStore::new();

        // 23:30 provider time on the window's last day is 04:30 UTC the
        // next morning; it still belongs to the window.
        let mut late = remote_incoming(1, 11, "late evening");
        late.date = Utc.with_ymd_and_hms(2024, 3, 11, 4, 30, 0).unwrap();
        store.upsert(late).unwrap();

        let flags = ReconcileFlags {
            propagate_remote_deletions: true,
            ..Default::default()
        };
        let stats = reconcile_window(&store, LINE, &window(), &[], flags).unwrap();
        assert_eq!(stats.removed, 1);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let store = InMemoryMessageStore::new();

        let remote = vec![remote_incoming(1, 2, "first"), remote_incoming(2, 3, "second")];
        let flags = ReconcileFlags {
            propagate_remote_deletions: true,
            ..Default::default()
        };

        reconcile_window(&store, LINE, &window(), &remote, flags).unwrap();
        let second = reconcile_window(&store, LINE, &window(), &remote, flags).unwrap();

        assert_eq!(second.inserted, 0);
        assert_eq!(second.replaced, 0);
        assert_eq!(second.removed, 0);
        assert_eq!(store.visible_messages(LINE).unwrap().len(), 2);
    }
}
