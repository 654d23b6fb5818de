//! Synchronization session engine
//!
//! A session is a chain of remote requests executed strictly in order:
//! local deletions are pushed first, then each retrieval window is fetched
//! and reconciled, oldest first. The first failing request aborts the chain;
//! everything merged before it stands.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;

use super::reconcile::{ReconcileFlags, reconcile_window};
use super::windows::{Window, plan_windows};
use crate::api::{SmsApi, provider_date};
use crate::config::SyncSettings;
use crate::error::Error;
use crate::models::{ConversationId, DatabaseId, VoipId};
use crate::storage::MessageStore;

/// Options for one synchronization session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Retrieve only messages newer than the newest local one, regardless of
    /// the configured settings. Deletion handling is suppressed and the
    /// session is not recorded as a complete synchronization.
    pub force_recent: bool,
}

/// Where a session currently stands.
///
/// `Idle` only exists before the first session. `Succeeded` and `Failed`
/// are sticky: they describe the most recent session and persist until the
/// next one re-enters `Running`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running { request: usize, total: usize },
    Succeeded,
    Failed,
}

/// Events pushed to observers at session boundaries.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// The local replica changed; the named conversations gained new unread
    /// incoming messages.
    MessagesChanged { conversations: Vec<ConversationId> },
    /// The session finished. `full` is false for forced-recent sessions.
    SyncCompleted { full: bool, error: Option<String> },
}

/// Receives session events. Callbacks run on the session's thread and should
/// return quickly.
pub trait SyncObserver: Send + Sync {
    fn on_event(&self, event: &SyncEvent);
}

/// What a finished session did.
#[derive(Debug, Default, Clone)]
pub struct SyncOutcome {
    pub inserted: usize,
    pub replaced: usize,
    pub removed: usize,
    pub deletions_sent: usize,
    pub windows: usize,
    pub duration_ms: u64,
    pub new_conversations: Vec<ConversationId>,
}

impl SyncOutcome {
    pub fn changed_anything(&self) -> bool {
        self.inserted > 0 || self.replaced > 0 || self.removed > 0 || self.deletions_sent > 0
    }
}

/// One planned remote request.
enum Request {
    Delete { voip_id: VoipId, local: DatabaseId },
    Retrieve(Window),
}

/// Drives synchronization sessions against one line.
///
/// Sessions are serialized: a second call to [`SyncEngine::synchronize`]
/// blocks until the running session finishes.
pub struct SyncEngine {
    api: Arc<dyn SmsApi>,
    store: Arc<dyn MessageStore>,
    settings: SyncSettings,
    observers: Mutex<Vec<Arc<dyn SyncObserver>>>,
    state: Mutex<SessionState>,
    session: Mutex<()>,
    cancelled: AtomicBool,
}

impl SyncEngine {
    pub fn new(api: Arc<dyn SmsApi>, store: Arc<dyn MessageStore>, settings: SyncSettings) -> Self {
        Self {
            api,
            store,
            settings,
            observers: Mutex::new(Vec::new()),
            state: Mutex::new(SessionState::Idle),
            session: Mutex::new(()),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn SyncObserver>) {
        self.observers.lock().unwrap().push(observer);
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().unwrap().clone()
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Ask the running session to stop. Takes effect between requests; the
    /// in-flight request is not interrupted.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Run one synchronization session to completion.
    pub fn synchronize(&self, options: SyncOptions) -> Result<SyncOutcome, Error> {
        self.settings.validate()?;

        let _session = self.session.lock().unwrap();
        self.cancelled.store(false, Ordering::SeqCst);

        let result = self.run_session(options);

        match &result {
            Ok(outcome) => {
                *self.state.lock().unwrap() = SessionState::Succeeded;
                log::info!(
                    "[SYNC] session finished: {} inserted, {} replaced, {} removed, {} deletions in {}ms",
                    outcome.inserted,
                    outcome.replaced,
                    outcome.removed,
                    outcome.deletions_sent,
                    outcome.duration_ms
                );

                if outcome.changed_anything() {
                    self.emit(&SyncEvent::MessagesChanged {
                        conversations: outcome.new_conversations.clone(),
                    });
                }
                self.emit(&SyncEvent::SyncCompleted {
                    full: !options.force_recent,
                    error: None,
                });
            }
            Err(e) => {
                *self.state.lock().unwrap() = SessionState::Failed;
                log::warn!("[SYNC] session failed: {}", e);
                self.emit(&SyncEvent::SyncCompleted {
                    full: !options.force_recent,
                    error: Some(e.to_string()),
                });
            }
        }

        result
    }

    fn run_session(&self, options: SyncOptions) -> Result<SyncOutcome, Error> {
        let started = Instant::now();
        let line = &self.settings.line;

        // Forced-recent sessions narrow the scope: no deletion handling in
        // either direction, and no tombstone resurrection.
        let recent_only = options.force_recent || self.settings.retrieve_only_recent_messages;
        let propagate_local =
            self.settings.propagate_local_deletions && !options.force_recent;
        let flags = ReconcileFlags {
            retrieve_deleted_messages: self.settings.retrieve_deleted_messages
                && !options.force_recent,
            propagate_remote_deletions: self.settings.propagate_remote_deletions
                && !options.force_recent,
        };

        let now = Utc::now();
        let today = provider_date(now);

        let start_date = if recent_only {
            match self.store.most_recent(line)? {
                Some(newest) => provider_date(newest.date),
                None => self.settings.start_date,
            }
        } else {
            self.settings.start_date
        };

        let mut requests = Vec::new();
        if propagate_local {
            for tombstone in self.store.tombstones(line)? {
                if let (Some(voip_id), Some(local)) = (tombstone.voip_id, tombstone.database_id) {
                    requests.push(Request::Delete { voip_id, local });
                }
            }
        }
        let windows = plan_windows(start_date, today, self.settings.max_window_days);
        let window_count = windows.len();
        requests.extend(windows.into_iter().map(Request::Retrieve));

        let total = requests.len();
        log::info!(
            "[SYNC] starting session for {}: {} requests ({} windows from {})",
            line,
            total,
            window_count,
            start_date
        );

        let mut outcome = SyncOutcome {
            windows: window_count,
            ..Default::default()
        };

        for (index, request) in requests.into_iter().enumerate() {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(Error::Cancelled);
            }
            *self.state.lock().unwrap() = SessionState::Running {
                request: index + 1,
                total,
            };

            match request {
                Request::Delete { voip_id, local } => {
                    self.api.delete_message(voip_id)?;
                    // The tombstone has served its purpose.
                    self.store.hard_delete(local)?;
                    outcome.deletions_sent += 1;
                }
                Request::Retrieve(window) => {
                    log::debug!(
                        "[SYNC] retrieving window {} to {}",
                        window.start,
                        window.end
                    );
                    let remote = self.api.get_messages(line, window.start, window.end)?;
                    let stats = reconcile_window(self.store.as_ref(), line, &window, &remote, flags)?;

                    outcome.inserted += stats.inserted;
                    outcome.replaced += stats.replaced;
                    outcome.removed += stats.removed;
                    for id in stats.new_conversations {
                        if !outcome.new_conversations.contains(&id) {
                            outcome.new_conversations.push(id);
                        }
                    }
                }
            }
        }

        if !options.force_recent {
            self.store.set_last_complete_sync(line, now)?;
        }

        outcome.duration_ms = started.elapsed().as_millis() as u64;
        Ok(outcome)
    }

    fn emit(&self, event: &SyncEvent) {
        for observer in self.observers.lock().unwrap().iter() {
            observer.on_event(event);
        }
    }
}
