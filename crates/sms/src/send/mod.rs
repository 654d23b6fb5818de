//! Outbound send pipeline
//!
//! Long texts are segmented into SMS-sized chunks and dispatched one chunk
//! per remote request. Each chunk gets a local placeholder row so the
//! conversation shows it immediately; on confirmed delivery the placeholder
//! is dropped and a forced recent synchronization pulls the authoritative
//! remote copy. Failed chunks stay behind for manual resend.

use std::sync::Arc;

use chrono::Utc;

use crate::api::SmsApi;
use crate::error::Error;
use crate::models::{DatabaseId, Direction, Message};
use crate::storage::MessageStore;
use crate::sync::{SyncEngine, SyncOptions};

/// Longest text that fits in a single SMS.
pub const SINGLE_MESSAGE_LIMIT: usize = 160;

/// Chunk size once a text needs splitting. Smaller than the single-message
/// limit to leave room for the concatenation header.
pub const MULTIPART_CHUNK_SIZE: usize = 153;

/// Split a text into sendable chunks.
///
/// A text within the single-message limit is one chunk; anything longer is
/// cut into consecutive chunks of [`MULTIPART_CHUNK_SIZE`] characters, the
/// last possibly shorter. Splitting counts characters, not bytes.
pub fn segment_message(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();

    if chars.len() <= SINGLE_MESSAGE_LIMIT {
        return vec![text.to_string()];
    }

    chars
        .chunks(MULTIPART_CHUNK_SIZE)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// What happened to the chunks of one send call.
#[derive(Debug, Default)]
pub struct SendReport {
    pub attempted: usize,
    pub delivered: usize,
    /// Rows left behind in the failed-to-send state, paired with the error
    /// that put each one there.
    pub failed: Vec<(DatabaseId, Error)>,
}

impl SendReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Dispatches outbound messages for the engine's configured line.
pub struct SendPipeline {
    api: Arc<dyn SmsApi>,
    store: Arc<dyn MessageStore>,
    engine: Arc<SyncEngine>,
}

impl SendPipeline {
    pub fn new(
        api: Arc<dyn SmsApi>,
        store: Arc<dyn MessageStore>,
        engine: Arc<SyncEngine>,
    ) -> Self {
        Self { api, store, engine }
    }

    /// Send `text` to `contact`, one remote request per chunk.
    ///
    /// Chunks are attempted independently; a failed chunk does not stop the
    /// ones after it. If anything was delivered, a forced recent
    /// synchronization runs afterwards to replace the placeholders with
    /// their remote copies.
    pub fn send(&self, contact: &str, text: &str) -> Result<SendReport, Error> {
        if text.is_empty() {
            return Err(Error::Config("cannot send an empty message".to_string()));
        }

        let line = &self.engine.settings().line;
        let mut report = SendReport::default();

        for chunk in segment_message(text) {
            let placeholder = Message::builder(line.clone(), contact)
                .direction(Direction::Outgoing)
                .date(Utc::now())
                .text(chunk.clone())
                .build();
            let id = self.store.upsert(placeholder)?;

            report.attempted += 1;
            match self.dispatch_chunk(id, line, contact, &chunk)? {
                Ok(()) => report.delivered += 1,
                Err(cause) => report.failed.push((id, cause)),
            }
        }

        if report.delivered > 0 {
            self.refresh_after_send();
        }

        Ok(report)
    }

    /// Retry a chunk that previously failed, reusing its stored text.
    pub fn resend(&self, id: DatabaseId) -> Result<(), Error> {
        let Some(message) = self.store.get(id)? else {
            log::warn!("[SEND] resend of missing row {}", id.as_i64());
            return Ok(());
        };

        match self.dispatch_chunk(id, &message.line, &message.contact, &message.text)? {
            Ok(()) => {
                self.refresh_after_send();
                Ok(())
            }
            Err(cause) => Err(cause),
        }
    }

    /// Mark sending, call the remote API, settle the placeholder. The inner
    /// result is the delivery outcome, carrying the remote error on failure;
    /// only storage errors propagate through the outer one.
    fn dispatch_chunk(
        &self,
        id: DatabaseId,
        line: &str,
        contact: &str,
        text: &str,
    ) -> Result<Result<(), Error>, Error> {
        self.store.mark_sending(id)?;

        match self.api.send_message(line, contact, text) {
            Ok(()) => {
                // Superseded by the authoritative remote copy on the next
                // reconciliation pass.
                self.store.hard_delete(id)?;
                Ok(Ok(()))
            }
            Err(e) => {
                log::warn!("[SEND] chunk to {} failed: {}", contact, e);
                self.store.mark_failed(id)?;
                Ok(Err(e))
            }
        }
    }

    /// A failed refresh leaves placeholders dangling until the next session;
    /// it never fails the send itself.
    fn refresh_after_send(&self) {
        if let Err(e) = self.engine.synchronize(SyncOptions { force_recent: true }) {
            log::warn!("[SEND] post-send refresh failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = segment_message("hello");
        assert_eq!(chunks, vec!["hello".to_string()]);
    }

    #[test]
    fn test_exact_limit_is_unsplit() {
        let text = "a".repeat(160);
        let chunks = segment_message(&text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 160);
    }

    #[test]
    fn test_long_text_splits_into_153s() {
        let chunks = segment_message(&"a".repeat(306));
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 153));

        let chunks = segment_message(&"a".repeat(307));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 153);
        assert_eq!(chunks[1].len(), 153);
        assert_eq!(chunks[2].len(), 1);
    }

    #[test]
    fn test_segmentation_counts_characters_not_bytes() {
        // 161 two-byte characters must split on character count.
        let text = "é".repeat(161);
        let chunks = segment_message(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 153);
        assert_eq!(chunks[1].chars().count(), 8);
    }
}
