//! SMS crate - Business logic for a local replica of a hosted SMS account
//!
//! This crate provides platform-independent SMS functionality including:
//! - Domain models (Message, Conversation, line/contact identities)
//! - HTTP client for the hosted SMS API
//! - Storage trait abstractions
//! - Idempotent windowed sync engine with deletion propagation
//! - Outbound send pipeline with SMS segmentation
//! - Query API for UI consumption
//!
//! This crate has zero UI dependencies; the presentation layer consumes it
//! through the engine's observer events and the query functions.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod query;
pub mod send;
pub mod storage;
pub mod sync;

pub use api::{SmsApi, VoipClient, provider_date, provider_offset};
pub use config::{SyncSettings, VoipCredentials};
pub use error::Error;
pub use models::{
    Conversation, ConversationId, DatabaseId, Direction, Message, VoipId, group_conversations,
};
pub use query::{
    ConversationDetail, ConversationSummary, get_conversation, list_conversations,
};
pub use send::{
    MULTIPART_CHUNK_SIZE, SINGLE_MESSAGE_LIMIT, SendPipeline, SendReport, segment_message,
};
pub use storage::{InMemoryMessageStore, MessageStore, SqliteMessageStore};
pub use sync::{
    SessionState, SyncEngine, SyncEvent, SyncObserver, SyncOptions, SyncOutcome, Window,
    plan_windows,
};
