//! Storage traits and implementations
//!
//! This module defines the storage abstraction for the local message
//! replica. The trait-based design allows swapping between the in-memory
//! and SQLite-backed implementations.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryMessageStore;
pub use sqlite::SqliteMessageStore;
pub use traits::MessageStore;
