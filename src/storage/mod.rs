//! Event stores behind a producer feed.
//!
//! Callers only go through [`EventRepository`]; each implementation owns its
//! container and serializes writes internally.

mod memory;
mod sqlite;

pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;

use crate::feed::Event;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// An event with the same ID was already published.
    #[error("event {0} already exists")]
    Duplicate(String),

    /// Another process holds the database lock
    #[error("Event database is locked by another process")]
    Locked,

    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A stored row could not be turned back into an event.
    #[error("Corrupt event row: {0}")]
    Corrupt(String),

    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StorageError {
    /// Classifies a sqlx error, recognising SQLite lock contention.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
        {
            return StorageError::Locked;
        }

        StorageError::Database(err)
    }
}

/// An event together with the ID of the event published just before it.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPage {
    pub event: Event,
    /// `None` for the oldest event in the store.
    pub previous: Option<String>,
}

/// Append-only store of a producer's events.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Appends an event. Fails with [`StorageError::Duplicate`] if its ID is taken.
    async fn publish(&self, event: Event) -> Result<(), StorageError>;

    /// Most recently published event, if any.
    async fn latest(&self) -> Result<Option<EventPage>, StorageError>;

    async fn get(&self, event_id: &str) -> Result<Option<EventPage>, StorageError>;
}
