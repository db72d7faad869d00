use super::{EventPage, EventRepository, StorageError};
use crate::feed::Event;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

/// Row type for the events table: (seq, event_id, event_name, occurred_at, payload)
type EventRow = (i64, String, String, String, String);

const SELECT_EVENT: &str = "SELECT seq, event_id, event_name, occurred_at, payload FROM events";

// ============================================================================
// SqliteRepository
// ============================================================================

/// Durable event store on SQLite.
///
/// Feed order is publication order, kept by an autoincrement sequence rather
/// than by `occurred_at`, so producer clock skew never reorders the feed.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database on a single connection,
    /// since every SQLite connection would otherwise see its own empty store.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Locked` if another process holds the database lock.
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let in_memory = path == ":memory:";
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: wait up to 5 seconds for a competing writer
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StorageError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10));
        if in_memory {
            // Closing the only connection would drop the whole database
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(StorageError::from_sqlx)?;

        let repo = Self { pool };
        repo.migrate().await.map_err(|e| match StorageError::from_sqlx(e) {
            StorageError::Locked => StorageError::Locked,
            other => StorageError::Migration(other.to_string()),
        })?;

        tracing::debug!(path = %path, "Opened event database");
        Ok(repo)
    }

    /// Create the schema. Idempotent: every statement uses `IF NOT EXISTS`.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT UNIQUE NOT NULL,
                event_name TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                payload TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn page_for(&self, row: EventRow) -> Result<EventPage, StorageError> {
        let seq = row.0;
        let previous: Option<String> =
            sqlx::query_scalar("SELECT event_id FROM events WHERE seq < ? ORDER BY seq DESC LIMIT 1")
                .bind(seq)
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::from_sqlx)?;

        Ok(EventPage {
            event: row_to_event(row)?,
            previous,
        })
    }
}

fn row_to_event(row: EventRow) -> Result<Event, StorageError> {
    let (_, event_id, event_name, occurred_at, payload) = row;
    let occurred_at = DateTime::parse_from_rfc3339(&occurred_at)
        .map_err(|e| StorageError::Corrupt(format!("event {}: occurred_at: {}", event_id, e)))?
        .with_timezone(&Utc);
    let payload = serde_json::from_str(&payload)
        .map_err(|e| StorageError::Corrupt(format!("event {}: payload: {}", event_id, e)))?;

    Ok(Event {
        event_id,
        event_name,
        occurred_at,
        payload,
    })
}

#[async_trait]
impl EventRepository for SqliteRepository {
    async fn publish(&self, event: Event) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&event.payload)?;
        let occurred_at = event
            .occurred_at
            .to_rfc3339_opts(SecondsFormat::AutoSi, true);

        let result = sqlx::query(
            "INSERT INTO events (event_id, event_name, occurred_at, payload) VALUES (?, ?, ?, ?)",
        )
        .bind(&event.event_id)
        .bind(&event.event_name)
        .bind(&occurred_at)
        .bind(&payload)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StorageError::Duplicate(event.event_id))
            }
            Err(e) => Err(StorageError::from_sqlx(e)),
        }
    }

    async fn latest(&self) -> Result<Option<EventPage>, StorageError> {
        let row: Option<EventRow> =
            sqlx::query_as(&format!("{} ORDER BY seq DESC LIMIT 1", SELECT_EVENT))
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::from_sqlx)?;

        match row {
            Some(row) => Ok(Some(self.page_for(row).await?)),
            None => Ok(None),
        }
    }

    async fn get(&self, event_id: &str) -> Result<Option<EventPage>, StorageError> {
        let row: Option<EventRow> = sqlx::query_as(&format!("{} WHERE event_id = ?", SELECT_EVENT))
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from_sqlx)?;

        match row {
            Some(row) => Ok(Some(self.page_for(row).await?)),
            None => Ok(None),
        }
    }
}
