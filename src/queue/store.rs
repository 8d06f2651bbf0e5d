//! Durable storage for queued actions.
//!
//! [`DurableStore`] is the seam between the queue and its storage engine.
//! [`SqliteStore`] is the on-device implementation; [`MemoryStore`] keeps the
//! same contract in process memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio::sync::OnceCell;

use super::action::QueuedAction;
use crate::error::QueueError;
use crate::storage::Database;

/// Keyed store of queued actions with a timestamp ordering.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Open the store, creating it on first use. Idempotent.
    async fn initialize(&self) -> Result<(), QueueError>;

    /// Add a new action.
    ///
    /// Fails with `QueueError::DuplicateKey` if the id is already stored.
    async fn insert(&self, action: &QueuedAction) -> Result<(), QueueError>;

    /// Overwrite the stored action with the same id.
    ///
    /// An absent id is left absent.
    async fn update(&self, action: &QueuedAction) -> Result<(), QueueError>;

    /// Remove an action. Returns whether a record was removed.
    async fn delete(&self, id: &str) -> Result<bool, QueueError>;

    /// All actions, ascending by timestamp, ties in insertion order.
    async fn list_ordered_by_timestamp(&self) -> Result<Vec<QueuedAction>, QueueError>;

    /// Number of stored actions.
    async fn count(&self) -> Result<usize, QueueError>;

    /// Look up a single action.
    async fn get(&self, id: &str) -> Result<Option<QueuedAction>, QueueError>;

    /// Remove every action. Returns the number removed.
    async fn clear(&self) -> Result<usize, QueueError>;

    /// Claim or renew the replay pass lease for `owner` for `lease`.
    ///
    /// Returns `false` while a different owner holds an unexpired lease.
    /// Stores that cannot be shared outside one value have nothing to
    /// coordinate and always grant it.
    async fn try_lock_replay(&self, _owner: &str, _lease: Duration) -> Result<bool, QueueError> {
        Ok(true)
    }

    /// Release the replay pass lease if `owner` holds it.
    async fn unlock_replay(&self, _owner: &str) -> Result<(), QueueError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

/// SQLite-backed store.
///
/// The database is opened lazily on first use. Concurrent first callers all
/// await the same open; a failed open is retried by the next caller.
pub struct SqliteStore {
    location: Location,
    db: OnceCell<Arc<Mutex<Database>>>,
}

impl SqliteStore {
    /// Store backed by the database file at `path`.
    #[must_use]
    pub fn open_at(path: impl AsRef<Path>) -> Self {
        Self {
            location: Location::File(path.as_ref().to_path_buf()),
            db: OnceCell::new(),
        }
    }

    /// Store backed by a private in-memory database.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            location: Location::Memory,
            db: OnceCell::new(),
        }
    }

    async fn handle(&self) -> Result<Arc<Mutex<Database>>, QueueError> {
        let db = self
            .db
            .get_or_try_init(|| async {
                let location = self.location.clone();
                let db = tokio::task::spawn_blocking(move || match location {
                    Location::File(path) => Database::open_at(&path),
                    Location::Memory => Database::open_in_memory(),
                })
                .await
                .map_err(|e| QueueError::Database(format!("Store open task failed: {e}")))??;

                tracing::info!(location = ?self.location, "queue store initialized");
                Ok::<_, QueueError>(Arc::new(Mutex::new(db)))
            })
            .await?;

        Ok(Arc::clone(db))
    }

    /// Run blocking SQLite work against the opened database.
    async fn with_db<T, F>(&self, f: F) -> Result<T, QueueError>
    where
        F: FnOnce(&Database) -> Result<T, QueueError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.handle().await?;

        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|_| QueueError::Database("Queue database lock poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| QueueError::Database(format!("Store task failed: {e}")))?
    }
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn initialize(&self) -> Result<(), QueueError> {
        self.handle().await.map(|_| ())
    }

    async fn insert(&self, action: &QueuedAction) -> Result<(), QueueError> {
        let action = action.clone();
        self.with_db(move |db| {
            let headers = serde_json::to_string(&action.headers)?;
            db.connection()
                .execute(
                    r"INSERT INTO queued_actions (id, url, method, headers, body, timestamp, retries)
                      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        action.id,
                        action.url,
                        action.method,
                        headers,
                        action.body,
                        action.timestamp.timestamp_micros(),
                        action.retries,
                    ],
                )
                .map_err(|e| insert_error(&action.id, e))?;
            Ok(())
        })
        .await
    }

    async fn update(&self, action: &QueuedAction) -> Result<(), QueueError> {
        let action = action.clone();
        self.with_db(move |db| {
            let headers = serde_json::to_string(&action.headers)?;
            let rows = db
                .connection()
                .execute(
                    r"UPDATE queued_actions SET
                      url = ?1,
                      method = ?2,
                      headers = ?3,
                      body = ?4,
                      timestamp = ?5,
                      retries = ?6
                      WHERE id = ?7",
                    params![
                        action.url,
                        action.method,
                        headers,
                        action.body,
                        action.timestamp.timestamp_micros(),
                        action.retries,
                        action.id,
                    ],
                )
                .map_err(|e| QueueError::Database(format!("Failed to update action: {e}")))?;

            if rows == 0 {
                tracing::debug!(id = %action.id, "update skipped, action no longer stored");
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<bool, QueueError> {
        let id = id.to_string();
        self.with_db(move |db| {
            let rows = db
                .connection()
                .execute("DELETE FROM queued_actions WHERE id = ?1", [&id])
                .map_err(|e| QueueError::Database(format!("Failed to delete action: {e}")))?;
            Ok(rows > 0)
        })
        .await
    }

    async fn list_ordered_by_timestamp(&self) -> Result<Vec<QueuedAction>, QueueError> {
        self.with_db(|db| {
            let mut stmt = db
                .connection()
                .prepare(
                    r"SELECT id, url, method, headers, body, timestamp, retries
                      FROM queued_actions
                      ORDER BY timestamp ASC, rowid ASC",
                )
                .map_err(|e| QueueError::Database(format!("Failed to prepare query: {e}")))?;

            let rows = stmt
                .query_map([], row_to_action)
                .map_err(|e| QueueError::Database(format!("Failed to list actions: {e}")))?;

            let mut actions = Vec::new();
            for row in rows {
                actions.push(row.map_err(|e| QueueError::Database(e.to_string()))?);
            }
            Ok(actions)
        })
        .await
    }

    async fn count(&self) -> Result<usize, QueueError> {
        self.with_db(|db| {
            let count: i64 = db
                .connection()
                .query_row("SELECT COUNT(*) FROM queued_actions", [], |row| row.get(0))
                .map_err(|e| QueueError::Database(format!("Failed to count actions: {e}")))?;
            usize::try_from(count).map_err(|e| QueueError::Database(e.to_string()))
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<QueuedAction>, QueueError> {
        let id = id.to_string();
        self.with_db(move |db| {
            db.connection()
                .query_row(
                    r"SELECT id, url, method, headers, body, timestamp, retries
                      FROM queued_actions
                      WHERE id = ?1",
                    [&id],
                    row_to_action,
                )
                .optional()
                .map_err(|e| QueueError::Database(format!("Failed to load action: {e}")))
        })
        .await
    }

    async fn clear(&self) -> Result<usize, QueueError> {
        self.with_db(|db| {
            db.connection()
                .execute("DELETE FROM queued_actions", [])
                .map_err(|e| QueueError::Database(format!("Failed to clear queue: {e}")))
        })
        .await
    }

    async fn try_lock_replay(&self, owner: &str, lease: Duration) -> Result<bool, QueueError> {
        let owner = owner.to_string();
        let now = Utc::now().timestamp_micros();
        let expires_at = now.saturating_add(i64::try_from(lease.as_micros()).unwrap_or(i64::MAX));

        self.with_db(move |db| {
            // Single statement, so the check and the claim are atomic across
            // every connection to the file.
            let rows = db
                .connection()
                .execute(
                    r"INSERT INTO replay_lock (id, owner, expires_at) VALUES (1, ?1, ?2)
                      ON CONFLICT(id) DO UPDATE SET
                      owner = excluded.owner,
                      expires_at = excluded.expires_at
                      WHERE replay_lock.owner = excluded.owner OR replay_lock.expires_at <= ?3",
                    params![owner, expires_at, now],
                )
                .map_err(|e| QueueError::Database(format!("Failed to claim replay lease: {e}")))?;
            Ok(rows > 0)
        })
        .await
    }

    async fn unlock_replay(&self, owner: &str) -> Result<(), QueueError> {
        let owner = owner.to_string();
        self.with_db(move |db| {
            db.connection()
                .execute("DELETE FROM replay_lock WHERE owner = ?1", [&owner])
                .map_err(|e| QueueError::Database(format!("Failed to release replay lease: {e}")))?;
            Ok(())
        })
        .await
    }
}

fn insert_error(id: &str, err: rusqlite::Error) -> QueueError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            QueueError::DuplicateKey(id.to_string())
        }
        other => QueueError::Database(format!("Failed to insert action: {other}")),
    }
}

fn row_to_action(row: &Row<'_>) -> Result<QueuedAction, rusqlite::Error> {
    let headers_json: String = row.get(3)?;
    let micros: i64 = row.get(5)?;
    let retries: i64 = row.get(6)?;

    let headers = serde_json::from_str(&headers_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let timestamp = DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::IntegralValueOutOfRange(5, micros)
    })?;

    let retries =
        u32::try_from(retries).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(6, retries))?;

    Ok(QueuedAction {
        id: row.get(0)?,
        url: row.get(1)?,
        method: row.get(2)?,
        headers,
        body: row.get(4)?,
        timestamp,
        retries,
    })
}

#[derive(Default)]
struct MemoryState {
    next_seq: u64,
    rows: HashMap<String, (u64, QueuedAction)>,
    replay_lease: Option<(String, Instant)>,
}

/// Process-local store with the same contract as [`SqliteStore`].
///
/// Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    state: tokio::sync::Mutex<MemoryState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn initialize(&self) -> Result<(), QueueError> {
        Ok(())
    }

    async fn insert(&self, action: &QueuedAction) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if state.rows.contains_key(&action.id) {
            return Err(QueueError::DuplicateKey(action.id.clone()));
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.rows.insert(action.id.clone(), (seq, action.clone()));
        Ok(())
    }

    async fn update(&self, action: &QueuedAction) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if let Some((_, stored)) = state.rows.get_mut(&action.id) {
            *stored = action.clone();
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, QueueError> {
        Ok(self.state.lock().await.rows.remove(id).is_some())
    }

    async fn list_ordered_by_timestamp(&self) -> Result<Vec<QueuedAction>, QueueError> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state.rows.values().collect();
        rows.sort_by_key(|(seq, action)| (action.timestamp, *seq));
        Ok(rows.into_iter().map(|(_, action)| action.clone()).collect())
    }

    async fn count(&self) -> Result<usize, QueueError> {
        Ok(self.state.lock().await.rows.len())
    }

    async fn get(&self, id: &str) -> Result<Option<QueuedAction>, QueueError> {
        Ok(self
            .state
            .lock()
            .await
            .rows
            .get(id)
            .map(|(_, action)| action.clone()))
    }

    async fn clear(&self) -> Result<usize, QueueError> {
        let mut state = self.state.lock().await;
        let removed = state.rows.len();
        state.rows.clear();
        Ok(removed)
    }

    async fn try_lock_replay(&self, owner: &str, lease: Duration) -> Result<bool, QueueError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let free = match &state.replay_lease {
            Some((holder, expires_at)) => holder == owner || *expires_at <= now,
            None => true,
        };
        if free {
            state.replay_lease = Some((owner.to_string(), now + lease));
        }
        Ok(free)
    }

    async fn unlock_replay(&self, owner: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if state
            .replay_lease
            .as_ref()
            .is_some_and(|(holder, _)| holder == owner)
        {
            state.replay_lease = None;
        }
        Ok(())
    }
}
