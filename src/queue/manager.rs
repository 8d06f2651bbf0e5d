//! Queue manager.
//!
//! Turns failed-request descriptions into persisted [`QueuedAction`]s and
//! offers read/remove access without exposing the storage engine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::action::{new_action_id, NewAction, QueuedAction};
use super::store::DurableStore;
use crate::error::QueueError;

/// Enqueue/list/remove/size over a [`DurableStore`].
///
/// Holds no copy of the queue; every call goes through the store.
pub struct QueueManager<S> {
    store: Arc<S>,
}

impl<S> Clone for QueueManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: DurableStore> QueueManager<S> {
    /// Create a manager over an owned store.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self::with_store(Arc::new(store))
    }

    /// Create a manager sharing an existing store handle.
    #[must_use]
    pub const fn with_store(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persist a failed request for later replay.
    ///
    /// Assigns a fresh id and zero retries. An id collision is logged and
    /// retried once with a new id.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::InvalidInput` for an unreplayable request and
    /// `QueueError::Persist` if the store rejects the write.
    pub async fn enqueue(&self, new: NewAction) -> Result<QueuedAction, QueueError> {
        new.validate()?;

        let mut action = QueuedAction::from_new(new);
        match self.store.insert(&action).await {
            Ok(()) => {}
            Err(QueueError::DuplicateKey(id)) => {
                tracing::warn!(%id, "queued action id collision, regenerating");
                action.id = new_action_id();
                self.store
                    .insert(&action)
                    .await
                    .map_err(|e| QueueError::Persist(e.to_string()))?;
            }
            Err(e) => return Err(QueueError::Persist(e.to_string())),
        }

        tracing::info!(id = %action.id, action = %action.label(), "action queued for replay");
        Ok(action)
    }

    /// All queued actions in replay order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn list(&self) -> Result<Vec<QueuedAction>, QueueError> {
        self.store.list_ordered_by_timestamp().await
    }

    /// Remove an action. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub async fn remove(&self, id: &str) -> Result<bool, QueueError> {
        let removed = self.store.delete(id).await?;
        if removed {
            tracing::debug!(%id, "queued action removed");
        }
        Ok(removed)
    }

    /// Number of queued actions.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn size(&self) -> Result<usize, QueueError> {
        self.store.count().await
    }

    /// Look up a single action.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn get(&self, id: &str) -> Result<Option<QueuedAction>, QueueError> {
        self.store.get(id).await
    }

    /// Drop every queued action.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub async fn clear(&self) -> Result<usize, QueueError> {
        let removed = self.store.clear().await?;
        tracing::warn!(removed, "queue cleared");
        Ok(removed)
    }

    /// Queue statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let actions = self.list().await?;

        Ok(QueueStats {
            pending: actions.len(),
            oldest: actions.first().map(|a| a.timestamp),
            newest: actions.last().map(|a| a.timestamp),
            max_retries_seen: actions.iter().map(|a| a.retries).max().unwrap_or(0),
        })
    }
}

/// Queue statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Number of queued actions
    pub pending: usize,
    /// Oldest enqueue time
    pub oldest: Option<DateTime<Utc>>,
    /// Newest enqueue time
    pub newest: Option<DateTime<Utc>>,
    /// Highest retry count among queued actions
    pub max_retries_seen: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::store::{MemoryStore, SqliteStore};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    fn create_test_queue() -> QueueManager<SqliteStore> {
        QueueManager::new(SqliteStore::in_memory())
    }

    /// Store that rejects every write, like a device over its storage quota.
    struct FullStore;

    #[async_trait]
    impl DurableStore for FullStore {
        async fn initialize(&self) -> Result<(), QueueError> {
            Ok(())
        }
        async fn insert(&self, _action: &QueuedAction) -> Result<(), QueueError> {
            Err(QueueError::Database("quota exceeded".to_string()))
        }
        async fn update(&self, _action: &QueuedAction) -> Result<(), QueueError> {
            Ok(())
        }
        async fn delete(&self, _id: &str) -> Result<bool, QueueError> {
            Ok(false)
        }
        async fn list_ordered_by_timestamp(&self) -> Result<Vec<QueuedAction>, QueueError> {
            Ok(Vec::new())
        }
        async fn count(&self) -> Result<usize, QueueError> {
            Ok(0)
        }
        async fn get(&self, _id: &str) -> Result<Option<QueuedAction>, QueueError> {
            Ok(None)
        }
        async fn clear(&self) -> Result<usize, QueueError> {
            Ok(0)
        }
    }

    /// Store whose first insert collides.
    #[derive(Default)]
    struct CollidingStore {
        inner: MemoryStore,
        inserts: AtomicUsize,
    }

    #[async_trait]
    impl DurableStore for CollidingStore {
        async fn initialize(&self) -> Result<(), QueueError> {
            Ok(())
        }
        async fn insert(&self, action: &QueuedAction) -> Result<(), QueueError> {
            if self.inserts.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(QueueError::DuplicateKey(action.id.clone()));
            }
            self.inner.insert(action).await
        }
        async fn update(&self, action: &QueuedAction) -> Result<(), QueueError> {
            self.inner.update(action).await
        }
        async fn delete(&self, id: &str) -> Result<bool, QueueError> {
            self.inner.delete(id).await
        }
        async fn list_ordered_by_timestamp(&self) -> Result<Vec<QueuedAction>, QueueError> {
            self.inner.list_ordered_by_timestamp().await
        }
        async fn count(&self) -> Result<usize, QueueError> {
            self.inner.count().await
        }
        async fn get(&self, id: &str) -> Result<Option<QueuedAction>, QueueError> {
            self.inner.get(id).await
        }
        async fn clear(&self) -> Result<usize, QueueError> {
            self.inner.clear().await
        }
    }

    #[tokio::test]
    async fn test_enqueue_and_get() {
        let queue = create_test_queue();

        let action = queue
            .enqueue(NewAction::new("POST", "/api/timeclock/in").body("{}"))
            .await
            .unwrap();
        assert_eq!(action.retries, 0);

        let loaded = queue.get(&action.id).await.unwrap().unwrap();
        assert_eq!(loaded, action);
        assert_eq!(queue.size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_is_fifo_by_timestamp() {
        let queue = create_test_queue();

        queue.enqueue(NewAction::new("POST", "/x").at(at(100))).await.unwrap();
        queue.enqueue(NewAction::new("POST", "/y").at(at(50))).await.unwrap();
        queue.enqueue(NewAction::new("POST", "/z").at(at(200))).await.unwrap();

        let urls: Vec<_> = queue.list().await.unwrap().into_iter().map(|a| a.url).collect();
        assert_eq!(urls, vec!["/y", "/x", "/z"]);
    }

    #[tokio::test]
    async fn test_remove_and_unknown_remove() {
        let queue = create_test_queue();
        let action = queue.enqueue(NewAction::new("POST", "/x")).await.unwrap();

        assert!(!queue.remove("not-a-real-id").await.unwrap());
        assert_eq!(queue.size().await.unwrap(), 1);

        assert!(queue.remove(&action.id).await.unwrap());
        assert!(queue.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_rejects_invalid() {
        let queue = create_test_queue();
        let err = queue.enqueue(NewAction::new("POST", "")).await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidInput(_)));
        assert_eq!(queue.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces_as_persist_error() {
        let queue = QueueManager::new(FullStore);
        let err = queue.enqueue(NewAction::new("POST", "/x")).await.unwrap_err();
        assert!(matches!(err, QueueError::Persist(_)), "got {err}");
    }

    #[tokio::test]
    async fn test_id_collision_is_retried() {
        let queue = QueueManager::new(CollidingStore::default());

        let action = queue.enqueue(NewAction::new("POST", "/x")).await.unwrap();

        assert_eq!(queue.size().await.unwrap(), 1);
        assert!(queue.get(&action.id).await.unwrap().is_some());
        assert_eq!(queue.store().inserts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stats() {
        let queue = create_test_queue();

        let empty = queue.stats().await.unwrap();
        assert_eq!(empty.pending, 0);
        assert!(empty.oldest.is_none());

        queue.enqueue(NewAction::new("POST", "/b").at(at(2_000))).await.unwrap();
        let mut first = queue
            .enqueue(NewAction::new("POST", "/a").at(at(1_000)))
            .await
            .unwrap();
        first.retries = 2;
        queue.store().update(&first).await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.oldest, Some(at(1_000)));
        assert_eq!(stats.newest, Some(at(2_000)));
        assert_eq!(stats.max_retries_seen, 2);
    }

    #[tokio::test]
    async fn test_clear() {
        let queue = create_test_queue();
        queue.enqueue(NewAction::new("POST", "/a")).await.unwrap();
        queue.enqueue(NewAction::new("POST", "/b")).await.unwrap();

        assert_eq!(queue.clear().await.unwrap(), 2);
        assert_eq!(queue.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clones_share_store() {
        let queue = create_test_queue();
        let other = queue.clone();

        queue.enqueue(NewAction::new("POST", "/a")).await.unwrap();
        assert_eq!(other.size().await.unwrap(), 1);
    }
}
