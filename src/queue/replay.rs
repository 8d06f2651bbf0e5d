//! Replay engine for draining the queue.
//!
//! Each pass snapshots the queue and offers every action, oldest first, to a
//! caller-supplied [`Deliver`] implementation:
//!
//! - `Ok(true)`: delivered, the action is removed.
//! - `Ok(false)`: explicit failure, `retries` is incremented; the action is
//!   dropped once it reaches `max_retries`, otherwise the count is persisted.
//! - `Err(_)`, a panic, or timeout: indeterminate, logged and left untouched
//!   unless [`ReplayConfig::count_indeterminate`] is set.
//!
//! Passes never overlap, within a process or across processes sharing a
//! store. Actions enqueued during a pass wait for the next one.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::Serialize;
use uuid::Uuid;

use super::action::{QueuedAction, MAX_RETRIES};
use super::manager::QueueManager;
use super::store::DurableStore;
use crate::error::{DeliveryError, QueueError};

/// Re-issues a queued action and classifies the outcome.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Deliver: Send + Sync {
    /// `Ok(true)` on success, `Ok(false)` on a definite failure, `Err` when
    /// the outcome is unknown.
    async fn deliver(&self, action: &QueuedAction) -> Result<bool, DeliveryError>;
}

#[async_trait]
impl<F, Fut> Deliver for F
where
    F: Fn(QueuedAction) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, DeliveryError>> + Send + 'static,
{
    async fn deliver(&self, action: &QueuedAction) -> Result<bool, DeliveryError> {
        (self)(action.clone()).await
    }
}

/// Retry and timeout policy for replay passes.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Explicit failures tolerated before an action is dropped
    pub max_retries: u32,
    /// Upper bound on a single delivery attempt
    pub delivery_timeout: Duration,
    /// Whether indeterminate failures count toward `max_retries`
    pub count_indeterminate: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            delivery_timeout: Duration::from_secs(30),
            count_indeterminate: false,
        }
    }
}

/// What happened to one action during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayOutcome {
    /// Delivered and removed
    Delivered,
    /// Failed, retry count persisted
    Retried,
    /// Failed for the last time and removed
    Dropped,
    /// Outcome unknown, action left as it was
    Indeterminate,
    /// The store rejected the follow-up write
    StoreError,
}

impl std::fmt::Display for ReplayOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Delivered => "delivered",
            Self::Retried => "retried",
            Self::Dropped => "dropped",
            Self::Indeterminate => "indeterminate",
            Self::StoreError => "store error",
        };
        write!(f, "{s}")
    }
}

/// Result of replaying a single action.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayResult {
    /// Action ID
    pub id: String,
    /// Method and URL
    pub label: String,
    pub outcome: ReplayOutcome,
    /// Retry count after this attempt
    pub retries: u32,
    /// Error message, if any
    pub error: Option<String>,
}

/// Result of a replay pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplaySummary {
    pub delivered: usize,
    pub retried: usize,
    pub dropped: usize,
    pub indeterminate: usize,
    pub store_errors: usize,
    /// Individual results, in delivery order
    pub results: Vec<ReplayResult>,
}

impl ReplaySummary {
    /// Create an empty summary.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            delivered: 0,
            retried: 0,
            dropped: 0,
            indeterminate: 0,
            store_errors: 0,
            results: Vec::new(),
        }
    }

    /// Add a result.
    pub fn add(&mut self, result: ReplayResult) {
        match result.outcome {
            ReplayOutcome::Delivered => self.delivered += 1,
            ReplayOutcome::Retried => self.retried += 1,
            ReplayOutcome::Dropped => self.dropped += 1,
            ReplayOutcome::Indeterminate => self.indeterminate += 1,
            ReplayOutcome::StoreError => self.store_errors += 1,
        }
        self.results.push(result);
    }

    /// Actions visited in this pass.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.delivered + self.retried + self.dropped + self.indeterminate + self.store_errors
    }

    /// Whether every visited action was delivered.
    #[must_use]
    pub const fn all_delivered(&self) -> bool {
        self.delivered == self.total()
    }
}

/// How often a waiting [`ReplayEngine::replay`] polls for the pass lease.
const LEASE_POLL: Duration = Duration::from_millis(250);

/// Lease time on top of the delivery timeout, covering the store writes that
/// follow a delivery.
const LEASE_MARGIN: Duration = Duration::from_secs(60);

/// Drains a [`QueueManager`] through a [`Deliver`] implementation.
///
/// Passes are serialized twice: an in-process mutex, and a lease in the store
/// so engines in other processes sharing the same database wait their turn.
pub struct ReplayEngine<S> {
    queue: QueueManager<S>,
    config: ReplayConfig,
    owner: String,
    in_flight: tokio::sync::Mutex<()>,
}

impl<S: DurableStore> ReplayEngine<S> {
    /// Create an engine over a queue.
    #[must_use]
    pub fn new(queue: QueueManager<S>, config: ReplayConfig) -> Self {
        Self {
            queue,
            config,
            owner: Uuid::new_v4().to_string(),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    /// The queue being drained.
    #[must_use]
    pub const fn queue(&self) -> &QueueManager<S> {
        &self.queue
    }

    /// Whether this engine is currently running a pass.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Run a pass, waiting for any in-flight pass to finish first.
    ///
    /// # Errors
    ///
    /// Returns an error only if the pass lease or the snapshot cannot be
    /// read. Per-action failures are reported in the summary.
    pub async fn replay<D>(&self, deliver: &D) -> Result<ReplaySummary, QueueError>
    where
        D: Deliver + ?Sized,
    {
        let _guard = self.in_flight.lock().await;

        let mut waiting = false;
        while !self.claim_lease().await? {
            if !waiting {
                tracing::info!("replay pass running elsewhere, waiting");
                waiting = true;
            }
            tokio::time::sleep(LEASE_POLL).await;
        }

        let summary = self.drain(deliver).await;
        self.release_lease().await;
        summary
    }

    /// Run a pass unless one is already in flight, here or in another process.
    ///
    /// Returns `Ok(None)` when the call was ignored.
    ///
    /// # Errors
    ///
    /// Returns an error only if the pass lease or the snapshot cannot be read.
    pub async fn try_replay<D>(&self, deliver: &D) -> Result<Option<ReplaySummary>, QueueError>
    where
        D: Deliver + ?Sized,
    {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::debug!("replay already in flight, skipping");
            return Ok(None);
        };
        if !self.claim_lease().await? {
            tracing::debug!("replay pass running elsewhere, skipping");
            return Ok(None);
        }

        let summary = self.drain(deliver).await;
        self.release_lease().await;
        summary.map(Some)
    }

    fn lease(&self) -> Duration {
        self.config.delivery_timeout.saturating_add(LEASE_MARGIN)
    }

    async fn claim_lease(&self) -> Result<bool, QueueError> {
        self.queue
            .store()
            .try_lock_replay(&self.owner, self.lease())
            .await
    }

    async fn release_lease(&self) {
        if let Err(e) = self.queue.store().unlock_replay(&self.owner).await {
            tracing::error!(error = %e, "replay lease could not be released");
        }
    }

    async fn drain<D>(&self, deliver: &D) -> Result<ReplaySummary, QueueError>
    where
        D: Deliver + ?Sized,
    {
        let snapshot = self.queue.list().await?;
        let mut summary = ReplaySummary::empty();

        if snapshot.is_empty() {
            tracing::debug!("replay pass: queue empty");
            return Ok(summary);
        }

        tracing::info!(count = snapshot.len(), "replay pass started");

        for action in snapshot {
            // Each delivery is bounded by the timeout, so renewing per action
            // keeps the lease ahead of the pass.
            match self.claim_lease().await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!("replay lease lost, ending pass early");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "replay lease could not be renewed, ending pass early");
                    break;
                }
            }

            let result = self.replay_one(deliver, action).await;
            summary.add(result);
        }

        tracing::info!(
            delivered = summary.delivered,
            retried = summary.retried,
            dropped = summary.dropped,
            indeterminate = summary.indeterminate,
            store_errors = summary.store_errors,
            "replay pass finished"
        );

        Ok(summary)
    }

    async fn replay_one<D>(&self, deliver: &D, action: QueuedAction) -> ReplayResult
    where
        D: Deliver + ?Sized,
    {
        tracing::debug!(
            id = %action.id,
            action = %action.label(),
            retries = action.retries,
            "replaying action"
        );

        let delivery = AssertUnwindSafe(deliver.deliver(&action)).catch_unwind();
        let attempt = tokio::time::timeout(self.config.delivery_timeout, delivery).await;

        match attempt {
            Ok(Ok(Ok(true))) => match self.queue.remove(&action.id).await {
                Ok(_) => result(&action, ReplayOutcome::Delivered, None),
                Err(e) => {
                    tracing::error!(id = %action.id, error = %e, "delivered action could not be removed");
                    result(&action, ReplayOutcome::StoreError, Some(e.to_string()))
                }
            },
            Ok(Ok(Ok(false))) => self.record_failure(action, None).await,
            Ok(Ok(Err(e))) => self.indeterminate(action, e).await,
            Ok(Err(panic)) => {
                let e = DeliveryError::Panicked(panic_message(panic.as_ref()));
                self.indeterminate(action, e).await
            }
            Err(_) => {
                let e = DeliveryError::TimedOut(self.config.delivery_timeout);
                self.indeterminate(action, e).await
            }
        }
    }

    async fn indeterminate(&self, action: QueuedAction, error: DeliveryError) -> ReplayResult {
        tracing::warn!(
            id = %action.id,
            action = %action.label(),
            error = %error,
            "delivery outcome unknown"
        );

        if self.config.count_indeterminate {
            self.record_failure(action, Some(error.to_string())).await
        } else {
            result(&action, ReplayOutcome::Indeterminate, Some(error.to_string()))
        }
    }

    async fn record_failure(&self, mut action: QueuedAction, error: Option<String>) -> ReplayResult {
        let exhausted = action.is_last_attempt(self.config.max_retries);
        action.retries = action.retries.saturating_add(1);

        if exhausted {
            tracing::warn!(
                id = %action.id,
                action = %action.label(),
                retries = action.retries,
                "retry bound reached, dropping action"
            );
            return match self.queue.remove(&action.id).await {
                Ok(_) => result(&action, ReplayOutcome::Dropped, error),
                Err(e) => {
                    tracing::error!(id = %action.id, error = %e, "exhausted action could not be removed");
                    result(&action, ReplayOutcome::StoreError, Some(e.to_string()))
                }
            };
        }

        match self.queue.store().update(&action).await {
            Ok(()) => {
                tracing::debug!(id = %action.id, retries = action.retries, "retry recorded");
                result(&action, ReplayOutcome::Retried, error)
            }
            Err(e) => {
                tracing::error!(id = %action.id, error = %e, "retry count could not be saved");
                result(&action, ReplayOutcome::StoreError, Some(e.to_string()))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn result(action: &QueuedAction, outcome: ReplayOutcome, error: Option<String>) -> ReplayResult {
    ReplayResult {
        id: action.id.clone(),
        label: action.label(),
        outcome,
        retries: action.retries,
        error,
    }
}
