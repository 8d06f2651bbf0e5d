//! Background replay loop.
//!
//! Runs a replay pass at startup, then whenever the interval elapses or a
//! reconnect is signalled, until shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use super::replay::{Deliver, ReplayEngine};
use super::store::DurableStore;

/// Timing for the background replay loop.
#[derive(Debug, Clone)]
pub struct ReplayerConfig {
    /// Time between passes when no reconnect is signalled
    pub interval: Duration,
}

impl Default for ReplayerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Spawn the replay loop on the current runtime.
///
/// `trigger.notify_one()` requests an immediate pass (e.g. on reconnect).
/// Setting `shutdown` to `true`, or dropping its sender, stops the loop after
/// the current pass.
pub fn spawn_replayer<S, D>(
    engine: Arc<ReplayEngine<S>>,
    deliver: Arc<D>,
    config: ReplayerConfig,
    trigger: Arc<Notify>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    S: DurableStore + 'static,
    D: Deliver + 'static,
{
    tokio::spawn(run(engine, deliver, config, trigger, shutdown))
}

async fn run<S, D>(
    engine: Arc<ReplayEngine<S>>,
    deliver: Arc<D>,
    config: ReplayerConfig,
    trigger: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: DurableStore,
    D: Deliver,
{
    tracing::info!(interval = ?config.interval, "replayer started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        match engine.try_replay(deliver.as_ref()).await {
            Ok(Some(summary)) if summary.total() > 0 => {
                tracing::debug!(visited = summary.total(), "background replay pass done");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "background replay pass failed");
            }
        }

        tokio::select! {
            () = tokio::time::sleep(config.interval) => {}
            () = trigger.notified() => {
                tracing::debug!("replay triggered");
            }
            changed = shutdown.changed() => {
                // A dropped sender can never signal again; treat it as shutdown.
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    tracing::info!("replayer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use crate::queue::action::{NewAction, QueuedAction};
    use crate::queue::manager::QueueManager;
    use crate::queue::replay::ReplayConfig;
    use crate::queue::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn wait_for_empty(engine: &ReplayEngine<MemoryStore>) {
        for _ in 0..200 {
            if engine.queue().size().await.unwrap() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queue was not drained");
    }

    #[tokio::test]
    async fn test_replayer_drains_on_start_and_trigger() {
        let engine = Arc::new(ReplayEngine::new(
            QueueManager::new(MemoryStore::new()),
            ReplayConfig::default(),
        ));
        engine
            .queue()
            .enqueue(NewAction::new("POST", "/startup"))
            .await
            .unwrap();

        let deliver = Arc::new(|_action: QueuedAction| async { Ok::<_, DeliveryError>(true) });
        let trigger = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = spawn_replayer(
            Arc::clone(&engine),
            deliver,
            ReplayerConfig {
                interval: Duration::from_secs(3600),
            },
            Arc::clone(&trigger),
            shutdown_rx,
        );

        wait_for_empty(&engine).await;

        // Only the reconnect trigger can wake the loop before the interval.
        engine
            .queue()
            .enqueue(NewAction::new("POST", "/after-reconnect"))
            .await
            .unwrap();
        trigger.notify_one();
        wait_for_empty(&engine).await;

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_replayer_stops_when_shutdown_sender_dropped() {
        let engine = Arc::new(ReplayEngine::new(
            QueueManager::new(MemoryStore::new()),
            ReplayConfig::default(),
        ));
        engine.queue().enqueue(NewAction::new("POST", "/x")).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let deliver = Arc::new(move |_action: QueuedAction| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<bool, _>(DeliveryError::Transport("offline".to_string())) }
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(shutdown_tx);

        let handle = spawn_replayer(
            Arc::clone(&engine),
            deliver,
            ReplayerConfig {
                interval: Duration::from_secs(3600),
            },
            Arc::new(Notify::new()),
            shutdown_rx,
        );

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(calls.load(Ordering::SeqCst) <= 1);
    }

    #[tokio::test]
    async fn test_replayer_keeps_running_on_indeterminate_failures() {
        let engine = Arc::new(ReplayEngine::new(
            QueueManager::new(MemoryStore::new()),
            ReplayConfig::default(),
        ));
        let deliver = Arc::new(|_action: QueuedAction| async {
            Err::<bool, _>(DeliveryError::Transport("offline".to_string()))
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        engine.queue().enqueue(NewAction::new("POST", "/x")).await.unwrap();
        let handle = spawn_replayer(
            Arc::clone(&engine),
            deliver,
            ReplayerConfig {
                interval: Duration::from_millis(10),
            },
            Arc::new(Notify::new()),
            shutdown_rx,
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.queue().size().await.unwrap(), 1);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
