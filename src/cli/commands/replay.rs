//! Replay and watch command implementations.

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tokio::sync::{watch as watch_channel, Notify};

use super::Queue;
use crate::cli::args::{OutputFormat, ReplayArgs, WatchArgs};
use crate::config::Config;
use crate::error::QueueError;
use crate::output::{format_replay, to_json};
use crate::queue::{spawn_replayer, HttpDeliverer, ReplayConfig, ReplayEngine, ReplayerConfig};

/// Merge command-line overrides into the configured replay policy.
fn replay_config(config: &Config, args: &ReplayArgs) -> ReplayConfig {
    let mut replay = config.replay.to_replay_config();
    if let Some(secs) = args.timeout {
        replay.delivery_timeout = Duration::from_secs(secs);
    }
    if let Some(max) = args.max_retries {
        replay.max_retries = max;
    }
    replay
}

fn deliverer(config: &Config, args: &ReplayArgs) -> Result<HttpDeliverer, QueueError> {
    let base_url = args.base_url.clone().or_else(|| config.delivery.base_url.clone());
    HttpDeliverer::new(
        base_url,
        Duration::from_secs(config.delivery.request_timeout_secs),
    )
}

/// Execute replay command: one pass over the queue.
///
/// # Errors
///
/// Returns an error if the queue cannot be read or the HTTP client cannot
/// be built. Per-action failures are part of the output.
pub async fn replay(
    queue: Queue,
    config: &Config,
    args: &ReplayArgs,
    format: OutputFormat,
) -> Result<String, QueueError> {
    let deliver = deliverer(config, args)?;
    let engine = ReplayEngine::new(queue, replay_config(config, args));

    let summary = engine.replay(&deliver).await?;
    format_replay(&summary, format)
}

/// Execute watch command: replay periodically until Ctrl-C or SIGTERM.
///
/// On Unix, SIGUSR1 requests an immediate pass.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built or the final queue
/// size cannot be read.
pub async fn watch(
    queue: Queue,
    config: &Config,
    args: &WatchArgs,
    format: OutputFormat,
) -> Result<String, QueueError> {
    let deliver = Arc::new(deliverer(config, &args.replay)?);
    let engine = Arc::new(ReplayEngine::new(queue, replay_config(config, &args.replay)));
    let interval = Duration::from_secs(args.interval.unwrap_or(config.replay.interval_secs).max(1));

    let trigger = Arc::new(Notify::new());
    let (shutdown_tx, shutdown_rx) = watch_channel::channel(false);

    if format == OutputFormat::Pretty {
        eprintln!(
            "{} every {}s, Ctrl-C to stop",
            "Replaying".bold(),
            interval.as_secs()
        );
    }

    let handle = spawn_replayer(
        Arc::clone(&engine),
        deliver,
        ReplayerConfig { interval },
        Arc::clone(&trigger),
        shutdown_rx,
    );

    wait_for_shutdown(&trigger).await;
    let _ = shutdown_tx.send(true);
    if let Err(e) = handle.await {
        tracing::error!(error = %e, "replayer task failed");
    }

    let remaining = engine.queue().size().await?;
    match format {
        OutputFormat::Json => to_json(&serde_json::json!({ "remaining": remaining })),
        OutputFormat::Pretty => Ok(format!("Stopped, {remaining} action(s) still queued")),
    }
}

/// Resolve on Ctrl-C or SIGTERM, forwarding SIGUSR1 to `trigger`.
async fn wait_for_shutdown(trigger: &Notify) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut term, mut usr1) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::user_defined1()),
        ) {
            (Ok(term), Ok(usr1)) => (term, usr1),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "failed to install signal handler");
                return std::future::pending::<()>().await;
            }
        };

        loop {
            tokio::select! {
                _ = term.recv() => break,
                _ = usr1.recv() => trigger.notify_one(),
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = {
        let _ = trigger;
        std::future::pending::<()>()
    };

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received, stopping replayer");
}
