//! Command implementations for fieldqueue.
//!
//! Each command returns the text to print; `main` does the printing.

mod replay;
mod send;

pub use replay::{replay, watch};
pub use send::send;

use clap::CommandFactory;
use clap_complete::Shell;
use colored::Colorize;

use crate::cli::args::{Cli, OutputFormat, RequestArgs};
use crate::config::{Config, Paths};
use crate::error::QueueError;
use crate::output::{format_action, format_actions, format_stats, to_json};
use crate::queue::{parse_header, NewAction, QueueManager, SqliteStore};

/// Queue backed by the on-disk store, as used by every command.
pub type Queue = QueueManager<SqliteStore>;

/// Build an action description from command-line arguments.
///
/// # Errors
///
/// Returns `QueueError::InvalidInput` for a malformed header.
pub fn new_action(args: &RequestArgs) -> Result<NewAction, QueueError> {
    let mut new = NewAction::new(&args.method, args.url.clone());
    for line in &args.headers {
        let (name, value) = parse_header(line)?;
        new = new.header(name, value);
    }
    if let Some(body) = &args.body {
        new = new.body(body.clone());
    }
    Ok(new)
}

/// Execute enqueue command
///
/// # Errors
///
/// Returns an error if the request is invalid or cannot be persisted.
pub async fn enqueue(
    queue: &Queue,
    args: &RequestArgs,
    format: OutputFormat,
) -> Result<String, QueueError> {
    let action = queue.enqueue(new_action(args)?).await?;

    match format {
        OutputFormat::Json => to_json(&action),
        OutputFormat::Pretty => Ok(format!(
            "{} {} (ID: {})",
            "Queued".green(),
            action.label(),
            action.id
        )),
    }
}

/// Execute list command
///
/// # Errors
///
/// Returns an error if the store cannot be read or output formatting fails.
pub async fn list(
    queue: &Queue,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<String, QueueError> {
    let mut actions = queue.list().await?;
    if format == OutputFormat::Json {
        if let Some(limit) = limit {
            actions.truncate(limit);
        }
    }
    format_actions(&actions, limit, format)
}

/// Execute show command
///
/// # Errors
///
/// Returns `QueueError::NotFound` if no action has this ID.
pub async fn show(queue: &Queue, id: &str, format: OutputFormat) -> Result<String, QueueError> {
    let action = queue
        .get(id)
        .await?
        .ok_or_else(|| QueueError::NotFound(format!("Queued action with ID: {id}")))?;
    format_action(&action, format)
}

/// Execute remove command. Unknown IDs are reported, not treated as errors.
///
/// # Errors
///
/// Returns an error if the store cannot be written.
pub async fn remove(queue: &Queue, id: &str, format: OutputFormat) -> Result<String, QueueError> {
    let removed = queue.remove(id).await?;

    match format {
        OutputFormat::Json => to_json(&serde_json::json!({ "id": id, "removed": removed })),
        OutputFormat::Pretty if removed => Ok(format!("Removed queued action: {id}")),
        OutputFormat::Pretty => Ok(format!("No queued action with ID: {id}")),
    }
}

/// Execute size command
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn size(queue: &Queue, format: OutputFormat) -> Result<String, QueueError> {
    let size = queue.size().await?;

    match format {
        OutputFormat::Json => to_json(&serde_json::json!({ "size": size })),
        OutputFormat::Pretty => Ok(size.to_string()),
    }
}

/// Execute status command
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn status(
    queue: &Queue,
    max_retries: u32,
    format: OutputFormat,
) -> Result<String, QueueError> {
    let stats = queue.stats().await?;
    format_stats(&stats, max_retries, format)
}

/// Execute clear command
///
/// # Errors
///
/// Returns an error without `--force`, or if the store cannot be written.
pub async fn clear(queue: &Queue, force: bool, format: OutputFormat) -> Result<String, QueueError> {
    if !force {
        return Err(QueueError::InvalidInput(
            "Use --force to discard all queued actions".to_string(),
        ));
    }

    let cleared = queue.clear().await?;

    match format {
        OutputFormat::Json => to_json(&serde_json::json!({ "cleared": cleared })),
        OutputFormat::Pretty => Ok(format!("Cleared {cleared} queued action(s)")),
    }
}

/// Write the default config to `paths.config_file`.
///
/// # Errors
///
/// Returns an error if the file exists and `force` is not set, or if the
/// file cannot be written.
pub fn init(paths: &Paths, force: bool, format: OutputFormat) -> Result<String, QueueError> {
    let path = &paths.config_file;
    if path.exists() && !force {
        return Err(QueueError::InvalidInput(format!(
            "{} already exists; use --force to overwrite",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Config::default().save_to_path(path)?;

    match format {
        OutputFormat::Json => to_json(&serde_json::json!({ "config": path })),
        OutputFormat::Pretty => Ok(format!("{} {}", "Wrote".green(), path.display())),
    }
}

/// Generate a completion script for `shell`.
///
/// # Errors
///
/// Returns an error if the generated script is not valid UTF-8.
pub fn completions(shell: Shell) -> Result<String, QueueError> {
    let mut cmd = Cli::command();
    let mut buf = Vec::new();
    clap_complete::generate(shell, &mut cmd, "fieldqueue", &mut buf);
    String::from_utf8(buf).map_err(|e| QueueError::InvalidInput(format!("UTF-8 error: {e}")))
}
