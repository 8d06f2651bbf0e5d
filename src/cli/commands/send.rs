//! Send command implementation.

use std::time::Duration;

use colored::Colorize;

use super::{new_action, Queue};
use crate::cli::args::{OutputFormat, SendArgs};
use crate::config::Config;
use crate::error::QueueError;
use crate::output::to_json;
use crate::queue::{HttpDeliverer, OfflineClient, SendError};

/// Execute send command.
///
/// Prints the server response, or the queued action ID when the request
/// could not reach the server.
///
/// # Errors
///
/// Returns an error for an invalid request, or when the request failed and
/// could not be queued either.
pub async fn send(
    queue: Queue,
    config: &Config,
    args: &SendArgs,
    format: OutputFormat,
) -> Result<String, QueueError> {
    let new = new_action(&args.request)?;
    let http = HttpDeliverer::new(
        args.base_url.clone().or_else(|| config.delivery.base_url.clone()),
        Duration::from_secs(config.delivery.request_timeout_secs),
    )?;
    let client = OfflineClient::new(http, queue);
    client.set_online(!args.offline);

    match client.send(new).await {
        Ok(response) => {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            match format {
                OutputFormat::Json => to_json(&serde_json::json!({
                    "queued": false,
                    "status": status.as_u16(),
                    "body": body,
                })),
                OutputFormat::Pretty => {
                    let status_line = if status.is_success() {
                        status.to_string().green()
                    } else {
                        status.to_string().red()
                    };
                    if body.is_empty() {
                        Ok(status_line.to_string())
                    } else {
                        Ok(format!("{status_line}\n{body}"))
                    }
                }
            }
        }
        Err(SendError::Queued { id, source }) => match format {
            OutputFormat::Json => to_json(&serde_json::json!({
                "queued": true,
                "id": id,
                "error": source.to_string(),
            })),
            OutputFormat::Pretty => Ok(format!(
                "{} {}\n  {}: {}",
                "Queued for replay:".yellow(),
                id,
                "Reason".dimmed(),
                source
            )),
        },
        Err(SendError::Invalid(e)) => Err(e),
        Err(e @ SendError::Unqueued { .. }) => Err(QueueError::Persist(e.to_string())),
    }
}
