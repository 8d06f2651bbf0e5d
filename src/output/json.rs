//! JSON output formatting for fieldqueue.

use serde::Serialize;
use serde_json::json;

use crate::error::QueueError;
use crate::queue::{QueuedAction, ReplaySummary};

/// Format queued actions as JSON
///
/// # Errors
///
/// Returns `QueueError::Json` if JSON serialization fails.
pub fn format_actions_json(actions: &[QueuedAction]) -> Result<String, QueueError> {
    let output = json!({
        "count": actions.len(),
        "items": actions
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format a replay summary as JSON, with the visited total
///
/// # Errors
///
/// Returns `QueueError::Json` if JSON serialization fails.
pub fn format_replay_json(summary: &ReplaySummary) -> Result<String, QueueError> {
    let output = json!({
        "total": summary.total(),
        "delivered": summary.delivered,
        "retried": summary.retried,
        "dropped": summary.dropped,
        "indeterminate": summary.indeterminate,
        "store_errors": summary.store_errors,
        "results": summary.results,
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Generic JSON formatter for any serializable type
///
/// # Errors
///
/// Returns `QueueError::Json` if JSON serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, QueueError> {
    Ok(serde_json::to_string_pretty(value)?)
}
