//! Output formatting for fieldqueue.
//!
//! This module provides formatters for displaying queue contents and replay
//! results in various formats.

mod json;
mod pretty;

use crate::cli::args::OutputFormat;
use crate::error::QueueError;
use crate::queue::{QueueStats, QueuedAction, ReplaySummary};

pub use json::*;
pub use pretty::*;

/// Format queued actions based on output format
///
/// # Errors
///
/// Returns `QueueError::Json` if JSON serialization fails.
pub fn format_actions(
    actions: &[QueuedAction],
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<String, QueueError> {
    match format {
        OutputFormat::Pretty => Ok(format_actions_pretty(actions, limit)),
        OutputFormat::Json => format_actions_json(actions),
    }
}

/// Format a single queued action based on output format
///
/// # Errors
///
/// Returns `QueueError::Json` if JSON serialization fails.
pub fn format_action(action: &QueuedAction, format: OutputFormat) -> Result<String, QueueError> {
    match format {
        OutputFormat::Pretty => Ok(format_action_pretty(action)),
        OutputFormat::Json => to_json(action),
    }
}

/// Format queue statistics based on output format
///
/// # Errors
///
/// Returns `QueueError::Json` if JSON serialization fails.
pub fn format_stats(
    stats: &QueueStats,
    max_retries: u32,
    format: OutputFormat,
) -> Result<String, QueueError> {
    match format {
        OutputFormat::Pretty => Ok(format_stats_pretty(stats, max_retries)),
        OutputFormat::Json => to_json(stats),
    }
}

/// Format a replay summary based on output format
///
/// # Errors
///
/// Returns `QueueError::Json` if JSON serialization fails.
pub fn format_replay(summary: &ReplaySummary, format: OutputFormat) -> Result<String, QueueError> {
    match format {
        OutputFormat::Pretty => Ok(format_replay_pretty(summary)),
        OutputFormat::Json => format_replay_json(summary),
    }
}
