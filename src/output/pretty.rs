use colored::Colorize;

use crate::queue::{QueueStats, QueuedAction, ReplayOutcome, ReplaySummary};

/// Format queued actions as a pretty table, oldest first
pub fn format_actions_pretty(actions: &[QueuedAction], limit: Option<usize>) -> String {
    if actions.is_empty() {
        return "Queued actions (0 items)\n  Nothing waiting for replay".to_string();
    }

    let mut output = format!("Queued actions ({} items)\n", actions.len());
    output.push_str(&"─".repeat(60));
    output.push('\n');

    let shown = limit.unwrap_or(actions.len());
    for action in actions.iter().take(shown) {
        let mut line = format!(
            "{} {} {}",
            short_id(&action.id).dimmed(),
            action.method.bold(),
            action.url
        );

        line.push_str(&format!(
            "  {}",
            action.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        ));

        if action.retries > 0 {
            line.push_str(&format!(
                "  {}",
                format!("retries: {}", action.retries).yellow()
            ));
        }

        output.push_str(&line);
        output.push('\n');
    }

    if shown < actions.len() {
        output.push_str(&format!(
            "  {}\n",
            format!("... and {} more", actions.len() - shown).dimmed()
        ));
    }

    output
}

/// Format a single queued action as pretty output
pub fn format_action_pretty(action: &QueuedAction) -> String {
    let mut output = format!("{} {}\n", action.method.bold(), action.url.bold());
    output.push_str(&format!("  {}: {}\n", "ID".dimmed(), action.id));
    output.push_str(&format!(
        "  {}: {}\n",
        "Queued".dimmed(),
        action.timestamp.to_rfc3339()
    ));
    output.push_str(&format!("  {}: {}\n", "Retries".dimmed(), action.retries));

    if !action.headers.is_empty() {
        output.push_str(&format!("  {}:\n", "Headers".dimmed()));
        for (name, value) in &action.headers {
            output.push_str(&format!("    {name}: {value}\n"));
        }
    }

    if let Some(body) = &action.body {
        output.push_str(&format!("  {}: {}\n", "Body".dimmed(), body));
    }

    output
}

/// Format queue statistics as pretty output
pub fn format_stats_pretty(stats: &QueueStats, max_retries: u32) -> String {
    let mut output = format!("{}\n", "Queue Status".bold());
    output.push_str(&"─".repeat(40));
    output.push('\n');

    let pending = if stats.pending == 0 {
        "0".green()
    } else {
        stats.pending.to_string().yellow()
    };
    output.push_str(&format!("  {}: {}\n", "Pending".dimmed(), pending));

    if let Some(oldest) = stats.oldest {
        output.push_str(&format!("  {}: {}\n", "Oldest".dimmed(), oldest.to_rfc3339()));
    }
    if let Some(newest) = stats.newest {
        output.push_str(&format!("  {}: {}\n", "Newest".dimmed(), newest.to_rfc3339()));
    }

    output.push_str(&format!(
        "  {}: {}/{}\n",
        "Most retries".dimmed(),
        stats.max_retries_seen,
        max_retries
    ));

    output
}

/// Format a replay pass summary as pretty output
pub fn format_replay_pretty(summary: &ReplaySummary) -> String {
    if summary.total() == 0 {
        return "Queue is empty, nothing to replay".to_string();
    }

    let mut lines = Vec::new();

    lines.push(format!(
        "{} {} action(s)",
        "Replayed".bold(),
        summary.total()
    ));
    lines.push("─".repeat(40));

    for result in &summary.results {
        let icon = match result.outcome {
            ReplayOutcome::Delivered => "✓".green(),
            ReplayOutcome::Retried => "↻".yellow(),
            ReplayOutcome::Dropped => "✗".red(),
            ReplayOutcome::Indeterminate => "?".cyan(),
            ReplayOutcome::StoreError => "!".red().bold(),
        };

        let mut line = format!("{} {}  {}", icon, result.label, result.outcome.to_string().dimmed());
        if result.outcome == ReplayOutcome::Retried {
            line.push_str(&format!(" ({})", result.retries));
        }
        if let Some(err) = &result.error {
            line.push_str(&format!("  {}", err.dimmed()));
        }
        lines.push(line);
    }

    lines.push(String::new());
    lines.push(format!(
        "{} delivered, {} retried, {} dropped, {} indeterminate",
        summary.delivered.to_string().green(),
        summary.retried.to_string().yellow(),
        summary.dropped.to_string().red(),
        summary.indeterminate.to_string().cyan()
    ));
    if summary.store_errors > 0 {
        lines.push(format!(
            "{} store error(s), see log",
            summary.store_errors.to_string().red().bold()
        ));
    }

    lines.join("\n")
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{NewAction, ReplayResult};
    use chrono::{TimeZone, Utc};

    fn make_action(id: &str, url: &str, retries: u32) -> QueuedAction {
        let mut action = QueuedAction::with_id(
            id.to_string(),
            NewAction::new("post", url).at(Utc.with_ymd_and_hms(2025, 3, 1, 8, 30, 0).unwrap()),
        );
        action.retries = retries;
        action
    }

    fn make_result(label: &str, outcome: ReplayOutcome) -> ReplayResult {
        ReplayResult {
            id: "abc".to_string(),
            label: label.to_string(),
            outcome,
            retries: 1,
            error: None,
        }
    }

    #[test]
    fn test_format_actions_pretty_empty() {
        let result = format_actions_pretty(&[], None);
        assert!(result.contains("0 items"));
        assert!(result.contains("Nothing waiting"));
    }

    #[test]
    fn test_format_actions_pretty_lists_in_order() {
        let actions = vec![
            make_action("11111111-aaaa", "/first", 0),
            make_action("22222222-bbbb", "/second", 3),
        ];
        let result = format_actions_pretty(&actions, None);

        assert!(result.contains("2 items"));
        assert!(result.contains("11111111"));
        assert!(!result.contains("11111111-aaaa"));
        assert!(result.contains("retries: 3"));
        assert!(result.find("/first").unwrap() < result.find("/second").unwrap());
    }

    #[test]
    fn test_format_actions_pretty_limit() {
        let actions = vec![
            make_action("a", "/one", 0),
            make_action("b", "/two", 0),
            make_action("c", "/three", 0),
        ];
        let result = format_actions_pretty(&actions, Some(1));

        assert!(result.contains("/one"));
        assert!(!result.contains("/two"));
        assert!(result.contains("and 2 more"));
    }

    #[test]
    fn test_format_action_pretty_details() {
        let mut action = make_action("full-id", "/api/notes", 2);
        action.headers.insert("X-Unit".to_string(), "7".to_string());
        action.body = Some("hello".to_string());

        let result = format_action_pretty(&action);
        assert!(result.contains("POST"));
        assert!(result.contains("full-id"));
        assert!(result.contains("X-Unit: 7"));
        assert!(result.contains("hello"));
        assert!(result.contains("2025-03-01T08:30:00"));
    }

    #[test]
    fn test_format_stats_pretty() {
        let stats = QueueStats {
            pending: 4,
            oldest: Some(Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()),
            newest: Some(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()),
            max_retries_seen: 2,
        };
        let result = format_stats_pretty(&stats, 5);

        assert!(result.contains("Pending"));
        assert!(result.contains('4'));
        assert!(result.contains("2/5"));
    }

    #[test]
    fn test_format_replay_pretty_empty() {
        let result = format_replay_pretty(&ReplaySummary::empty());
        assert!(result.contains("nothing to replay"));
    }

    #[test]
    fn test_format_replay_pretty_counts() {
        let mut summary = ReplaySummary::empty();
        summary.add(make_result("POST /a", ReplayOutcome::Delivered));
        summary.add(make_result("POST /b", ReplayOutcome::Indeterminate));
        summary.add(make_result("POST /c", ReplayOutcome::StoreError));

        let result = format_replay_pretty(&summary);
        assert!(result.contains("3 action(s)"));
        assert!(result.contains("POST /b"));
        assert!(result.contains("indeterminate"));
        assert!(result.contains("store error(s)"));
    }
}
