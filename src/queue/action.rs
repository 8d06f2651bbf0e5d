//! Queued action types.
//!
//! A [`QueuedAction`] is the verbatim shape of a state-changing HTTP request
//! that failed while the device was offline, plus the bookkeeping needed to
//! replay it later.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QueueError;

/// Explicit delivery failures tolerated before an action is dropped.
pub const MAX_RETRIES: u32 = 5;

/// A request captured for later replay.
///
/// `retries` is strictly below the configured bound for every stored action;
/// reaching the bound removes the action instead of persisting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedAction {
    /// Unique identity, assigned at enqueue time.
    pub id: String,
    /// Target URL, absolute or relative to the delivery base URL.
    pub url: String,
    /// HTTP method, upper-case.
    pub method: String,
    /// Request headers.
    pub headers: BTreeMap<String, String>,
    /// Opaque request body.
    pub body: Option<String>,
    /// Enqueue time; defines replay order.
    pub timestamp: DateTime<Utc>,
    /// Explicit failed-delivery outcomes so far.
    pub retries: u32,
}

impl QueuedAction {
    /// Materialize a new action with a fresh id and zero retries.
    #[must_use]
    pub fn from_new(new: NewAction) -> Self {
        Self::with_id(new_action_id(), new)
    }

    /// Materialize a new action under the given id.
    #[must_use]
    pub fn with_id(id: String, new: NewAction) -> Self {
        let timestamp = normalize_timestamp(new.timestamp.unwrap_or_else(Utc::now));
        Self {
            id,
            url: new.url,
            method: new.method,
            headers: new.headers,
            body: new.body,
            timestamp,
            retries: 0,
        }
    }

    /// Whether one more explicit failure reaches `max_retries`.
    #[must_use]
    pub const fn is_last_attempt(&self, max_retries: u32) -> bool {
        self.retries.saturating_add(1) >= max_retries
    }

    /// Short label used in logs and listings, e.g. `POST /api/status`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// Application-supplied description of a failed request.
///
/// Omits `id` and `retries`; those are assigned on enqueue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAction {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Enqueue time; `None` means "now".
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewAction {
    /// Describe a request by method and URL.
    #[must_use]
    pub fn new(method: impl AsRef<str>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.as_ref().trim().to_uppercase(),
            headers: BTreeMap::new(),
            body: None,
            timestamp: None,
        }
    }

    /// Add a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Pin the enqueue time instead of using the clock.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Check the request shape is replayable.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::InvalidInput` for an empty URL or method, or a
    /// method containing non-token characters.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.url.trim().is_empty() {
            return Err(QueueError::InvalidInput("URL must not be empty".to_string()));
        }
        if self.method.is_empty() {
            return Err(QueueError::InvalidInput(
                "Method must not be empty".to_string(),
            ));
        }
        if !self.method.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(QueueError::InvalidInput(format!(
                "Invalid HTTP method: {}",
                self.method
            )));
        }
        Ok(())
    }
}

/// Generate a collision-resistant action id (UUID v4).
#[must_use]
pub fn new_action_id() -> String {
    Uuid::new_v4().to_string()
}

/// Truncate to microseconds, the precision the store persists.
#[must_use]
pub fn normalize_timestamp(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}

/// Parse a `Name: value` header line.
///
/// # Errors
///
/// Returns `QueueError::InvalidInput` if there is no colon or the name is empty.
pub fn parse_header(line: &str) -> Result<(String, String), QueueError> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| QueueError::InvalidInput(format!("Header must be 'Name: value': {line}")))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(QueueError::InvalidInput(format!(
            "Header name must not be empty: {line}"
        )));
    }

    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_action_builder() {
        let new = NewAction::new("post", "/api/units/42/status")
            .header("Content-Type", "application/json")
            .body(r#"{"status":"enroute"}"#);

        assert_eq!(new.method, "POST");
        assert_eq!(new.headers.get("Content-Type").unwrap(), "application/json");
        assert!(new.timestamp.is_none());
        assert!(new.validate().is_ok());
    }

    #[test]
    fn test_from_new_assigns_identity() {
        let a = QueuedAction::from_new(NewAction::new("POST", "/x"));
        let b = QueuedAction::from_new(NewAction::new("POST", "/x"));

        assert_eq!(a.retries, 0);
        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(&a.id).is_ok());
    }

    #[test]
    fn test_pinned_timestamp_kept() {
        let ts = Utc.timestamp_millis_opt(100).unwrap();
        let action = QueuedAction::from_new(NewAction::new("PUT", "/x").at(ts));
        assert_eq!(action.timestamp, ts);
    }

    #[test]
    fn test_timestamp_normalized_to_micros() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let normalized = normalize_timestamp(ts);
        assert_eq!(normalized.timestamp_subsec_nanos(), 123_456_000);
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        assert!(NewAction::new("POST", "  ").validate().is_err());
        assert!(NewAction::new("", "/x").validate().is_err());
        assert!(NewAction::new("PO ST", "/x").validate().is_err());
    }

    #[test]
    fn test_is_last_attempt() {
        let mut action = QueuedAction::from_new(NewAction::new("POST", "/x"));
        assert!(!action.is_last_attempt(MAX_RETRIES));

        action.retries = 4;
        assert!(action.is_last_attempt(MAX_RETRIES));
        assert!(action.is_last_attempt(1));
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("X-Unit: Engine 7").unwrap(),
            ("X-Unit".to_string(), "Engine 7".to_string())
        );
        assert_eq!(
            parse_header("Authorization: Bearer a:b").unwrap().1,
            "Bearer a:b"
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_label() {
        let action = QueuedAction::from_new(NewAction::new("delete", "/api/shifts/9"));
        assert_eq!(action.label(), "DELETE /api/shifts/9");
    }
}
