//! Path resolution for fieldqueue configuration and data files.
//!
//! All fieldqueue data is stored in `~/.fieldqueue/` (or `$FIELDQUEUE_HOME`):
//! - `config.yaml` - Main configuration file
//! - `queue.db` - SQLite database holding queued actions

use std::path::PathBuf;

use crate::error::QueueError;

/// Environment variable overriding the data root.
pub const HOME_ENV: &str = "FIELDQUEUE_HOME";

/// Paths to fieldqueue configuration and data files.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root directory: `~/.fieldqueue/`
    pub root: PathBuf,
    /// Config file: `~/.fieldqueue/config.yaml`
    pub config_file: PathBuf,
    /// Database file: `~/.fieldqueue/queue.db`
    pub database: PathBuf,
}

impl Paths {
    /// Resolve paths from `$FIELDQUEUE_HOME`, falling back to `$HOME/.fieldqueue`.
    ///
    /// # Errors
    ///
    /// Returns an error if neither variable is set.
    pub fn new() -> Result<Self, QueueError> {
        if let Ok(root) = std::env::var(HOME_ENV) {
            if !root.trim().is_empty() {
                return Ok(Self::with_root(PathBuf::from(root)));
            }
        }

        let home = std::env::var("HOME").map_err(|_| {
            QueueError::Config("Could not determine home directory".to_string())
        })?;

        Ok(Self::with_root(PathBuf::from(home).join(".fieldqueue")))
    }

    /// Create paths with a custom root directory (useful for testing).
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.yaml"),
            database: root.join("queue.db"),
            root,
        }
    }
}
