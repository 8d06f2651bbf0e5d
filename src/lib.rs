//! fieldqueue - durable offline queue for state-changing HTTP requests
//!
//! Requests that fail to reach the server are persisted in a SQLite-backed
//! store and replayed in enqueue order once connectivity returns. Explicit
//! rejections are retried a bounded number of times; requests whose outcome
//! is unknown are kept for a later pass.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod queue;
pub mod storage;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::{DeliveryError, QueueError};
pub use queue::{
    DurableStore, NewAction, OfflineClient, QueueManager, QueuedAction, ReplayEngine,
    ReplaySummary, SqliteStore,
};
