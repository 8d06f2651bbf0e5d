//! Offline action queue.
//!
//! State-changing requests that fail while a field device is offline are
//! persisted here and replayed later, oldest first, with a bounded number of
//! retries.
//!
//! - [`store`]: durable storage (`SQLite` or in-memory)
//! - [`manager`]: enqueue, list, remove, size
//! - [`replay`]: replay passes and the retry/drop policy
//! - [`http`]: HTTP delivery and send-or-queue
//! - [`replayer`]: background replay on a timer or reconnect signal

pub mod action;
pub mod http;
pub mod manager;
pub mod replay;
pub mod replayer;
pub mod store;

pub use action::{parse_header, NewAction, QueuedAction, MAX_RETRIES};
pub use http::{capture_request, HttpDeliverer, OfflineClient, SendError};
pub use manager::{QueueManager, QueueStats};
pub use replay::{Deliver, ReplayConfig, ReplayEngine, ReplayOutcome, ReplayResult, ReplaySummary};
pub use replayer::{spawn_replayer, ReplayerConfig};
pub use store::{DurableStore, MemoryStore, SqliteStore};
