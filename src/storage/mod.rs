//! Storage layer for fieldqueue.
//!
//! This module provides the SQLite connection and schema migrations backing
//! the durable action queue.

mod database;
mod migrations;

pub use database::Database;
