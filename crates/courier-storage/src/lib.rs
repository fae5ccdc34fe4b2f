// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence for Courier.
//!
//! A WAL-mode SQLite database with embedded migrations, serialized through
//! `tokio-rusqlite`'s single background thread, plus in-memory twins of each
//! store for tests and ephemeral sessions.

pub mod cache_store;
pub mod database;
pub mod kv;
pub mod migrations;

pub use cache_store::{MemoryCacheStore, SqliteCacheStore};
pub use database::Database;
pub use kv::{MemoryKvStore, SqliteKvStore};
