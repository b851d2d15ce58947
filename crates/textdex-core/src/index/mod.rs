//! SQLite store with FTS5 full-text search.
//!
//! This module provides:
//! - File records discovered by scans, grouped by project
//! - Cached content entries keyed by path
//! - An FTS5 table over cached content, kept in sync by triggers
//! - Query sanitizing for the FTS5 syntax

mod fts5;
mod query;
mod records;
mod store;

pub use fts5::{FTS5Config, FTS5Manager};
pub use query::{build_fts5_query, escape_fts5_term};
pub use records::{system_time_to_nanos, ContentIndexEntry, FileRecord, IndexStats, ScanBatch};
pub use store::IndexStore;
