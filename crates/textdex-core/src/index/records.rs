//! Rows stored in the index database.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A file discovered by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Absolute path; the record's identity.
    pub path: String,
    pub project_id: String,
    /// File name as shown to users.
    pub name: String,
    /// `fold(normalize(name))`.
    pub name_folded: String,
    /// Lowercase, without the dot.
    pub extension: String,
    pub size: u64,
    /// Last-modified time in nanoseconds since the Unix epoch.
    pub modified_ns: i64,
}

/// Cached, normalized text of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentIndexEntry {
    pub path: String,
    /// Normalized text, the sentinel line, then the folded twin.
    pub merged_text: String,
    /// SHA-256 of the raw file bytes; `None` when hashing failed.
    pub content_hash: Option<String>,
    /// Size and mtime of the file when the entry was built or last confirmed.
    pub file_size: u64,
    pub modified_ns: i64,
    /// RFC 3339 timestamp of the last build or confirmation.
    pub indexed_at: String,
}

impl ContentIndexEntry {
    /// Cheap validity check against a fresh stat.
    pub fn matches_stat(&self, size: u64, modified_ns: i64) -> bool {
        self.file_size == size && self.modified_ns == modified_ns
    }
}

/// Counts reported by [`super::IndexStore::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub project_count: usize,
    pub file_count: usize,
    pub content_count: usize,
    pub fts_rows: usize,
}

/// Changes produced by one scan, applied in a single transaction.
#[derive(Debug, Clone, Default)]
pub struct ScanBatch {
    pub inserts: Vec<FileRecord>,
    pub updates: Vec<FileRecord>,
    /// Paths whose files no longer exist.
    pub removals: Vec<String>,
}

impl ScanBatch {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.removals.is_empty()
    }
}

/// Nanoseconds since the Unix epoch; times before the epoch map to negative
/// values.
pub fn system_time_to_nanos(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_nanos()).unwrap_or(i64::MAX),
    }
}
