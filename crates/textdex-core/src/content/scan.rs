//! Filesystem discovery for project roots.
//!
//! Walking runs on a blocking worker; stat calls fan out over rayon. The
//! result is diffed against stored snapshots so a scan only writes what
//! changed.

use crate::cancel::CancellationToken;
use crate::config::ServiceConfig;
use crate::error::{Result, TextdexError};
use crate::index::{system_time_to_nanos, FileRecord, ScanBatch};
use crate::parser::extension_of;
use crate::text::{fold, normalize};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use tracing::debug;
use walkdir::WalkDir;

/// Outcome of one `ensure_scanned` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub roots_scanned: usize,
    /// Roots that were missing or unreadable.
    pub roots_skipped: usize,
    pub files_seen: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
}

/// A supported file found on disk.
#[derive(Debug, Clone)]
pub(crate) struct DiscoveredFile {
    pub path: String,
    pub name: String,
    pub extension: String,
    pub size: u64,
    pub modified_ns: i64,
}

impl DiscoveredFile {
    pub(crate) fn into_record(self, project_id: &str) -> FileRecord {
        FileRecord {
            name_folded: fold(&normalize(&self.name)),
            path: self.path,
            project_id: project_id.to_string(),
            name: self.name,
            extension: self.extension,
            size: self.size,
            modified_ns: self.modified_ns,
        }
    }
}

/// Absolute form of `path` used as its identity in the store.
pub fn path_key(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

/// Store prefix covering `path`: directories get a trailing separator so
/// `/a/b` does not also cover `/a/bc`.
pub fn scope_prefix(path: &Path) -> String {
    let mut prefix = path_key(path);
    if path.is_dir() && !prefix.ends_with(MAIN_SEPARATOR) {
        prefix.push(MAIN_SEPARATOR);
    }
    prefix
}

/// Size and nanosecond mtime of a regular file.
pub(crate) fn stat_file(path: &Path) -> Result<(u64, i64)> {
    let metadata = std::fs::metadata(path).map_err(|e| TextdexError::io_with_path(e, path))?;
    if !metadata.is_file() {
        return Err(TextdexError::NotFound(path.to_path_buf()));
    }
    let modified_ns = metadata
        .modified()
        .map(system_time_to_nanos)
        .unwrap_or_default();
    Ok((metadata.len(), modified_ns))
}

/// Walk `root` and stat every file with a supported extension.
///
/// Unreadable entries are skipped; cancellation is checked per entry.
pub(crate) fn discover_files(
    root: &Path,
    config: &ServiceConfig,
    cancel: &CancellationToken,
) -> Result<Vec<DiscoveredFile>> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        cancel.check()?;
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if !config.is_supported_extension(&extension_of(entry.path())) {
            continue;
        }
        candidates.push(entry.into_path());
    }
    cancel.check()?;

    let files = candidates
        .par_iter()
        .filter_map(|path| match stat_file(path) {
            Ok((size, modified_ns)) => Some(DiscoveredFile {
                path: path_key(path),
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                extension: extension_of(path),
                size,
                modified_ns,
            }),
            Err(e) => {
                debug!("Skipping {}: {}", path.display(), e);
                None
            }
        })
        .collect();
    Ok(files)
}

/// Fold one root's discovered files into `batch`.
///
/// `existing` holds stored `(size, modified_ns)` snapshots under the root.
/// Stored paths that were not discovered are removed only once they are
/// really gone from disk, so an unreadable directory does not wipe its
/// records.
pub(crate) fn diff_root(
    project_id: &str,
    discovered: Vec<DiscoveredFile>,
    existing: &HashMap<String, (u64, i64)>,
    batch: &mut ScanBatch,
    summary: &mut ScanSummary,
) {
    let mut seen: HashSet<String> = HashSet::with_capacity(discovered.len());
    summary.files_seen += discovered.len();

    for file in discovered {
        seen.insert(file.path.clone());
        match existing.get(&file.path) {
            None => {
                summary.inserted += 1;
                batch.inserts.push(file.into_record(project_id));
            }
            Some(&(size, modified_ns)) if size == file.size && modified_ns == file.modified_ns => {
                summary.unchanged += 1;
            }
            Some(_) => {
                summary.updated += 1;
                batch.updates.push(file.into_record(project_id));
            }
        }
    }

    for path in existing.keys() {
        if !seen.contains(path) && !Path::new(path).exists() {
            summary.removed += 1;
            batch.removals.push(path.clone());
        }
    }
}
