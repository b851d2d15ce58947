//! Cached, normalized document text with a staleness protocol.
//!
//! A cached entry is served when the file's size and modification time still
//! match. When they don't, the file is re-hashed: an unchanged hash only
//! refreshes the stored stat, anything else rebuilds the entry from a fresh
//! parse.
//!
//! Stored text is a merged blob: the normalized text, a sentinel line, then
//! the folded twin of the normalized text. Both halves feed full-text search;
//! only the first half is ever scanned for matches.

mod gate;
mod hashing;
mod scan;

pub use gate::{BuildGuard, IndexGate};
pub use hashing::{compute_content_hash, compute_content_hash_async};
pub use scan::{path_key, scope_prefix, ScanSummary};

use crate::cancel::CancellationToken;
use crate::config::ServiceConfig;
use crate::error::{Result, TextdexError};
use crate::index::{ContentIndexEntry, IndexStore};
use crate::parser::{extension_of, DocumentParser, ParsedDocument, ParserRegistry};
use crate::text::{normalize, TextFolder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Line separating the normalized text from its folded twin.
pub const SENTINEL_LINE: &str = "\u{1e}textdex:folded\u{1e}";

/// Join normalized text and its folded twin into one stored blob.
pub fn merge_text(normalized: &str, folded: &str) -> String {
    let mut merged = String::with_capacity(normalized.len() + folded.len() + SENTINEL_LINE.len() + 2);
    merged.push_str(normalized);
    merged.push('\n');
    merged.push_str(SENTINEL_LINE);
    merged.push('\n');
    merged.push_str(folded);
    merged
}

/// The normalized half of a merged blob. Text without a sentinel is returned
/// whole.
pub fn normalized_part(merged: &str) -> &str {
    let marker = format!("\n{}\n", SENTINEL_LINE);
    match merged.find(&marker) {
        Some(at) => &merged[..at],
        None => merged,
    }
}

/// Size and mtime of `path`, read on a blocking worker.
async fn stat_blocking(path: &Path) -> Result<(u64, i64)> {
    let stat_path = path.to_path_buf();
    tokio::task::spawn_blocking(move || scan::stat_file(&stat_path))
        .await
        .map_err(|e| TextdexError::Other(format!("stat task failed: {}", e)))?
}

/// Snapshot of the content index's work counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentIndexStats {
    /// Parser invocations.
    pub parses: u64,
    /// Full-file hashes computed.
    pub hash_computations: u64,
    /// Entries served because size and mtime matched.
    pub fast_path_hits: u64,
    /// Entries kept after a stat mismatch because the hash still matched.
    pub hash_revalidations: u64,
    /// Entries written from a fresh parse.
    pub rebuilds: u64,
}

#[derive(Debug, Default)]
struct Counters {
    parses: AtomicU64,
    hash_computations: AtomicU64,
    fast_path_hits: AtomicU64,
    hash_revalidations: AtomicU64,
    rebuilds: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ContentIndexStats {
        ContentIndexStats {
            parses: self.parses.load(Ordering::Relaxed),
            hash_computations: self.hash_computations.load(Ordering::Relaxed),
            fast_path_hits: self.fast_path_hits.load(Ordering::Relaxed),
            hash_revalidations: self.hash_revalidations.load(Ordering::Relaxed),
            rebuilds: self.rebuilds.load(Ordering::Relaxed),
        }
    }
}

/// Content index over an [`IndexStore`].
pub struct ContentIndex {
    store: Arc<IndexStore>,
    parsers: ParserRegistry,
    folder: Arc<TextFolder>,
    gate: IndexGate,
    config: ServiceConfig,
    counters: Counters,
}

impl ContentIndex {
    pub fn new(
        store: Arc<IndexStore>,
        parsers: ParserRegistry,
        folder: Arc<TextFolder>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            gate: IndexGate::new(config.max_parallelism),
            store,
            parsers,
            folder,
            config,
            counters: Counters::default(),
        }
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    pub fn folder(&self) -> &Arc<TextFolder> {
        &self.folder
    }

    pub fn gate(&self) -> &IndexGate {
        &self.gate
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn stats(&self) -> ContentIndexStats {
        self.counters.snapshot()
    }

    /// Merged text of `path`, from cache when still valid, otherwise from a
    /// fresh parse.
    ///
    /// Returns `NotFound` when the file is missing (dropping any cached entry)
    /// and `UnsupportedType` when no parser claims it. A parse that fails or
    /// times out yields empty text and leaves the cache untouched.
    pub async fn get_or_build(&self, path: &Path, cancel: &CancellationToken) -> Result<String> {
        cancel.check()?;
        let key = path_key(path);
        let path = PathBuf::from(&key);

        let _build = self.gate.build_lock(&key).await;
        cancel.check()?;

        let (size, modified_ns) = match stat_blocking(&path).await {
            Ok(stat) => stat,
            Err(e @ TextdexError::NotFound(_)) => {
                let _store = self.gate.store().await;
                if self.store.delete_content(&key)? {
                    debug!("Dropped cached content of vanished file: {}", key);
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let cached = {
            let _store = self.gate.store().await;
            self.store.get_content(&key)?
        };

        let mut known_hash = None;
        if let Some(entry) = cached {
            if entry.matches_stat(size, modified_ns) {
                Counters::bump(&self.counters.fast_path_hits);
                return Ok(entry.merged_text);
            }

            if let Some(stored_hash) = entry.content_hash.as_deref() {
                match self.hash_file(&path, cancel).await {
                    Ok(current) if current == stored_hash => {
                        {
                            let _store = self.gate.store().await;
                            self.store.confirm_content(&key, size, modified_ns)?;
                        }
                        Counters::bump(&self.counters.hash_revalidations);
                        debug!("Content unchanged after touch: {}", key);
                        return Ok(entry.merged_text);
                    }
                    Ok(current) => {
                        debug!("Content changed: {}", key);
                        known_hash = Some(current);
                    }
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => warn!("Revalidation hash failed, rebuilding {}: {}", key, e),
                }
            }
        }

        self.rebuild(&path, &key, size, modified_ns, known_hash, cancel).await
    }

    /// Text of a batch-loaded `entry` if it still matches the file's current
    /// stat. `None` means the caller must go through [`Self::get_or_build`].
    pub async fn current_text(&self, entry: ContentIndexEntry) -> Option<String> {
        match stat_blocking(Path::new(&entry.path)).await {
            Ok((size, modified_ns)) if entry.matches_stat(size, modified_ns) => {
                Counters::bump(&self.counters.fast_path_hits);
                Some(entry.merged_text)
            }
            _ => None,
        }
    }

    /// Parse and hash `path`, then store the result. `known_hash` is a hash
    /// already taken of the current bytes; hashing is skipped when present.
    async fn rebuild(
        &self,
        path: &Path,
        key: &str,
        size: u64,
        modified_ns: i64,
        known_hash: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let extension = extension_of(path);
        let parser = self
            .parsers
            .find(&extension)
            .ok_or_else(|| TextdexError::UnsupportedType {
                path: path.to_path_buf(),
                extension: extension.clone(),
            })?;

        let _permit = self.gate.work_permit().await?;
        cancel.check()?;

        let start = Instant::now();
        let hash = async {
            match known_hash {
                Some(hash) => Ok(hash),
                None => self.hash_file(path, cancel).await,
            }
        };
        let (parsed, hashed) = tokio::join!(
            self.parse_with_timeout(parser.as_ref(), path, cancel),
            hash
        );

        let raw = match parsed {
            Ok(document) => document.text,
            Err(e @ (TextdexError::Cancelled | TextdexError::NotFound(_))) => return Err(e),
            Err(e) => {
                warn!("Indexing {} as empty: {}", key, e);
                return Ok(String::new());
            }
        };
        let content_hash = match hashed {
            Ok(hash) => Some(hash),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!("Storing {} without a content hash: {}", key, e);
                None
            }
        };

        let folder = self.folder.clone();
        let merged_text = tokio::task::spawn_blocking(move || {
            let normalized = normalize(&raw);
            let folded = folder.build_folded_and_map(&normalized);
            merge_text(&normalized, &folded.text)
        })
        .await
        .map_err(|e| TextdexError::Other(format!("fold task failed: {}", e)))?;
        cancel.check()?;

        let entry = ContentIndexEntry {
            path: key.to_string(),
            merged_text,
            content_hash,
            file_size: size,
            modified_ns,
            indexed_at: chrono::Utc::now().to_rfc3339(),
        };
        {
            let _store = self.gate.store().await;
            self.store.upsert_content(&entry)?;
        }
        Counters::bump(&self.counters.rebuilds);
        debug!("Indexed {} ({} bytes) in {:?}", key, size, start.elapsed());

        Ok(entry.merged_text)
    }

    /// Run a parser under the configured timeout, racing cancellation.
    async fn parse_with_timeout(
        &self,
        parser: &dyn DocumentParser,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<ParsedDocument> {
        Counters::bump(&self.counters.parses);
        let timeout = self.config.parse_timeout;

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(TextdexError::Cancelled),
            outcome = tokio::time::timeout(timeout, parser.parse(path, cancel)) => outcome,
        };

        match outcome {
            Ok(Ok(document)) => Ok(document),
            Ok(Err(
                e @ (TextdexError::Cancelled
                | TextdexError::NotFound(_)
                | TextdexError::ParseFailure { .. }),
            )) => Err(e),
            Ok(Err(e)) => Err(TextdexError::ParseFailure {
                parser: parser.name().to_string(),
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(_) => Err(TextdexError::ParseTimeout {
                path: path.to_path_buf(),
                timeout,
            }),
        }
    }

    async fn hash_file(&self, path: &Path, cancel: &CancellationToken) -> Result<String> {
        Counters::bump(&self.counters.hash_computations);
        tokio::select! {
            _ = cancel.cancelled() => Err(TextdexError::Cancelled),
            hash = compute_content_hash_async(path) => hash,
        }
    }

    /// Bring the file records under `scope_path` (or, without a scope, under
    /// every registered root of the project) in line with the filesystem.
    ///
    /// Missing or unreadable roots are skipped. All changes from one call are
    /// committed in a single transaction.
    pub async fn ensure_scanned(
        &self,
        project_id: &str,
        scope_path: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<ScanSummary> {
        cancel.check()?;
        let start = Instant::now();

        let roots: Vec<PathBuf> = match scope_path {
            Some(scope) => vec![PathBuf::from(path_key(scope))],
            None => {
                let _store = self.gate.store().await;
                self.store
                    .project_roots(project_id)?
                    .into_iter()
                    .map(PathBuf::from)
                    .collect()
            }
        };

        let mut summary = ScanSummary::default();
        let mut batch = crate::index::ScanBatch::default();

        for root in roots {
            cancel.check()?;
            if !root.exists() {
                warn!("Skipping missing root: {}", root.display());
                summary.roots_skipped += 1;
                continue;
            }

            let walk_root = root.clone();
            let config = self.config.clone();
            let walk_cancel = cancel.clone();
            let discovered = tokio::task::spawn_blocking(move || {
                scan::discover_files(&walk_root, &config, &walk_cancel)
            })
            .await
            .map_err(|e| TextdexError::Other(format!("scan task failed: {}", e)))?;

            let discovered = match discovered {
                Ok(files) => files,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("Skipping root {}: {}", root.display(), e);
                    summary.roots_skipped += 1;
                    continue;
                }
            };

            let prefix = scope_prefix(&root);
            let existing = {
                let _store = self.gate.store().await;
                self.store.file_snapshots(Some(&prefix))?
            };
            scan::diff_root(project_id, discovered, &existing, &mut batch, &mut summary);
            summary.roots_scanned += 1;
        }

        cancel.check()?;
        {
            let _store = self.gate.store().await;
            self.store.apply_scan(&batch)?;
        }

        info!(
            "Scanned project {}: {} files seen, {} new, {} changed, {} removed in {:?}",
            project_id,
            summary.files_seen,
            summary.inserted,
            summary.updated,
            summary.removed,
            start.elapsed()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn content_index() -> ContentIndex {
        ContentIndex::new(
            Arc::new(IndexStore::open_in_memory().unwrap()),
            ParserRegistry::with_defaults(),
            Arc::new(TextFolder::new()),
            ServiceConfig::default(),
        )
    }

    #[test]
    fn test_merge_and_split() {
        let merged = merge_text("tiếng việt", "tieng viet");
        assert!(merged.contains(SENTINEL_LINE));
        assert_eq!(normalized_part(&merged), "tiếng việt");
        assert_eq!(normalized_part("no sentinel"), "no sentinel");
    }

    #[tokio::test]
    async fn test_build_then_fast_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "Nguyễn Văn A").unwrap();
        let index = content_index();
        let cancel = CancellationToken::new();

        let first = index.get_or_build(&path, &cancel).await.unwrap();
        assert_eq!(normalized_part(&first), "nguyễn văn a");
        assert!(first.ends_with("nguyen van a"));

        let second = index.get_or_build(&path, &cancel).await.unwrap();
        assert_eq!(first, second);

        let stats = index.stats();
        assert_eq!(stats.parses, 1);
        assert_eq!(stats.rebuilds, 1);
        assert_eq!(stats.fast_path_hits, 1);
        assert_eq!(stats.hash_computations, 1);
    }

    #[tokio::test]
    async fn test_missing_and_unsupported() {
        let dir = TempDir::new().unwrap();
        let index = content_index();
        let cancel = CancellationToken::new();

        let missing = index.get_or_build(&dir.path().join("nope.txt"), &cancel).await;
        assert!(matches!(missing, Err(TextdexError::NotFound(_))));

        let exe = dir.path().join("tool.exe");
        std::fs::write(&exe, "MZ").unwrap();
        let unsupported = index.get_or_build(&exe, &cancel).await;
        assert!(matches!(unsupported, Err(TextdexError::UnsupportedType { .. })));
        assert_eq!(index.store().stats().unwrap().content_count, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "x").unwrap();
        let index = content_index();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = index.get_or_build(&path, &cancel).await;
        assert!(matches!(result, Err(TextdexError::Cancelled)));
        assert_eq!(index.stats().parses, 0);
    }

    #[tokio::test]
    async fn test_ensure_scanned_registered_roots() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("b.md"), "b").unwrap();

        let index = content_index();
        let root = path_key(dir.path());
        index.store().add_project_root("proj", &root).unwrap();
        index
            .store()
            .add_project_root("proj", &format!("{}-missing", root))
            .unwrap();
        let cancel = CancellationToken::new();

        let summary = index.ensure_scanned("proj", None, &cancel).await.unwrap();
        assert_eq!(summary.roots_scanned, 1);
        assert_eq!(summary.roots_skipped, 1);
        assert_eq!(summary.inserted, 2);

        std::fs::remove_file(dir.path().join("a.txt")).unwrap();
        let summary = index.ensure_scanned("proj", None, &cancel).await.unwrap();
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(index.store().files_in_scope("proj", None).unwrap().len(), 1);
    }
}
