//! Tiered search over a project's files.
//!
//! Tiers run in order and each path is reported at most once:
//! 1. full-text lookup in the FTS5 index, confirmed by the match finder;
//! 2. file name match;
//! 3. on-demand parse of the remaining candidates, bounded by a multiple of
//!    `max_results`.
//!
//! Results stream through the `on_found` callback as they are confirmed.

use crate::cancel::CancellationToken;
use crate::config::{SearchDefaults, ServiceConfig};
use crate::content::{path_key, scope_prefix, ContentIndex, ContentIndexStats, ScanSummary};
use crate::error::{Result, TextdexError};
use crate::index::{build_fts5_query, ContentIndexEntry, FileRecord, IndexStats, IndexStore};
use crate::parser::ParserRegistry;
use crate::text::{fold, normalize, TextFolder};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::matcher::{find_matches, match_filename, SearchMatch};

/// Parameters of one search call.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub project_id: String,
    /// Restrict results to this directory or file.
    pub scope_path: Option<PathBuf>,
    pub max_results: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            project_id: project_id.into(),
            scope_path: None,
            max_results: SearchDefaults::MAX_RESULTS,
        }
    }

    pub fn with_scope(mut self, scope_path: impl Into<PathBuf>) -> Self {
        self.scope_path = Some(scope_path.into());
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

/// Paths emitted so far in one search call.
struct Emissions {
    paths: Vec<String>,
    seen: HashSet<String>,
    max_results: usize,
    per_tier: [usize; 3],
}

impl Emissions {
    fn new(max_results: usize) -> Self {
        Self {
            paths: Vec::new(),
            seen: HashSet::new(),
            max_results,
            per_tier: [0; 3],
        }
    }

    fn is_full(&self) -> bool {
        self.paths.len() >= self.max_results
    }

    fn contains(&self, path: &str) -> bool {
        self.seen.contains(path)
    }

    /// Report `record` unless the cap is reached or it was already reported.
    fn emit<F>(
        &mut self,
        tier: usize,
        record: &FileRecord,
        matches: &[SearchMatch],
        on_found: &mut F,
    ) where
        F: FnMut(&FileRecord, &[SearchMatch]),
    {
        if self.is_full() || !self.seen.insert(record.path.clone()) {
            return;
        }
        on_found(record, matches);
        self.paths.push(record.path.clone());
        self.per_tier[tier - 1] += 1;
    }
}

/// Entry point for scanning, indexing and searching.
pub struct SearchService {
    content: ContentIndex,
}

impl SearchService {
    /// Build a service over an existing store.
    pub fn new(
        store: Arc<IndexStore>,
        parsers: ParserRegistry,
        config: ServiceConfig,
    ) -> Result<Self> {
        config.validate()?;
        let content = ContentIndex::new(store, parsers, Arc::new(TextFolder::new()), config);
        Ok(Self { content })
    }

    /// Open (or create) the database at `db_path` with the default parsers.
    pub fn open(db_path: impl Into<PathBuf>, config: ServiceConfig) -> Result<Self> {
        let store = IndexStore::open(db_path)?;
        Self::new(Arc::new(store), ParserRegistry::with_defaults(), config)
    }

    pub fn content_index(&self) -> &ContentIndex {
        &self.content
    }

    fn store(&self) -> &IndexStore {
        self.content.store()
    }

    /// Register a root directory for `project_id`. Returns `false` if it was
    /// already registered.
    pub fn register_project_root(&self, project_id: &str, root: &Path) -> Result<bool> {
        if !root.is_dir() {
            return Err(TextdexError::NotFound(root.to_path_buf()));
        }
        let root = path_key(root);
        let added = self.store().add_project_root(project_id, &root)?;
        if added {
            info!("Registered root {} for project {}", root, project_id);
        }
        Ok(added)
    }

    pub async fn ensure_files_scanned(
        &self,
        project_id: &str,
        scope_path: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<ScanSummary> {
        self.content.ensure_scanned(project_id, scope_path, cancel).await
    }

    /// The merged text search works on, for previews and highlighting.
    pub async fn get_or_build_indexed_content(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.content.get_or_build(path, cancel).await
    }

    pub fn index_stats(&self) -> Result<IndexStats> {
        self.store().stats()
    }

    pub fn content_stats(&self) -> ContentIndexStats {
        self.content.stats()
    }

    /// Merge full-text index segments and truncate the WAL. With `rebuild`,
    /// the full-text index is first rebuilt from the cached content.
    pub async fn compact(&self, rebuild: bool) -> Result<()> {
        let _store = self.content.gate().store().await;
        let start = Instant::now();
        if rebuild {
            self.store().rebuild_fts5()?;
        }
        self.store().optimize_fts5()?;
        self.store().checkpoint_wal()?;
        info!("Compacted index (rebuild: {}) in {:?}", rebuild, start.elapsed());
        Ok(())
    }

    /// Run the three tiers and return the emitted paths in emission order.
    ///
    /// `on_found` is called once per path, before this returns. Cancellation
    /// ends the call with [`TextdexError::Cancelled`]; nothing is emitted
    /// after the token is observed as cancelled.
    pub async fn search<F>(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
        mut on_found: F,
    ) -> Result<Vec<String>>
    where
        F: FnMut(&FileRecord, &[SearchMatch]),
    {
        cancel.check()?;
        let query_normalized = normalize(request.query.trim());
        let query_folded = fold(&query_normalized);
        if query_normalized.is_empty() || request.max_results == 0 {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let prefix = request.scope_path.as_deref().map(scope_prefix);
        let mut emissions = Emissions::new(request.max_results);

        self.search_index(
            request,
            prefix.as_deref(),
            &query_normalized,
            &query_folded,
            &mut emissions,
            cancel,
            &mut on_found,
        )
        .await?;

        if !emissions.is_full() {
            let candidates = self
                .store()
                .files_in_scope(&request.project_id, prefix.as_deref())?;

            self.search_filenames(
                &candidates,
                &query_normalized,
                &query_folded,
                &mut emissions,
                cancel,
                &mut on_found,
            )?;

            if !emissions.is_full() {
                self.search_on_demand(
                    &candidates,
                    &query_normalized,
                    &query_folded,
                    &mut emissions,
                    cancel,
                    &mut on_found,
                )
                .await?;
            }
        }

        info!(
            "Search {:?} in {}: {} results (index {}, filename {}, on-demand {}) in {:?}",
            request.query,
            request.project_id,
            emissions.paths.len(),
            emissions.per_tier[0],
            emissions.per_tier[1],
            emissions.per_tier[2],
            start.elapsed()
        );
        Ok(emissions.paths)
    }

    /// Tier 1.
    #[allow(clippy::too_many_arguments)]
    async fn search_index<F>(
        &self,
        request: &SearchRequest,
        prefix: Option<&str>,
        query_normalized: &str,
        query_folded: &str,
        emissions: &mut Emissions,
        cancel: &CancellationToken,
        on_found: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&FileRecord, &[SearchMatch]),
    {
        let fts_query = build_fts5_query(query_normalized);
        if fts_query.is_empty() {
            return Ok(());
        }

        let hits = match self.store().search_content(
            &fts_query,
            &request.project_id,
            prefix,
            request.max_results,
        ) {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Full-text lookup failed, falling back: {}", e);
                return Ok(());
            }
        };

        for path in hits {
            cancel.check()?;
            if emissions.is_full() {
                break;
            }
            if emissions.contains(&path) {
                continue;
            }

            let record = match self.store().get_file(&path)? {
                Some(record) => record,
                None => continue,
            };
            let text = match self.content.get_or_build(Path::new(&path), cancel).await {
                Ok(text) => text,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) if e.is_per_file() => {
                    debug!("Skipping index hit {}: {}", path, e);
                    continue;
                }
                Err(e) => {
                    warn!("Failed to load index hit {}: {}", path, e);
                    continue;
                }
            };

            let matches = find_matches(self.content.folder(), &text, query_normalized, query_folded);
            if matches.is_empty() {
                continue;
            }
            cancel.check()?;
            emissions.emit(1, &record, &matches, on_found);
        }
        Ok(())
    }

    /// Tier 2.
    fn search_filenames<F>(
        &self,
        candidates: &[FileRecord],
        query_normalized: &str,
        query_folded: &str,
        emissions: &mut Emissions,
        cancel: &CancellationToken,
        on_found: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&FileRecord, &[SearchMatch]),
    {
        for record in candidates {
            cancel.check()?;
            if emissions.is_full() {
                break;
            }
            if emissions.contains(&record.path) {
                continue;
            }
            if !record.name_folded.contains(query_folded)
                && !normalize(&record.name).contains(query_normalized)
            {
                continue;
            }
            if let Some(name_match) =
                match_filename(self.content.folder(), &record.name, query_normalized, query_folded)
            {
                emissions.emit(2, record, std::slice::from_ref(&name_match), on_found);
            }
        }
        Ok(())
    }

    /// Tier 3. Cached entries still matching the file's current stat are
    /// used directly; everything else goes through the content index, with at most
    /// `max_parallelism` lookups in flight.
    async fn search_on_demand<F>(
        &self,
        candidates: &[FileRecord],
        query_normalized: &str,
        query_folded: &str,
        emissions: &mut Emissions,
        cancel: &CancellationToken,
        on_found: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&FileRecord, &[SearchMatch]),
    {
        let budget = emissions
            .max_results
            .saturating_mul(self.content.config().fallback_multiplier);
        let remaining: Vec<&FileRecord> = candidates
            .iter()
            .filter(|record| !emissions.contains(&record.path))
            .take(budget)
            .collect();
        if remaining.is_empty() {
            return Ok(());
        }

        let paths: Vec<String> = remaining.iter().map(|r| r.path.clone()).collect();
        let mut cached = match self.store().get_contents(&paths) {
            Ok(cached) => cached,
            Err(e) => {
                warn!("Batch cache lookup failed: {}", e);
                HashMap::new()
            }
        };
        let work: Vec<(&FileRecord, Option<ContentIndexEntry>)> = remaining
            .into_iter()
            .map(|record| (record, cached.remove(&record.path)))
            .collect();
        debug!(
            "On-demand tier: {} candidates, {} with cached entries",
            work.len(),
            work.iter().filter(|(_, hit)| hit.is_some()).count()
        );

        let mut texts = stream::iter(work)
            .map(move |(record, hit)| async move {
                let current = match hit {
                    Some(entry) => self.content.current_text(entry).await,
                    None => None,
                };
                let text = match current {
                    Some(text) => Ok(text),
                    None => self.content.get_or_build(Path::new(&record.path), cancel).await,
                };
                (record, text)
            })
            .buffered(self.content.config().max_parallelism.max(1));

        while let Some((record, text)) = texts.next().await {
            cancel.check()?;
            if emissions.is_full() {
                break;
            }
            let text = match text {
                Ok(text) => text,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) if e.is_per_file() => {
                    debug!("Skipping {}: {}", record.path, e);
                    continue;
                }
                Err(e) => {
                    warn!("Failed to load {}: {}", record.path, e);
                    continue;
                }
            };

            let matches = find_matches(self.content.folder(), &text, query_normalized, query_folded);
            if matches.is_empty() {
                continue;
            }
            emissions.emit(3, record, &matches, on_found);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn service_with(files: &[(&str, &str)]) -> (TempDir, SearchService) {
        let dir = TempDir::new().unwrap();
        for (name, body) in files {
            std::fs::write(dir.path().join(name), body).unwrap();
        }
        let service = SearchService::new(
            Arc::new(IndexStore::open_in_memory().unwrap()),
            ParserRegistry::with_defaults(),
            ServiceConfig::default(),
        )
        .unwrap();
        service.register_project_root("proj", dir.path()).unwrap();
        service
            .ensure_files_scanned("proj", None, &CancellationToken::new())
            .await
            .unwrap();
        (dir, service)
    }

    #[tokio::test]
    async fn test_empty_query_returns_nothing() {
        let (_dir, service) = service_with(&[("a.txt", "hello")]).await;
        let mut calls = 0;
        let paths = service
            .search(&SearchRequest::new("   ", "proj"), &CancellationToken::new(), |_, _| {
                calls += 1
            })
            .await
            .unwrap();
        assert!(paths.is_empty());
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_on_demand_then_index_tier() {
        let (_dir, service) =
            service_with(&[("a.txt", "Tiếng Việt"), ("b.txt", "nothing here")]).await;
        let cancel = CancellationToken::new();
        let request = SearchRequest::new("viet", "proj");

        // nothing is cached yet, so the first hit comes from parsing on demand
        let first = service.search(&request, &cancel, |_, _| {}).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(first[0].ends_with("a.txt"));

        let mut kinds = Vec::new();
        let second = service
            .search(&request, &cancel, |_, matches| kinds.push(matches[0].line_number))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(kinds, vec![1]);
        assert_eq!(service.content_stats().parses, 2);
    }

    #[tokio::test]
    async fn test_zero_max_results() {
        let (_dir, service) = service_with(&[("a.txt", "hello")]).await;
        let request = SearchRequest::new("hello", "proj").with_max_results(0);
        let paths = service
            .search(&request, &CancellationToken::new(), |_, _| panic!("no emissions"))
            .await
            .unwrap();
        assert!(paths.is_empty());
    }

    #[tokio::test]
    async fn test_compact_keeps_search_working() {
        let (_dir, service) = service_with(&[("a.txt", "Cà phê sữa đá")]).await;
        let cancel = CancellationToken::new();
        let request = SearchRequest::new("ca phe", "proj");
        service.search(&request, &cancel, |_, _| {}).await.unwrap();

        service.compact(true).await.unwrap();

        let stats = service.index_stats().unwrap();
        assert_eq!(stats.content_count, 1);
        assert_eq!(stats.fts_rows, 1);
        let paths = service.search(&request, &cancel, |_, _| {}).await.unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(service.content_stats().parses, 1);
    }

    #[tokio::test]
    async fn test_register_missing_root() {
        let service = SearchService::new(
            Arc::new(IndexStore::open_in_memory().unwrap()),
            ParserRegistry::with_defaults(),
            ServiceConfig::default(),
        )
        .unwrap();
        let err = service
            .register_project_root("proj", Path::new("/definitely/not/a/dir"))
            .unwrap_err();
        assert!(matches!(err, TextdexError::NotFound(_)));
    }
}
