//! SQLite store for file records, cached content and the FTS5 index.

use crate::{Result, TextdexError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, warn};

use super::fts5::{FTS5Config, FTS5Manager};
use super::records::{ContentIndexEntry, FileRecord, IndexStats, ScanBatch};

const FILE_COLUMNS: &str = "path, project_id, name, name_folded, extension, size, modified_ns";
const CONTENT_COLUMNS: &str =
    "path, merged_text, content_hash, file_size, modified_ns, indexed_at";

/// SQL fragment restricting `path` to a scope prefix bound at `?N`.
fn scope_clause(column: &str, param: usize) -> String {
    format!("(?{param} IS NULL OR substr({column}, 1, length(?{param})) = ?{param})")
}

/// SQLite index store with FTS5 support.
///
/// Thread-safe via an internal mutex on the connection; every method holds the
/// lock for a single statement or transaction only.
pub struct IndexStore {
    db_path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
    fts5_config: FTS5Config,
}

impl IndexStore {
    /// Create or open a store at the given path.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| TextdexError::Io {
                    message: format!("Failed to create directory {}", parent.display()),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(&db_path)?;
        Self::configure_connection(&conn)?;
        Self::from_connection(conn, Some(db_path))
    }

    /// A private in-memory store, mostly for tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, None)
    }

    fn from_connection(conn: Connection, db_path: Option<PathBuf>) -> Result<Self> {
        Self::ensure_schema(&conn)?;

        let fts5_config = FTS5Config::default();
        FTS5Manager::new(&fts5_config).ensure_setup(&conn)?;

        Ok(Self {
            db_path,
            conn: Arc::new(Mutex::new(conn)),
            fts5_config,
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA busy_timeout=30000;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
            ",
        )?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS project_roots (
                project_id TEXT NOT NULL,
                root_path TEXT NOT NULL,
                added_at TEXT NOT NULL,
                PRIMARY KEY (project_id, root_path)
            );

            CREATE TABLE IF NOT EXISTS files (
                path TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                name TEXT NOT NULL,
                name_folded TEXT NOT NULL,
                extension TEXT NOT NULL,
                size INTEGER NOT NULL,
                modified_ns INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_files_project ON files(project_id, path);

            CREATE TABLE IF NOT EXISTS content_index (
                path TEXT PRIMARY KEY,
                merged_text TEXT NOT NULL,
                content_hash TEXT,
                file_size INTEGER NOT NULL,
                modified_ns INTEGER NOT NULL,
                indexed_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| TextdexError::lock_poisoned())
    }

    /// Database path, `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    // ========================================
    // Project roots
    // ========================================

    /// Register a root directory for a project. Returns `false` if it was
    /// already registered.
    pub fn add_project_root(&self, project_id: &str, root_path: &str) -> Result<bool> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO project_roots (project_id, root_path, added_at)
             VALUES (?1, ?2, ?3)",
            params![project_id, root_path, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(inserted > 0)
    }

    pub fn project_roots(&self, project_id: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT root_path FROM project_roots WHERE project_id = ?1 ORDER BY root_path",
        )?;
        let roots = stmt
            .query_map(params![project_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(roots)
    }

    // ========================================
    // File records
    // ========================================

    fn row_to_file(row: &Row) -> rusqlite::Result<FileRecord> {
        Ok(FileRecord {
            path: row.get(0)?,
            project_id: row.get(1)?,
            name: row.get(2)?,
            name_folded: row.get(3)?,
            extension: row.get(4)?,
            size: row.get::<_, i64>(5)? as u64,
            modified_ns: row.get(6)?,
        })
    }

    pub fn get_file(&self, path: &str) -> Result<Option<FileRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &format!("SELECT {FILE_COLUMNS} FROM files WHERE path = ?1"),
                params![path],
                Self::row_to_file,
            )
            .optional()?;
        Ok(record)
    }

    /// File records of a project, optionally restricted to a path prefix,
    /// in path order.
    pub fn files_in_scope(&self, project_id: &str, prefix: Option<&str>) -> Result<Vec<FileRecord>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE project_id = ?1 AND {} ORDER BY path",
            scope_clause("path", 2)
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![project_id, prefix], Self::row_to_file)?;

        let mut records = Vec::new();
        for row in rows {
            match row {
                Ok(record) => records.push(record),
                Err(e) => warn!("Error reading file row: {}", e),
            }
        }
        Ok(records)
    }

    /// `(size, modified_ns)` of every stored file under `prefix`, regardless of
    /// project.
    pub fn file_snapshots(&self, prefix: Option<&str>) -> Result<HashMap<String, (u64, i64)>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT path, size, modified_ns FROM files WHERE {}",
            scope_clause("path", 1)
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![prefix], |row| {
            Ok((
                row.get::<_, String>(0)?,
                (row.get::<_, i64>(1)? as u64, row.get::<_, i64>(2)?),
            ))
        })?;
        Ok(rows.collect::<rusqlite::Result<HashMap<_, _>>>()?)
    }

    /// Apply one scan's inserts, updates and removals in a single transaction.
    pub fn apply_scan(&self, batch: &ScanBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut upsert = tx.prepare_cached(
                "INSERT INTO files (path, project_id, name, name_folded, extension, size, modified_ns)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(path) DO UPDATE SET
                     project_id=excluded.project_id,
                     name=excluded.name,
                     name_folded=excluded.name_folded,
                     extension=excluded.extension,
                     size=excluded.size,
                     modified_ns=excluded.modified_ns",
            )?;
            for record in batch.inserts.iter().chain(batch.updates.iter()) {
                upsert.execute(params![
                    record.path,
                    record.project_id,
                    record.name,
                    record.name_folded,
                    record.extension,
                    record.size as i64,
                    record.modified_ns,
                ])?;
            }

            let mut remove_file = tx.prepare_cached("DELETE FROM files WHERE path = ?1")?;
            let mut remove_content = tx.prepare_cached("DELETE FROM content_index WHERE path = ?1")?;
            for path in &batch.removals {
                remove_file.execute(params![path])?;
                remove_content.execute(params![path])?;
            }
        }
        tx.commit()?;

        debug!(
            "Applied scan batch: {} inserted, {} updated, {} removed in {:?}",
            batch.inserts.len(),
            batch.updates.len(),
            batch.removals.len(),
            start.elapsed()
        );
        Ok(())
    }

    // ========================================
    // Content entries
    // ========================================

    fn row_to_content(row: &Row) -> rusqlite::Result<ContentIndexEntry> {
        Ok(ContentIndexEntry {
            path: row.get(0)?,
            merged_text: row.get(1)?,
            content_hash: row.get(2)?,
            file_size: row.get::<_, i64>(3)? as u64,
            modified_ns: row.get(4)?,
            indexed_at: row.get(5)?,
        })
    }

    pub fn get_content(&self, path: &str) -> Result<Option<ContentIndexEntry>> {
        let conn = self.lock()?;
        let entry = conn
            .query_row(
                &format!("SELECT {CONTENT_COLUMNS} FROM content_index WHERE path = ?1"),
                params![path],
                Self::row_to_content,
            )
            .optional()?;
        Ok(entry)
    }

    /// Batch lookup; paths without an entry are simply absent from the map.
    pub fn get_contents(&self, paths: &[String]) -> Result<HashMap<String, ContentIndexEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {CONTENT_COLUMNS} FROM content_index WHERE path = ?1"
        ))?;

        let mut entries = HashMap::with_capacity(paths.len());
        for path in paths {
            if let Some(entry) = stmt.query_row(params![path], Self::row_to_content).optional()? {
                entries.insert(entry.path.clone(), entry);
            }
        }
        Ok(entries)
    }

    pub fn upsert_content(&self, entry: &ContentIndexEntry) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO content_index (path, merged_text, content_hash, file_size, modified_ns, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(path) DO UPDATE SET
                 merged_text=excluded.merged_text,
                 content_hash=excluded.content_hash,
                 file_size=excluded.file_size,
                 modified_ns=excluded.modified_ns,
                 indexed_at=excluded.indexed_at",
            params![
                entry.path,
                entry.merged_text,
                entry.content_hash,
                entry.file_size as i64,
                entry.modified_ns,
                entry.indexed_at,
            ],
        )?;

        debug!("Upserted content entry: {}", entry.path);
        Ok(())
    }

    /// Record that an entry is still valid for a new stat (touched but not
    /// modified). The text and FTS rows are left alone.
    pub fn confirm_content(&self, path: &str, file_size: u64, modified_ns: i64) -> Result<bool> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE content_index SET file_size = ?2, modified_ns = ?3, indexed_at = ?4
             WHERE path = ?1",
            params![
                path,
                file_size as i64,
                modified_ns,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        Ok(updated > 0)
    }

    pub fn delete_content(&self, path: &str) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM content_index WHERE path = ?1", params![path])?;
        Ok(rows > 0)
    }

    // ========================================
    // Full-text search
    // ========================================

    /// Paths of a project's files whose cached content matches `fts5_query`.
    ///
    /// Any failure, including FTS5 syntax errors, is reported as
    /// [`TextdexError::IndexBackendUnavailable`].
    pub fn search_content(
        &self,
        fts5_query: &str,
        project_id: &str,
        prefix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>> {
        let start = Instant::now();
        let conn = self.lock()?;

        let table = &self.fts5_config.table_name;
        let sql = format!(
            "SELECT f.path FROM {table} s JOIN files f ON f.path = s.path
             WHERE {table} MATCH ?1 AND f.project_id = ?2 AND {}
             LIMIT ?4",
            scope_clause("f.path", 3)
        );

        let run = || -> rusqlite::Result<Vec<String>> {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![fts5_query, project_id, prefix, limit as i64],
                |row| row.get(0),
            )?;
            rows.collect()
        };

        let paths = run().map_err(|e| TextdexError::IndexBackendUnavailable {
            message: e.to_string(),
        })?;

        debug!(
            "FTS5 query {:?} returned {} paths in {:?}",
            fts5_query,
            paths.len(),
            start.elapsed()
        );
        Ok(paths)
    }

    // ========================================
    // Maintenance
    // ========================================

    pub fn stats(&self) -> Result<IndexStats> {
        let conn = self.lock()?;
        let count = |sql: &str| -> Result<usize> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };

        Ok(IndexStats {
            project_count: count("SELECT COUNT(DISTINCT project_id) FROM project_roots")?,
            file_count: count("SELECT COUNT(*) FROM files")?,
            content_count: count("SELECT COUNT(*) FROM content_index")?,
            fts_rows: FTS5Manager::new(&self.fts5_config).row_count(&conn)?,
        })
    }

    pub fn rebuild_fts5(&self) -> Result<()> {
        let conn = self.lock()?;
        FTS5Manager::new(&self.fts5_config).rebuild(&conn)
    }

    pub fn optimize_fts5(&self) -> Result<()> {
        let conn = self.lock()?;
        FTS5Manager::new(&self.fts5_config).optimize(&conn)
    }

    /// Checkpoint the WAL; a no-op for in-memory stores.
    pub fn checkpoint_wal(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        debug!("Checkpointed WAL");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (IndexStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = IndexStore::open(temp_dir.path().join("index.db")).unwrap();
        (store, temp_dir)
    }

    fn file(path: &str, project: &str) -> FileRecord {
        let name = path.rsplit('/').next().unwrap().to_string();
        FileRecord {
            path: path.to_string(),
            project_id: project.to_string(),
            name_folded: name.to_lowercase(),
            name,
            extension: "txt".to_string(),
            size: 1,
            modified_ns: 1,
        }
    }

    fn content(path: &str, text: &str) -> ContentIndexEntry {
        ContentIndexEntry {
            path: path.to_string(),
            merged_text: text.to_string(),
            content_hash: Some("abc".to_string()),
            file_size: 1,
            modified_ns: 1,
            indexed_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_project_roots() {
        let (store, _temp) = create_test_store();
        assert!(store.add_project_root("p1", "/work/a").unwrap());
        assert!(!store.add_project_root("p1", "/work/a").unwrap());
        store.add_project_root("p1", "/work/b").unwrap();
        store.add_project_root("p2", "/other").unwrap();

        assert_eq!(store.project_roots("p1").unwrap(), vec!["/work/a", "/work/b"]);
        assert!(store.project_roots("missing").unwrap().is_empty());
    }

    #[test]
    fn test_apply_scan_and_scope() {
        let (store, _temp) = create_test_store();
        let batch = ScanBatch {
            inserts: vec![
                file("/work/a/one.txt", "p1"),
                file("/work/ab/two.txt", "p1"),
                file("/work/a/sub/three.txt", "p1"),
            ],
            ..Default::default()
        };
        store.apply_scan(&batch).unwrap();

        let scoped = store.files_in_scope("p1", Some("/work/a/")).unwrap();
        let paths: Vec<_> = scoped.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/work/a/one.txt", "/work/a/sub/three.txt"]);

        assert_eq!(store.files_in_scope("p1", None).unwrap().len(), 3);
        assert!(store.files_in_scope("p2", None).unwrap().is_empty());
        assert_eq!(store.file_snapshots(Some("/work/ab/")).unwrap().len(), 1);
    }

    #[test]
    fn test_removals_drop_content() {
        let (store, _temp) = create_test_store();
        store
            .apply_scan(&ScanBatch {
                inserts: vec![file("/w/a.txt", "p1")],
                ..Default::default()
            })
            .unwrap();
        store.upsert_content(&content("/w/a.txt", "alpha")).unwrap();

        store
            .apply_scan(&ScanBatch {
                removals: vec!["/w/a.txt".to_string()],
                ..Default::default()
            })
            .unwrap();

        assert!(store.get_file("/w/a.txt").unwrap().is_none());
        assert!(store.get_content("/w/a.txt").unwrap().is_none());
        assert_eq!(store.stats().unwrap().fts_rows, 0);
    }

    #[test]
    fn test_content_upsert_confirm_and_batch_get() {
        let (store, _temp) = create_test_store();
        store.upsert_content(&content("/w/a.txt", "alpha")).unwrap();
        store.upsert_content(&content("/w/b.txt", "beta")).unwrap();

        assert!(store.confirm_content("/w/a.txt", 9, 99).unwrap());
        let a = store.get_content("/w/a.txt").unwrap().unwrap();
        assert_eq!((a.file_size, a.modified_ns), (9, 99));
        assert_eq!(a.merged_text, "alpha");

        let batch = store
            .get_contents(&["/w/a.txt".to_string(), "/w/missing.txt".to_string()])
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert!(batch.contains_key("/w/a.txt"));
    }

    #[test]
    fn test_search_content_respects_project_and_scope() {
        let (store, _temp) = create_test_store();
        store
            .apply_scan(&ScanBatch {
                inserts: vec![
                    file("/w/a/notes.txt", "p1"),
                    file("/w/b/notes.txt", "p1"),
                    file("/x/notes.txt", "p2"),
                ],
                ..Default::default()
            })
            .unwrap();
        for path in ["/w/a/notes.txt", "/w/b/notes.txt", "/x/notes.txt"] {
            store
                .upsert_content(&content(path, "đường nguyễn huệ\nduong nguyen hue"))
                .unwrap();
        }

        let all = store.search_content("duong*", "p1", None, 10).unwrap();
        assert_eq!(all.len(), 2);

        let scoped = store.search_content("duong*", "p1", Some("/w/a/"), 10).unwrap();
        assert_eq!(scoped, vec!["/w/a/notes.txt"]);

        let limited = store.search_content("duong*", "p1", None, 1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_bad_fts_syntax_is_backend_error() {
        let (store, _temp) = create_test_store();
        let err = store.search_content("\"unterminated", "p1", None, 10).unwrap_err();
        assert!(matches!(err, TextdexError::IndexBackendUnavailable { .. }));
    }

    #[test]
    fn test_stats_and_rebuild() {
        let (store, _temp) = create_test_store();
        store.add_project_root("p1", "/w").unwrap();
        store
            .apply_scan(&ScanBatch {
                inserts: vec![file("/w/a.txt", "p1")],
                ..Default::default()
            })
            .unwrap();
        store.upsert_content(&content("/w/a.txt", "alpha")).unwrap();

        store.rebuild_fts5().unwrap();
        store.optimize_fts5().unwrap();
        store.checkpoint_wal().unwrap();

        assert_eq!(
            store.stats().unwrap(),
            IndexStats {
                project_count: 1,
                file_count: 1,
                content_count: 1,
                fts_rows: 1,
            }
        );
    }

    #[test]
    fn test_in_memory_store() {
        let store = IndexStore::open_in_memory().unwrap();
        assert!(store.db_path().is_none());
        store.upsert_content(&content("/m/a.txt", "alpha")).unwrap();
        assert!(store.get_content("/m/a.txt").unwrap().is_some());
    }
}
