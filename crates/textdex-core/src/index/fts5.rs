//! FTS5 virtual table over cached file content.
//!
//! The table mirrors `content_index.merged_text` through triggers, so the
//! folded half of each merged blob lets plain-letter queries hit accented
//! documents even before the tokenizer's own diacritic removal kicks in.

use crate::config::IndexConfig;
use crate::Result;
use rusqlite::Connection;
use tracing::{debug, info};

/// Configuration for the FTS5 table.
#[derive(Debug, Clone)]
pub struct FTS5Config {
    pub table_name: String,
    pub tokenizer: String,
}

impl Default for FTS5Config {
    fn default() -> Self {
        Self {
            table_name: IndexConfig::FTS_TABLE.to_string(),
            tokenizer: IndexConfig::FTS_TOKENIZER.to_string(),
        }
    }
}

/// Manager for FTS5 setup and maintenance.
pub struct FTS5Manager<'a> {
    config: &'a FTS5Config,
}

impl<'a> FTS5Manager<'a> {
    pub fn new(config: &'a FTS5Config) -> Self {
        Self { config }
    }

    pub fn table_exists(&self, conn: &Connection) -> Result<bool> {
        let count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [&self.config.table_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn triggers_exist(&self, conn: &Connection) -> Result<bool> {
        let count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='trigger' AND name IN (?1, ?2, ?3)",
            [
                format!("{}_ai", self.config.table_name),
                format!("{}_au", self.config.table_name),
                format!("{}_ad", self.config.table_name),
            ],
            |row| row.get(0),
        )?;
        Ok(count == 3)
    }

    /// Create whatever is missing and backfill from `content_index`.
    pub fn ensure_setup(&self, conn: &Connection) -> Result<()> {
        if !self.table_exists(conn)? {
            self.create_table(conn)?;
            self.populate_from_content(conn)?;
        } else if !self.triggers_exist(conn)? {
            self.populate_from_content(conn)?;
        }

        self.create_triggers(conn)?;
        Ok(())
    }

    pub fn create_table(&self, conn: &Connection) -> Result<()> {
        let sql = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING fts5(
                path UNINDEXED,
                body,
                tokenize='{}'
            )",
            self.config.table_name, self.config.tokenizer
        );

        conn.execute(&sql, [])?;
        info!("Created FTS5 table: {}", self.config.table_name);
        Ok(())
    }

    /// Triggers keeping the FTS table in sync with `content_index`.
    ///
    /// The update trigger only fires when the text changes, so confirming an
    /// entry's timestamp does not re-tokenize the document.
    pub fn create_triggers(&self, conn: &Connection) -> Result<()> {
        let table = &self.config.table_name;

        conn.execute_batch(&format!(
            "CREATE TRIGGER IF NOT EXISTS {table}_ai AFTER INSERT ON content_index BEGIN
                INSERT INTO {table} (path, body) VALUES (NEW.path, NEW.merged_text);
            END;
            CREATE TRIGGER IF NOT EXISTS {table}_au AFTER UPDATE OF merged_text ON content_index BEGIN
                DELETE FROM {table} WHERE path = OLD.path;
                INSERT INTO {table} (path, body) VALUES (NEW.path, NEW.merged_text);
            END;
            CREATE TRIGGER IF NOT EXISTS {table}_ad AFTER DELETE ON content_index BEGIN
                DELETE FROM {table} WHERE path = OLD.path;
            END;"
        ))?;

        debug!("Created FTS5 triggers for {}", table);
        Ok(())
    }

    pub fn populate_from_content(&self, conn: &Connection) -> Result<()> {
        let table = &self.config.table_name;

        conn.execute_batch(&format!("DELETE FROM {};", table))?;
        conn.execute(
            &format!(
                "INSERT INTO {} (path, body) SELECT path, merged_text FROM content_index",
                table
            ),
            [],
        )?;

        info!("Populated FTS5 table from content_index");
        Ok(())
    }

    /// Drop and recreate the table and triggers, then backfill.
    pub fn rebuild(&self, conn: &Connection) -> Result<()> {
        let table = &self.config.table_name;
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table};
            DROP TRIGGER IF EXISTS {table}_ai;
            DROP TRIGGER IF EXISTS {table}_au;
            DROP TRIGGER IF EXISTS {table}_ad;"
        ))?;

        self.create_table(conn)?;
        self.create_triggers(conn)?;
        self.populate_from_content(conn)?;

        info!("Rebuilt FTS5 index");
        Ok(())
    }

    pub fn optimize(&self, conn: &Connection) -> Result<()> {
        let sql = format!(
            "INSERT INTO {}({}) VALUES('optimize')",
            self.config.table_name, self.config.table_name
        );
        conn.execute(&sql, [])?;
        debug!("Optimized FTS5 index");
        Ok(())
    }

    pub fn row_count(&self, conn: &Connection) -> Result<usize> {
        let count: usize = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.config.table_name),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE content_index (
                path TEXT PRIMARY KEY,
                merged_text TEXT NOT NULL,
                content_hash TEXT,
                file_size INTEGER NOT NULL,
                modified_ns INTEGER NOT NULL,
                indexed_at TEXT NOT NULL
            )",
            [],
        )
        .unwrap();
        conn
    }

    fn insert(conn: &Connection, path: &str, text: &str) {
        conn.execute(
            "INSERT INTO content_index VALUES (?1, ?2, NULL, 0, 0, '')",
            [path, text],
        )
        .unwrap();
    }

    #[test]
    fn test_fts5_setup() {
        let conn = create_test_db();
        let config = FTS5Config::default();
        let manager = FTS5Manager::new(&config);

        assert!(!manager.table_exists(&conn).unwrap());
        manager.ensure_setup(&conn).unwrap();
        assert!(manager.table_exists(&conn).unwrap());
        assert!(manager.triggers_exist(&conn).unwrap());
    }

    #[test]
    fn test_triggers_follow_content() {
        let conn = create_test_db();
        let config = FTS5Config::default();
        let manager = FTS5Manager::new(&config);
        manager.ensure_setup(&conn).unwrap();

        insert(&conn, "/p/a.txt", "đường nguyễn huệ");
        assert_eq!(manager.row_count(&conn).unwrap(), 1);

        // remove_diacritics lets the plain form match the accented body
        let hit: String = conn
            .query_row(
                "SELECT path FROM content_search WHERE content_search MATCH 'nguyen*'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(hit, "/p/a.txt");

        conn.execute(
            "UPDATE content_index SET merged_text = 'replaced' WHERE path = '/p/a.txt'",
            [],
        )
        .unwrap();
        let misses: usize = conn
            .query_row(
                "SELECT COUNT(*) FROM content_search WHERE content_search MATCH 'nguyen*'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(misses, 0);

        conn.execute("DELETE FROM content_index", []).unwrap();
        assert_eq!(manager.row_count(&conn).unwrap(), 0);
    }

    #[test]
    fn test_rebuild_backfills_existing_rows() {
        let conn = create_test_db();
        let config = FTS5Config::default();
        let manager = FTS5Manager::new(&config);
        manager.ensure_setup(&conn).unwrap();
        insert(&conn, "/p/a.txt", "alpha");
        insert(&conn, "/p/b.txt", "beta");

        manager.rebuild(&conn).unwrap();

        assert!(manager.table_exists(&conn).unwrap());
        assert_eq!(manager.row_count(&conn).unwrap(), 2);
    }
}
