//! Centralized configuration for textdex.
//!
//! Constant holders follow one struct per concern. [`ServiceConfig`] carries
//! the values a host application may want to override at runtime.

use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "textdex";
    pub const DB_FILENAME: &'static str = "textdex.db";
}

/// Content index tuning.
pub struct IndexConfig;

impl IndexConfig {
    /// Upper bound on a single document parse.
    pub const PARSE_TIMEOUT: Duration = Duration::from_secs(15);
    /// Read buffer used when hashing file bytes.
    pub const HASH_CHUNK_SIZE: usize = 1024 * 1024;
    /// Name of the FTS5 virtual table over cached content.
    pub const FTS_TABLE: &'static str = "content_search";
    /// FTS5 tokenizer; diacritics are removed so accented and plain forms
    /// share tokens.
    pub const FTS_TOKENIZER: &'static str = "unicode61 remove_diacritics 2";

    /// Extensions picked up by filesystem scans.
    pub const SUPPORTED_EXTENSIONS: &'static [&'static str] = &[
        "txt", "md", "markdown", "rst", "log", "csv", "tsv", "json", "xml", "yaml", "yml", "toml",
        "ini", "cfg", "html", "htm", "css", "js", "ts", "py", "cs", "java", "c", "h", "cpp", "hpp",
        "rs", "go", "sql", "sh", "bat", "ps1", "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
        "rtf", "odt", "dwg", "dxf",
    ];
}

/// Search defaults.
pub struct SearchDefaults;

impl SearchDefaults {
    pub const MAX_RESULTS: usize = 200;
    /// Tier 3 considers at most `max_results * FALLBACK_MULTIPLIER` candidates.
    pub const FALLBACK_MULTIPLIER: usize = 5;
}

/// Runtime configuration for [`crate::SearchService`] and the content index.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub parse_timeout: Duration,
    pub fallback_multiplier: usize,
    /// Concurrent parse/hash jobs during batch work.
    pub max_parallelism: usize,
    /// Lowercase extensions (no dot) accepted by scans.
    pub supported_extensions: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            parse_timeout: IndexConfig::PARSE_TIMEOUT,
            fallback_multiplier: SearchDefaults::FALLBACK_MULTIPLIER,
            max_parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            supported_extensions: IndexConfig::SUPPORTED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl ServiceConfig {
    /// Whether a scan should pick up files with this extension.
    pub fn is_supported_extension(&self, extension: &str) -> bool {
        let extension = extension.to_lowercase();
        self.supported_extensions.iter().any(|e| *e == extension)
    }

    /// Reject values that would stall every lookup.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_parallelism == 0 {
            return Err(crate::TextdexError::Config {
                message: "max_parallelism must be at least 1".to_string(),
            });
        }
        if self.parse_timeout.is_zero() {
            return Err(crate::TextdexError::Config {
                message: "parse_timeout must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}
