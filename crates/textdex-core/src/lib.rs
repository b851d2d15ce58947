//! textdex-core: accent-insensitive content indexing and tiered search.
//!
//! Files under registered project roots are catalogued in SQLite, their text
//! is cached in normalized and accent-folded form, and searches run through
//! three tiers: the FTS5 index, file names, then on-demand parsing.
//!
//! # Example
//!
//! ```no_run
//! use textdex_core::{CancellationToken, SearchRequest, SearchService, ServiceConfig};
//!
//! # async fn example() -> textdex_core::Result<()> {
//! let service = SearchService::open("/tmp/textdex.db", ServiceConfig::default())?;
//! let cancel = CancellationToken::new();
//!
//! service.register_project_root("docs", std::path::Path::new("/srv/docs"))?;
//! service.ensure_files_scanned("docs", None, &cancel).await?;
//!
//! let request = SearchRequest::new("nguyen", "docs");
//! let paths = service
//!     .search(&request, &cancel, |record, matches| {
//!         println!("{} ({} matches)", record.path, matches.len());
//!     })
//!     .await?;
//! # let _ = paths;
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod config;
pub mod content;
pub mod error;
pub mod index;
pub mod parser;
pub mod search;
pub mod text;

pub use cancel::{CancellationToken, CancelledError};
pub use config::{AppConfig, IndexConfig, SearchDefaults, ServiceConfig};
pub use content::{ContentIndex, ContentIndexStats, ScanSummary, SENTINEL_LINE};
pub use error::{Result, TextdexError};
pub use index::{ContentIndexEntry, FileRecord, IndexStats, IndexStore};
pub use parser::{DocumentParser, ParsedDocument, ParserRegistry, PlainTextParser};
pub use search::{MatchKind, SearchMatch, SearchRequest, SearchService};
pub use text::{fold, normalize, FoldedText, TextFolder};
