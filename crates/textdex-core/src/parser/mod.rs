//! Document parsers that turn a file into raw text.
//!
//! Parsers are registered as trait objects and consulted in registration
//! order; the first one that claims an extension handles the file. A file no
//! parser claims is not an error here: [`ParserRegistry::find`] just returns
//! `None` and the content index reports
//! [`crate::TextdexError::UnsupportedType`].

mod plain_text;

pub use plain_text::PlainTextParser;

use crate::cancel::CancellationToken;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Text extracted from a document.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub text: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ParsedDocument {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: serde_json::Map::new(),
        }
    }
}

/// Capability implemented by every document format.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &str;

    /// `extension` is lowercase without the leading dot.
    fn can_parse(&self, extension: &str) -> bool;

    /// Extract the document's text.
    ///
    /// Implementations should poll `cancel` between expensive steps. Failures
    /// are reported as [`crate::TextdexError::ParseFailure`].
    async fn parse(&self, path: &Path, cancel: &CancellationToken) -> Result<ParsedDocument>;
}

/// Ordered collection of parsers.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn DocumentParser>>,
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.parsers.iter().map(|p| p.name())).finish()
    }
}

impl ParserRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in plain-text parser.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PlainTextParser::new()));
        registry
    }

    /// Append a parser. Earlier registrations win ties.
    pub fn register(&mut self, parser: Arc<dyn DocumentParser>) {
        tracing::debug!("Registered parser: {}", parser.name());
        self.parsers.push(parser);
    }

    /// First parser claiming `extension`.
    pub fn find(&self, extension: &str) -> Option<Arc<dyn DocumentParser>> {
        let extension = extension.to_lowercase();
        self.parsers
            .iter()
            .find(|p| p.can_parse(&extension))
            .cloned()
    }

    pub fn can_parse(&self, extension: &str) -> bool {
        self.find(extension).is_some()
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

/// Lowercase extension of `path` without the dot, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}
