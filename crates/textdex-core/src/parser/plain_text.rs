//! Parser for text-like files (prose, markup, source code, data files).

use super::{DocumentParser, ParsedDocument};
use crate::cancel::CancellationToken;
use crate::error::{Result, TextdexError};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

/// Extensions read as text.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "log", "csv", "tsv", "json", "xml", "yaml", "yml", "toml",
    "ini", "cfg", "html", "htm", "css", "js", "ts", "py", "cs", "java", "c", "h", "cpp", "hpp",
    "rs", "go", "sql", "sh", "bat", "ps1",
];

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Reads the file and decodes it as UTF-8 (or BOM-marked UTF-16), replacing
/// invalid sequences.
#[derive(Debug, Default)]
pub struct PlainTextParser;

impl PlainTextParser {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentParser for PlainTextParser {
    fn name(&self) -> &str {
        "plain-text"
    }

    fn can_parse(&self, extension: &str) -> bool {
        TEXT_EXTENSIONS.contains(&extension)
    }

    async fn parse(&self, path: &Path, cancel: &CancellationToken) -> Result<ParsedDocument> {
        cancel.check()?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| TextdexError::io_with_path(e, path))?;
        cancel.check()?;

        let (text, encoding) = decode(&bytes);

        let mut doc = ParsedDocument::from_text(text);
        doc.metadata
            .insert("encoding".to_string(), Value::from(encoding));
        doc.metadata
            .insert("bytes".to_string(), Value::from(bytes.len() as u64));
        Ok(doc)
    }
}

fn decode(bytes: &[u8]) -> (String, &'static str) {
    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        return (String::from_utf8_lossy(rest).into_owned(), "utf-8");
    }
    if let Some(rest) = bytes.strip_prefix(UTF16_LE_BOM) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        return (String::from_utf16_lossy(&units), "utf-16le");
    }
    if let Some(rest) = bytes.strip_prefix(UTF16_BE_BOM) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return (String::from_utf16_lossy(&units), "utf-16be");
    }
    (String::from_utf8_lossy(bytes).into_owned(), "utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_parse_utf8_with_bom() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.txt");
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice("Đường Nguyễn Huệ".as_bytes());
        std::fs::write(&path, bytes).unwrap();

        let doc = PlainTextParser::new()
            .parse(&path, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(doc.text, "Đường Nguyễn Huệ");
        assert_eq!(doc.metadata["encoding"], "utf-8");
    }

    #[test]
    fn test_decode_utf16le() {
        let mut bytes = UTF16_LE_BOM.to_vec();
        for unit in "hé".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode(&bytes), ("hé".to_string(), "utf-16le"));
    }

    #[test]
    fn test_decode_invalid_utf8_is_lossy() {
        let (text, _) = decode(&[b'a', 0xFF, b'b']);
        assert_eq!(text, "a\u{FFFD}b");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let err = PlainTextParser::new()
            .parse(Path::new("/definitely/not/here.txt"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TextdexError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_read() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = PlainTextParser::new()
            .parse(Path::new("/whatever.txt"), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
