//! FTS5 query building utilities.

use regex::Regex;
use std::sync::LazyLock;

/// Anything that is not a letter or digit makes a term unsafe as an FTS5
/// bareword (hyphens, dots, quotes, parentheses, colons, `*`, `^`, ...).
static FTS5_SPECIAL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]").expect("valid regex"));

/// Escape a term for FTS5 queries.
///
/// Terms containing special characters are wrapped in quotes, with embedded
/// quotes doubled.
pub fn escape_fts5_term(term: &str) -> String {
    if FTS5_SPECIAL_CHARS.is_match(term) {
        let escaped = term.replace('"', "\"\"");
        format!("\"{}\"", escaped)
    } else {
        term.to_string()
    }
}

/// Build a prefix-style FTS5 query from an already normalized search string.
///
/// Every whitespace-separated term must be present (implicit AND) and
/// matches as a token prefix:
/// - "duong nguyen" → `duong* nguyen*`
/// - "v1.5" → `"v1.5"*`
/// - "a\"b" → `"a""b"*`
///
/// Terms with no letters or digits contribute no tokens and are dropped; an
/// empty string means the index cannot help with this query.
pub fn build_fts5_query(normalized_query: &str) -> String {
    normalized_query
        .split_whitespace()
        .filter(|term| term.chars().any(char::is_alphanumeric))
        .map(|term| format!("{}*", escape_fts5_term(term)))
        .collect::<Vec<_>>()
        .join(" ")
}
