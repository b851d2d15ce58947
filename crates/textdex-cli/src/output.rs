//! Terminal rendering of search results.

use serde::Serialize;
use textdex_core::{FileRecord, MatchKind, SearchMatch};

/// One emitted file as printed with `--json`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonHit<'a> {
    pub path: &'a str,
    pub name: &'a str,
    pub matches: &'a [SearchMatch],
}

/// `line_text` with the matched span wrapped in brackets.
pub fn highlight(m: &SearchMatch) -> String {
    let range = m.byte_range();
    format!(
        "{}[{}]{}",
        &m.line_text[..range.start],
        &m.line_text[range.clone()],
        &m.line_text[range.end..]
    )
}

/// Human-readable block for one emitted file.
pub fn render_hit(record: &FileRecord, matches: &[SearchMatch]) -> String {
    let mut out = record.path.clone();
    for m in matches {
        out.push('\n');
        match m.kind {
            MatchKind::Filename => out.push_str(&format!("  name: {}", highlight(m))),
            MatchKind::Content => {
                out.push_str(&format!("  {:>5}: {}", m.line_number, highlight(m).trim()))
            }
        }
    }
    out
}
