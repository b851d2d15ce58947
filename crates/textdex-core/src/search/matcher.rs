//! Locate query occurrences in cached text.
//!
//! Offsets are character offsets into the normalized line. A line is first
//! searched for the normalized query as-is; only when that finds nothing is
//! the line folded and searched for the folded query, with hits mapped back
//! through the fold's index map.

use crate::content::SENTINEL_LINE;
use crate::text::{normalize, TextFolder};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Where a match was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Filename,
    Content,
}

/// One occurrence of the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatch {
    /// 1-based; 0 for filename matches.
    pub line_number: usize,
    /// Character offsets into `line_text`, end exclusive.
    pub start: usize,
    pub end: usize,
    pub line_text: String,
    pub kind: MatchKind,
}

impl SearchMatch {
    /// Byte range of the match within `line_text`, for slicing or
    /// highlighting.
    pub fn byte_range(&self) -> Range<usize> {
        let mut start = self.line_text.len();
        let mut end = self.line_text.len();
        for (char_idx, (byte_idx, _)) in self.line_text.char_indices().enumerate() {
            if char_idx == self.start {
                start = byte_idx;
            }
            if char_idx == self.end {
                end = byte_idx;
                break;
            }
        }
        start.min(end)..end
    }

    /// The matched text.
    pub fn matched_text(&self) -> &str {
        &self.line_text[self.byte_range()]
    }
}

/// Character spans of every non-overlapping occurrence of `needle`.
pub fn find_in_line(haystack: &str, needle: &str) -> Vec<(usize, usize)> {
    if needle.is_empty() {
        return Vec::new();
    }
    let needle_chars = needle.chars().count();

    let mut spans = Vec::new();
    let mut chars_before = 0;
    let mut last_byte = 0;
    for (byte_idx, _) in haystack.match_indices(needle) {
        chars_before += haystack[last_byte..byte_idx].chars().count();
        spans.push((chars_before, chars_before + needle_chars));
        chars_before += needle_chars;
        last_byte = byte_idx + needle.len();
    }
    spans
}

/// Spans of the query in one already-normalized line: exact occurrences if
/// there are any, otherwise folded occurrences mapped back onto the line.
pub fn match_line(
    folder: &TextFolder,
    line: &str,
    query_normalized: &str,
    query_folded: &str,
) -> Vec<(usize, usize)> {
    let exact = find_in_line(line, query_normalized);
    if !exact.is_empty() || query_folded.is_empty() {
        return exact;
    }
    // An ASCII line folds to itself.
    if line.is_ascii() && query_normalized == query_folded {
        return exact;
    }

    let folded = folder.build_folded_and_map(line);
    find_in_line(&folded.text, query_folded)
        .into_iter()
        .map(|(start, end)| folded.original_span(start, end))
        .collect()
}

/// Every content match in the normalized half of `merged_text`.
pub fn find_matches(
    folder: &TextFolder,
    merged_text: &str,
    query_normalized: &str,
    query_folded: &str,
) -> Vec<SearchMatch> {
    let mut matches = Vec::new();
    if query_normalized.is_empty() && query_folded.is_empty() {
        return matches;
    }

    for (idx, raw_line) in merged_text.lines().enumerate() {
        if raw_line == SENTINEL_LINE {
            break;
        }
        let line = normalize(raw_line);
        let spans = match_line(folder, &line, query_normalized, query_folded);
        if spans.is_empty() {
            continue;
        }
        for (start, end) in spans {
            matches.push(SearchMatch {
                line_number: idx + 1,
                start,
                end,
                line_text: line.clone(),
                kind: MatchKind::Content,
            });
        }
    }
    matches
}

/// Single synthetic match for a file name, or `None` when the name does not
/// contain the query in either form.
pub fn match_filename(
    folder: &TextFolder,
    name: &str,
    query_normalized: &str,
    query_folded: &str,
) -> Option<SearchMatch> {
    let line = normalize(name);
    let (start, end) = match_line(folder, &line, query_normalized, query_folded)
        .into_iter()
        .next()?;
    Some(SearchMatch {
        line_number: 0,
        start,
        end,
        line_text: line,
        kind: MatchKind::Filename,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::merge_text;
    use crate::text::fold;

    fn merged(text: &str) -> String {
        let normalized = normalize(text);
        merge_text(&normalized, &fold(&normalized))
    }

    fn search(text: &str, query: &str) -> Vec<SearchMatch> {
        let folder = TextFolder::new();
        let qn = normalize(query);
        let qf = fold(&qn);
        find_matches(&folder, &merged(text), &qn, &qf)
    }

    #[test]
    fn test_unaccented_query_hits_accented_word() {
        let matches = search("Đường Nguyễn Huệ", "duong");

        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!((m.line_number, m.start, m.end), (1, 0, 5));
        assert_eq!(m.matched_text(), "đường");
        assert_eq!(m.kind, MatchKind::Content);
    }

    #[test]
    fn test_exact_match_skips_folding() {
        let matches = search("Phở bò\nphở gà", "phở");
        let lines: Vec<_> = matches.iter().map(|m| m.line_number).collect();
        assert_eq!(lines, vec![1, 2]);
        assert!(matches.iter().all(|m| m.matched_text() == "phở"));
    }

    #[test]
    fn test_all_occurrences_on_a_line() {
        let matches = search("an an ăn\nnothing", "an");
        let spans: Vec<_> = matches.iter().map(|m| (m.start, m.end)).collect();
        // exact hits win, so the accented "ăn" is not reported on this line
        assert_eq!(spans, vec![(0, 2), (3, 5)]);
    }

    #[test]
    fn test_folded_hits_map_to_original_offsets() {
        let matches = search("xin chào Việt Nam, việt", "viet");
        let found: Vec<_> = matches.iter().map(|m| m.matched_text().to_string()).collect();
        assert_eq!(found, vec!["việt", "việt"]);
        assert_eq!((matches[0].start, matches[0].end), (9, 13));
    }

    #[test]
    fn test_decomposed_source_text() {
        // "Hue\u{302}\u{323}" normalizes to the composed "huệ"
        let matches = search("Nguye\u{302}\u{303}n Hue\u{302}\u{323}", "hue");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].matched_text(), "huệ");
    }

    #[test]
    fn test_scan_stops_at_sentinel() {
        let folder = TextFolder::new();
        let blob = merge_text("first line", "tieng viet only in twin");
        assert!(find_matches(&folder, &blob, "viet", "viet").is_empty());
    }

    #[test]
    fn test_no_match_and_empty_query() {
        assert!(search("hello world", "xyz").is_empty());
        assert!(search("hello world", "").is_empty());
    }

    #[test]
    fn test_find_in_line_counts_characters() {
        assert_eq!(find_in_line("ăaăa", "a"), vec![(1, 2), (3, 4)]);
        assert_eq!(find_in_line("aaaa", "aa"), vec![(0, 2), (2, 4)]);
        assert!(find_in_line("abc", "").is_empty());
    }

    #[test]
    fn test_filename_match() {
        let folder = TextFolder::new();
        let m = match_filename(&folder, "Báo Cáo Tháng.docx", "bao cao", "bao cao").unwrap();
        assert_eq!(m.line_number, 0);
        assert_eq!(m.kind, MatchKind::Filename);
        assert_eq!(m.matched_text(), "báo cáo");

        assert!(match_filename(&folder, "report.txt", "notes", "notes").is_none());
    }

    #[test]
    fn test_byte_range_at_line_end() {
        let m = SearchMatch {
            line_number: 1,
            start: 2,
            end: 4,
            line_text: "abđđ".to_string(),
            kind: MatchKind::Content,
        };
        assert_eq!(m.byte_range(), 2..6);
        assert_eq!(m.matched_text(), "đđ");
    }
}
