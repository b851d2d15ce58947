//! Per-character folding with offset recovery.
//!
//! [`TextFolder::build_folded_and_map`] folds a string one character at a
//! time and records, for every folded character, the index of the original
//! character it came from. Decomposition is comparatively expensive and the
//! same handful of characters repeat across every line of every file, so each
//! character's fold is memoized in a concurrent table.
//!
//! Every input character folds to at most one output character: a lone
//! combining mark folds to nothing (as it does in [`super::fold`]) and a
//! character whose canonical decomposition holds several base characters
//! (Hangul syllables, for instance) keeps only the first one. The second case
//! is a known limitation: for such text the folded string here differs from
//! [`super::fold`], but the index map stays consistent with the folded string
//! it is returned with.

use dashmap::DashMap;
use unicode_normalization::char::{decompose_canonical, is_combining_mark};

use super::normalize::map_stroked_d;

/// Memoized fold of a single character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldedChar {
    /// `None` when the character is only a combining mark.
    pub folded: Option<char>,
    /// The character carried a diacritic (or was a stroked `đ`).
    pub had_accent: bool,
}

/// A folded string plus the mapping back into the string it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldedText {
    pub text: String,
    /// `index_map[i]` is the original character index of folded character `i`;
    /// the trailing entry is the original character count.
    pub index_map: Vec<usize>,
    pub had_accents: bool,
}

impl FoldedText {
    /// Number of folded characters.
    pub fn char_len(&self) -> usize {
        self.index_map.len() - 1
    }

    /// Translate a folded character span `[start, end)` into original
    /// character offsets.
    pub fn original_span(&self, start: usize, end: usize) -> (usize, usize) {
        let last = self.index_map.len() - 1;
        (self.index_map[start.min(last)], self.index_map[end.min(last)])
    }
}

/// Shared, thread-safe fold table.
///
/// Population is idempotent: two threads racing on the same character compute
/// the same value, so whichever insert lands last is harmless.
#[derive(Debug, Default)]
pub struct TextFolder {
    table: DashMap<char, FoldedChar>,
}

impl TextFolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one character, consulting the memo table first.
    pub fn fold_char(&self, c: char) -> FoldedChar {
        if c.is_ascii() {
            return FoldedChar {
                folded: Some(c.to_ascii_lowercase()),
                had_accent: false,
            };
        }
        if let Some(hit) = self.table.get(&c) {
            return *hit;
        }
        let folded = fold_char_uncached(c);
        self.table.insert(c, folded);
        folded
    }

    /// Fold `text` and build the folded→original index map.
    pub fn build_folded_and_map(&self, text: &str) -> FoldedText {
        let mut folded = String::with_capacity(text.len());
        let mut index_map = Vec::with_capacity(text.len() + 1);
        let mut had_accents = false;
        let mut original_len = 0;

        for (i, c) in text.chars().enumerate() {
            let fc = self.fold_char(c);
            had_accents |= fc.had_accent;
            if let Some(out) = fc.folded {
                folded.push(out);
                index_map.push(i);
            }
            original_len = i + 1;
        }
        index_map.push(original_len);

        FoldedText {
            text: folded,
            index_map,
            had_accents,
        }
    }

    /// Number of distinct non-ASCII characters memoized so far.
    pub fn cached_chars(&self) -> usize {
        self.table.len()
    }
}

fn fold_char_uncached(c: char) -> FoldedChar {
    let mut base = None;
    let mut had_accent = false;
    decompose_canonical(c, |d| {
        if is_combining_mark(d) {
            had_accent = true;
        } else if base.is_none() {
            base = Some(d);
        }
    });

    let folded = base.map(|b| {
        let mapped = map_stroked_d(b);
        if mapped != b {
            had_accent = true;
        }
        mapped.to_lowercase().next().unwrap_or(mapped)
    });

    FoldedChar { folded, had_accent }
}
