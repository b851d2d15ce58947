//! Whole-string normalization and accent folding.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonical composition (NFC) followed by lowercasing.
///
/// ```
/// use textdex_core::text::normalize;
///
/// // "e" + combining acute composes to a single "é"
/// assert_eq!(normalize("Cafe\u{301}"), "café");
/// ```
pub fn normalize(text: &str) -> String {
    text.nfc().collect::<String>().to_lowercase()
}

/// Strip diacritics: canonical decomposition, drop combining marks, map the
/// Vietnamese `đ`/`Đ` to `d`, then lowercase.
///
/// Lowercasing runs per character so the output never grows relative to the
/// decomposed, mark-free sequence.
///
/// ```
/// use textdex_core::text::fold;
///
/// assert_eq!(fold("Đường Nguyễn Huệ"), "duong nguyen hue");
/// assert_eq!(fold(""), "");
/// ```
pub fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(map_stroked_d)
        .flat_map(char::to_lowercase)
        .collect()
}

/// `đ`/`Đ` carry a stroke, not a combining mark, so decomposition leaves them
/// intact.
pub(crate) fn map_stroked_d(c: char) -> char {
    match c {
        'đ' | 'Đ' => 'd',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_and_composes() {
        assert_eq!(normalize("HELLO World"), "hello world");
        assert_eq!(normalize("Nguye\u{302}\u{303}n"), "nguyễn");
        assert_eq!(normalize("nguyễn").chars().count(), 6);
    }

    #[test]
    fn test_fold_vietnamese() {
        assert_eq!(fold("Tiếng Việt có dấu"), "tieng viet co dau");
        assert_eq!(fold("ĐÀ NẴNG"), "da nang");
        assert_eq!(fold("đ"), "d");
    }

    #[test]
    fn test_fold_other_latin_scripts() {
        assert_eq!(fold("Crème Brûlée"), "creme brulee");
        assert_eq!(fold("Ångström"), "angstrom");
        assert_eq!(fold("İstanbul"), "istanbul");
    }

    #[test]
    fn test_fold_is_idempotent() {
        let samples = [
            "Đường Nguyễn Huệ",
            "Crème Brûlée",
            "ΣΟΦΊΑ σοφία",
            "plain ascii 123",
            "e\u{301}\u{323} stacked marks",
            "",
        ];
        for s in samples {
            let once = fold(s);
            assert_eq!(fold(&once), once, "fold not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_fold_drops_lone_marks() {
        assert_eq!(fold("\u{301}a\u{300}"), "a");
    }
}
