//! Text normalization and accent folding.
//!
//! - [`normalize`]: NFC + lowercase, the form stored and line-scanned.
//! - [`fold`]: diacritic-free form used for accent-insensitive matching.
//! - [`TextFolder`]: per-character folding with an index map back to the
//!   original string, memoized across calls.

mod folding;
mod normalize;
mod proptests;

pub use folding::{FoldedChar, FoldedText, TextFolder};
pub use normalize::{fold, normalize};
