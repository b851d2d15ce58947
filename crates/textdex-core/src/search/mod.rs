//! Match finding and the tiered search orchestrator.

mod matcher;
mod orchestrator;
mod proptests;

pub use matcher::{find_in_line, find_matches, match_filename, match_line, MatchKind, SearchMatch};
pub use orchestrator::{SearchRequest, SearchService};
