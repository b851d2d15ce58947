//! Property-based tests for folding.
