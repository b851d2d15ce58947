//! Property-based tests for match finding.
