//! Property-based tests for aggregation guarantees
