//! Merge rules for configuration layers and per-context overrides.

pub mod merge_policy;
