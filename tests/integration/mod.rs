//! Integration tests for the cairn context orchestration layer

mod causal_bookmarks;
mod context_lifecycle;
mod streaming;
pub mod test_utils;
