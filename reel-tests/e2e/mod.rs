//! End-to-end tests for Reel
//!
//! Many clients against one server: concurrent ranges, abandoned
//! transfers, and files that change underneath an open stream.

#[path = "../common/mod.rs"]
mod common;

mod concurrent_streaming;
