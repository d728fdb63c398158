//! Integration tests for Reel
//!
//! These tests drive a real server over HTTP and check how the catalog,
//! range negotiation and streaming fit together.

#[path = "common/mod.rs"]
mod common;

#[path = "integration/catalog_ingest.rs"]
mod catalog_ingest;
#[path = "integration/range_streaming.rs"]
mod range_streaming;
