//! HTTP request handlers organized by functionality

pub mod api;
pub mod streaming;

pub use api::{CatalogItem, CatalogListing, ServerStats, api_catalog, api_stats, health};
pub use streaming::{StreamQuery, stream_content};
