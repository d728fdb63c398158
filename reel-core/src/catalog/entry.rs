//! Catalog entry records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One published piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Identifier used in stream URLs
    pub id: String,
    /// Display title
    pub title: String,
    /// Free-form grouping such as "Action" or "Documentary"
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    /// Media file path relative to the media directory
    pub file_name: String,
    /// MIME type served as `Content-Type`
    pub media_type: String,
    /// When the entry was published
    pub added_at: DateTime<Utc>,
}

impl CatalogEntry {
    /// Creates an entry with empty category and description.
    pub fn new(id: impl Into<String>, title: impl Into<String>, file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        let media_type = super::media_type_for(std::path::Path::new(&file_name));
        Self {
            id: id.into(),
            title: title.into(),
            category: String::new(),
            description: String::new(),
            file_name,
            media_type,
            added_at: Utc::now(),
        }
    }
}

/// Descriptive fields supplied when ingesting a file.
#[derive(Debug, Clone, Default)]
pub struct IngestMetadata {
    pub title: String,
    pub category: String,
    pub description: String,
    /// Explicit identifier; generated when absent
    pub id: Option<String>,
}

/// Generates a new content identifier.
///
/// Millisecond timestamp first so identifiers sort by publication time,
/// followed by a random suffix so concurrent ingests never collide.
pub fn generate_content_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
}
