//! Content catalog and identifier resolution.
//!
//! The streaming path only ever sees the [`ContentLocator`] trait: an
//! identifier goes in, a freshly stat'ed [`ContentRef`] comes out. The
//! [`Catalog`] is the durable implementation; ingest and directory scans
//! feed it by publishing complete files only.

pub mod entry;
pub mod index;
pub mod ingest;
pub mod scan;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
pub use entry::{CatalogEntry, IngestMetadata, generate_content_id};
pub use index::{Catalog, CatalogSnapshot};
pub use ingest::{ingest_file, title_from_path};
pub use scan::{is_video_file, scan_media_dir};

/// Resolved, streamable content.
///
/// Valid for a single request only: the file behind an identifier may be
/// replaced between requests, so callers re-resolve every time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRef {
    /// Identifier the content was requested by
    pub id: String,
    /// Absolute location of the media file
    pub path: PathBuf,
    /// Size of the file at resolution time
    pub total_length: u64,
    /// MIME type sent as `Content-Type`
    pub media_type: String,
}

/// Maps content identifiers to files on disk.
///
/// Implementations must stat the file on every call; nothing returned here
/// may be cached across requests.
#[async_trait]
pub trait ContentLocator: Send + Sync {
    /// Resolves an identifier to its current file and size.
    ///
    /// # Errors
    ///
    /// - `LocateError::NotFound` - No content is registered under `id`
    /// - `LocateError::Unavailable` - Registered, but the file is missing or unreadable
    async fn locate(&self, id: &str) -> Result<ContentRef, LocateError>;
}

/// Errors from identifier resolution.
#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    /// Identifier is not registered
    #[error("content {id} not found")]
    NotFound {
        /// Identifier that was requested
        id: String,
    },

    /// Identifier is registered but its file cannot be used
    #[error("content {id} is unavailable: {source}")]
    Unavailable {
        /// Identifier that was requested
        id: String,
        /// Why the file could not be used
        #[source]
        source: std::io::Error,
    },
}

/// Errors from catalog maintenance (loading, publishing, ingesting).
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Identifier is empty or contains characters that are not allowed
    #[error("invalid content id: {id:?}")]
    InvalidId {
        /// Rejected identifier
        id: String,
    },

    /// Media path escapes the media directory or is not relative
    #[error("invalid media file name: {name:?}")]
    InvalidFileName {
        /// Rejected file name
        name: String,
    },

    /// Ingest source is missing or not a regular file
    #[error("not a regular file: {}", path.display())]
    SourceNotFile {
        /// Rejected source path
        path: PathBuf,
    },

    /// Catalog file exists but could not be parsed
    #[error("catalog file {} is corrupt: {source}", path.display())]
    Corrupt {
        /// Location of the catalog file
        path: PathBuf,
        /// Parser error
        #[source]
        source: serde_json::Error,
    },

    /// Catalog could not be serialized
    #[error("failed to encode catalog: {0}")]
    Encode(#[source] serde_json::Error),

    /// Standard I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stats `path` and builds a [`ContentRef`] for it.
///
/// # Errors
///
/// - `LocateError::Unavailable` - The path is missing, unreadable, or not a regular file
pub async fn stat_content(
    id: &str,
    path: PathBuf,
    media_type: String,
) -> Result<ContentRef, LocateError> {
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|source| LocateError::Unavailable {
            id: id.to_string(),
            source,
        })?;

    if !metadata.is_file() {
        return Err(LocateError::Unavailable {
            id: id.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ),
        });
    }

    Ok(ContentRef {
        id: id.to_string(),
        path,
        total_length: metadata.len(),
        media_type,
    })
}

/// Guesses the MIME type from a file extension.
pub fn media_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Checks that an identifier is usable as a URL segment and file stem.
pub fn is_valid_content_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !id.starts_with('.')
}

/// Checks that a catalog file name stays inside the media directory.
pub fn is_contained_path(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id_validation() {
        assert!(is_valid_content_id("1700000000000-3fa85f64"));
        assert!(is_valid_content_id("movie_1.v2"));
        assert!(!is_valid_content_id(""));
        assert!(!is_valid_content_id("../etc/passwd"));
        assert!(!is_valid_content_id("a/b"));
        assert!(!is_valid_content_id(".hidden"));
        assert!(!is_valid_content_id(&"x".repeat(129)));
    }

    #[test]
    fn test_contained_path() {
        assert!(is_contained_path("movie.mp4"));
        assert!(is_contained_path("series/s01/e01.mkv"));
        assert!(!is_contained_path(""));
        assert!(!is_contained_path("../outside.mp4"));
        assert!(!is_contained_path("/etc/passwd"));
        assert!(!is_contained_path("a/../../b.mp4"));
    }

    #[test]
    fn test_media_type_guess() {
        assert_eq!(media_type_for(Path::new("a.mp4")), "video/mp4");
        assert_eq!(media_type_for(Path::new("a.webm")), "video/webm");
        assert_eq!(
            media_type_for(Path::new("noextension")),
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn test_stat_content_reports_missing_file_as_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let result = stat_content(
            "gone",
            dir.path().join("gone.mp4"),
            "video/mp4".to_string(),
        )
        .await;

        match result {
            Err(LocateError::Unavailable { id, source }) => {
                assert_eq!(id, "gone");
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("Expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stat_content_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = stat_content("dir", dir.path().to_path_buf(), "video/mp4".to_string()).await;
        assert!(matches!(result, Err(LocateError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_stat_content_reads_current_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, vec![7u8; 1000]).unwrap();

        let content = stat_content("clip", path.clone(), "video/mp4".to_string())
            .await
            .unwrap();
        assert_eq!(content.total_length, 1000);

        std::fs::write(&path, vec![7u8; 10]).unwrap();
        let content = stat_content("clip", path, "video/mp4".to_string())
            .await
            .unwrap();
        assert_eq!(content.total_length, 10);
    }
}
