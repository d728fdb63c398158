//! Reel Core - Catalog lookup and byte-range streaming
//!
//! This crate provides the building blocks of the Reel origin server: the
//! content catalog that resolves identifiers to files on disk, the HTTP
//! `Range` parser, the bounded chunk reader, and the stream responder that
//! turns all of them into partial-content responses.

pub mod catalog;
pub mod config;
pub mod streaming;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use catalog::{Catalog, CatalogEntry, CatalogError, ContentLocator, ContentRef, LocateError};
pub use config::ReelConfig;
pub use streaming::{
    ByteRange, ChunkReader, RangeRequest, StreamResponder, StreamStats, StreamingError,
};

/// Core errors that can bubble up from any Reel subsystem.
///
/// High-level error types representing failures in core functionality.
#[derive(Debug, thiserror::Error)]
pub enum ReelError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Lookup error: {0}")]
    Locate(#[from] LocateError),

    #[error("Streaming error: {0}")]
    Streaming(#[from] StreamingError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReelError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            ReelError::Catalog(e) => match e {
                CatalogError::InvalidId { id } => format!("Invalid content id: {id}"),
                CatalogError::InvalidFileName { name } => {
                    format!("Media file name must stay inside the media directory: {name}")
                }
                CatalogError::SourceNotFile { path } => {
                    format!("Not a regular file: {}", path.display())
                }
                CatalogError::Corrupt { path, .. } => {
                    format!("Catalog file is unreadable: {}", path.display())
                }
                CatalogError::Encode(_) => "Catalog could not be encoded".to_string(),
                CatalogError::Io(e) => format!("Catalog storage error: {e}"),
            },
            ReelError::Locate(LocateError::NotFound { id }) => format!("Content {id} not found"),
            ReelError::Locate(LocateError::Unavailable { id, .. }) => {
                format!("Content {id} is registered but its file is missing")
            }
            ReelError::Streaming(_) => "Streaming error occurred".to_string(),
            ReelError::Configuration { reason } => format!("Configuration error: {reason}"),
            ReelError::Io(e) => format!("File system error: {e}"),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ReelError::Configuration { .. }
                | ReelError::Catalog(CatalogError::InvalidId { .. })
                | ReelError::Catalog(CatalogError::InvalidFileName { .. })
                | ReelError::Catalog(CatalogError::SourceNotFile { .. })
                | ReelError::Locate(LocateError::NotFound { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, ReelError>;
