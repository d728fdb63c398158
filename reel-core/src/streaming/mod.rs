//! Byte-range streaming pipeline.
//!
//! A request flows through four stages: the [`ContentLocator`] resolves the
//! identifier, [`RangeRequest`] negotiates the interval, [`ChunkReader`]
//! produces the bytes lazily, and [`StreamResponder`] commits headers and
//! hands a pull-based body to the HTTP stack. Every header decision is made
//! before the first body byte exists.
//!
//! [`ContentLocator`]: crate::catalog::ContentLocator

pub mod chunk_reader;
pub mod range;
pub mod responder;
pub mod session;
pub mod stats;

use std::path::PathBuf;

pub use chunk_reader::{ChunkReader, DEFAULT_CHUNK_SIZE};
pub use range::{ByteRange, RangeRequest};
pub use responder::{Rejection, StreamResponder, TransferPlan};
pub use session::{StreamSession, TransferOutcome};
pub use stats::{StreamStats, StreamStatsSnapshot};

/// Errors raised while reading content for a response.
#[derive(Debug, thiserror::Error)]
pub enum StreamingError {
    /// Media file could not be opened or positioned
    #[error("failed to open {}: {source}", path.display())]
    Open {
        /// File that was being opened
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Read failed part-way through a transfer
    #[error("read failed at offset {offset}: {source}")]
    Read {
        /// Offset the failed read started at
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// File ended before the negotiated range did (replaced or truncated underneath us)
    #[error("file ended at offset {offset}, expected data through {expected_end}")]
    Truncated {
        /// Offset where end-of-file was hit
        offset: u64,
        /// Last offset the range promised
        expected_end: u64,
    },
}

pub type StreamingResult<T> = Result<T, StreamingError>;
