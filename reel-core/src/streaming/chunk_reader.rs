//! Bounded sequential reads over one byte range of a file.

use std::io::SeekFrom;
use std::path::Path;

use bytes::Bytes;
use futures::Stream;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{ByteRange, StreamingError, StreamingResult};

/// Default bytes per chunk.
///
/// This balances memory usage with streaming efficiency. Larger chunks
/// reduce syscall overhead but increase per-connection memory.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024; // 256 KiB

/// Read cursor confined to a [`ByteRange`].
///
/// Holds at most one chunk in memory; the next chunk is only read when the
/// consumer asks for it, so a slow consumer throttles disk reads.
#[derive(Debug)]
pub struct ChunkReader {
    file: File,
    range: ByteRange,
    /// Next offset to read
    position: u64,
    chunk_size: usize,
}

impl ChunkReader {
    /// Opens `path` and positions the cursor at `range.start()`.
    ///
    /// # Errors
    ///
    /// - `StreamingError::Open` - The file cannot be opened or seeked
    pub async fn open(path: &Path, range: ByteRange, chunk_size: usize) -> StreamingResult<Self> {
        let open_error = |source| StreamingError::Open {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).await.map_err(open_error)?;
        if range.start() > 0 {
            file.seek(SeekFrom::Start(range.start()))
                .await
                .map_err(open_error)?;
        }

        Ok(Self {
            file,
            range,
            position: range.start(),
            chunk_size: chunk_size.max(1),
        })
    }

    /// Range this reader covers.
    pub fn range(&self) -> ByteRange {
        self.range
    }

    /// Bytes left before the end of the range.
    pub fn remaining(&self) -> u64 {
        self.range.end() + 1 - self.position
    }

    /// Reads the next chunk, or `None` once the whole range has been produced.
    ///
    /// Every returned chunk is full-sized except possibly the last.
    ///
    /// # Errors
    ///
    /// - `StreamingError::Read` - The underlying read failed
    /// - `StreamingError::Truncated` - The file ended before the range did
    pub async fn next_chunk(&mut self) -> StreamingResult<Option<Bytes>> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(None);
        }

        let want = remaining.min(self.chunk_size as u64) as usize;
        let mut buffer = vec![0u8; want];
        let mut filled = 0;

        while filled < want {
            let read = self
                .file
                .read(&mut buffer[filled..])
                .await
                .map_err(|source| StreamingError::Read {
                    offset: self.position + filled as u64,
                    source,
                })?;
            if read == 0 {
                return Err(StreamingError::Truncated {
                    offset: self.position + filled as u64,
                    expected_end: self.range.end(),
                });
            }
            filled += read;
        }

        self.position += want as u64;
        tracing::trace!(
            "Read {} bytes, {} remaining in {}-{}",
            want,
            self.remaining(),
            self.range.start(),
            self.range.end()
        );
        Ok(Some(Bytes::from(buffer)))
    }

    /// Converts the reader into a stream of chunks.
    ///
    /// The stream ends after the last byte of the range, or right after
    /// yielding the first error; the file handle is released either way.
    pub fn into_stream(self) -> impl Stream<Item = StreamingResult<Bytes>> + Send + 'static {
        futures::stream::unfold(Some(self), |state| async move {
            let Some(mut reader) = state else {
                return None;
            };
            match reader.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(reader))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}
