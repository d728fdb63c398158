//! Per-response transfer state.
//!
//! A [`StreamSession`] lives inside the response body. The HTTP stack polls
//! it for the next chunk only after the previous one was accepted by the
//! connection, and drops it when the response finishes or the client goes
//! away. Dropping is the single place where the outcome is decided, logged
//! and counted.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::Stream;
use tracing::{debug, error};

use super::{ByteRange, ChunkReader, StreamStats, StreamingResult};

/// How a transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Every byte of the negotiated range was handed to the connection.
    Complete,
    /// The body was dropped early; the client closed the connection.
    Disconnected,
    /// A read failed after headers were committed; the connection is aborted.
    Failed,
}

/// One in-flight transfer of a byte range to one client.
#[derive(Debug)]
pub struct StreamSession {
    content_id: String,
    range: ByteRange,
    /// Released as soon as the range is exhausted or a read fails
    reader: Option<ChunkReader>,
    bytes_sent: u64,
    failed: bool,
    stats: Arc<StreamStats>,
    started_at: Instant,
}

impl StreamSession {
    /// Starts a session over an opened reader and registers it as active.
    pub fn new(content_id: impl Into<String>, reader: ChunkReader, stats: Arc<StreamStats>) -> Self {
        stats.session_started();
        Self {
            content_id: content_id.into(),
            range: reader.range(),
            reader: Some(reader),
            bytes_sent: 0,
            failed: false,
            stats,
            started_at: Instant::now(),
        }
    }

    /// Bytes handed to the connection so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Outcome if the session ended right now.
    pub fn outcome(&self) -> TransferOutcome {
        if self.failed {
            TransferOutcome::Failed
        } else if self.bytes_sent == self.range.len() {
            TransferOutcome::Complete
        } else {
            TransferOutcome::Disconnected
        }
    }

    /// Produces the next body chunk, or `None` when the session is finished.
    pub async fn next_chunk(&mut self) -> Option<StreamingResult<Bytes>> {
        let reader = self.reader.as_mut()?;

        match reader.next_chunk().await {
            Ok(Some(chunk)) => {
                let exhausted = reader.remaining() == 0;
                let count = chunk.len() as u64;
                self.bytes_sent += count;
                self.stats.bytes_sent(count);
                if exhausted {
                    // Close the file now; the connection may not poll us again
                    self.reader = None;
                }
                Some(Ok(chunk))
            }
            Ok(None) => {
                self.reader = None;
                None
            }
            Err(e) => {
                self.failed = true;
                self.reader = None;
                error!(
                    "Transfer of {} incomplete after {}/{} bytes, aborting connection: {}",
                    self.content_id,
                    self.bytes_sent,
                    self.range.len(),
                    e
                );
                Some(Err(e))
            }
        }
    }

    /// Turns the session into a response body stream.
    ///
    /// An `Err` item makes the HTTP stack abort the connection instead of
    /// ending the response cleanly, so a failed transfer is never mistaken
    /// for a short successful one.
    pub fn into_body_stream(self) -> impl Stream<Item = StreamingResult<Bytes>> + Send + 'static {
        futures::stream::unfold(self, |mut session| async move {
            let item = session.next_chunk().await;
            item.map(|item| (item, session))
        })
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        let outcome = self.outcome();
        let elapsed = self.started_at.elapsed();

        match outcome {
            TransferOutcome::Complete => debug!(
                "Stream {} bytes {}-{} complete in {:?}",
                self.content_id,
                self.range.start(),
                self.range.end(),
                elapsed
            ),
            TransferOutcome::Disconnected => debug!(
                "Client left stream {} after {}/{} bytes ({:?})",
                self.content_id,
                self.bytes_sent,
                self.range.len(),
                elapsed
            ),
            TransferOutcome::Failed => {}
        }

        self.stats.session_finished(outcome);
    }
}
