//! Range-aware response production.
//!
//! Streaming runs as two strict phases. Negotiation resolves the content,
//! settles the status and every header, and opens the file; failures here
//! still become clean 404/416/500 responses. Only then is a body attached,
//! and from that point the response is committed: a read error can only
//! abort the connection.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::{debug, error, info, warn};

use super::{ByteRange, ChunkReader, RangeRequest, StreamSession, StreamStats};
use crate::catalog::{ContentLocator, ContentRef, LocateError};
use crate::config::StreamingConfig;

/// Everything decided about a response before its first body byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    /// Freshly resolved content
    pub content: ContentRef,
    /// 200 for the full entity, 206 for a single range
    pub status: StatusCode,
    /// Bytes to send; `None` only for an empty entity
    pub range: Option<ByteRange>,
}

impl TransferPlan {
    /// Exact `Content-Length` of the body.
    pub fn content_length(&self) -> u64 {
        self.range.map_or(0, |range| range.len())
    }
}

/// Terminal responses produced before any body byte is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Unknown identifier, or a catalogued file that is missing
    NotFound { id: String },
    /// Range cannot be satisfied; carries the length for `Content-Range: bytes */len`
    RangeNotSatisfiable { total_length: u64 },
    /// File could not be opened although it was just resolved
    Internal { id: String },
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        match self {
            Rejection::NotFound { .. } => (
                StatusCode::NOT_FOUND,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                "Content not found",
            )
                .into_response(),
            Rejection::RangeNotSatisfiable { total_length } => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [
                    (header::CONTENT_RANGE, format!("bytes */{total_length}")),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                ],
            )
                .into_response(),
            Rejection::Internal { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                "Content could not be read",
            )
                .into_response(),
        }
    }
}

/// Produces 200/206/404/416 responses for content identifiers.
///
/// Stateless per request apart from the shared [`StreamStats`]; one
/// responder serves every connection.
pub struct StreamResponder {
    locator: Arc<dyn ContentLocator>,
    chunk_size: usize,
    cache_control: HeaderValue,
    stats: Arc<StreamStats>,
}

impl StreamResponder {
    /// Creates a responder reading through `locator`.
    pub fn new(locator: Arc<dyn ContentLocator>, config: &StreamingConfig) -> Self {
        let cache_control = HeaderValue::from_str(&config.cache_control)
            .unwrap_or_else(|_| HeaderValue::from_static("no-cache"));
        Self {
            locator,
            chunk_size: config.effective_chunk_size(),
            cache_control,
            stats: Arc::new(StreamStats::new()),
        }
    }

    /// Counters shared by every session this responder started.
    pub fn stats(&self) -> &Arc<StreamStats> {
        &self.stats
    }

    /// Resolves `id` and negotiates `range_header` against its current size.
    ///
    /// # Errors
    ///
    /// - `Rejection::NotFound` - The identifier is unknown or its file is unavailable
    /// - `Rejection::RangeNotSatisfiable` - The range does not overlap the content
    pub async fn negotiate(
        &self,
        id: &str,
        range_header: Option<&str>,
    ) -> Result<TransferPlan, Rejection> {
        let content = match self.locator.locate(id).await {
            Ok(content) => content,
            Err(LocateError::NotFound { .. }) => {
                debug!("Stream request for unknown content {id}");
                return Err(Rejection::NotFound { id: id.to_string() });
            }
            Err(e @ LocateError::Unavailable { .. }) => {
                warn!("Catalogued content is unavailable, check ingest: {e}");
                return Err(Rejection::NotFound { id: id.to_string() });
            }
        };

        let total_length = content.total_length;
        let (status, range) = match RangeRequest::parse(range_header, total_length) {
            RangeRequest::NoRange => (StatusCode::OK, ByteRange::full(total_length)),
            RangeRequest::Single(range) => (StatusCode::PARTIAL_CONTENT, Some(range)),
            RangeRequest::Unsatisfiable => {
                debug!(
                    "Unsatisfiable range {:?} for {} ({} bytes)",
                    range_header, id, total_length
                );
                return Err(Rejection::RangeNotSatisfiable { total_length });
            }
        };

        Ok(TransferPlan {
            content,
            status,
            range,
        })
    }

    /// Full GET handling: negotiate, open, and attach a streaming body.
    pub async fn respond(&self, id: &str, range_header: Option<&str>) -> Response {
        let plan = match self.negotiate(id, range_header).await {
            Ok(plan) => plan,
            Err(rejection) => return rejection.into_response(),
        };

        let body = match plan.range {
            Some(range) => {
                let reader =
                    match ChunkReader::open(&plan.content.path, range, self.chunk_size).await {
                        Ok(reader) => reader,
                        Err(e) => {
                            error!("Cannot open {} for streaming: {}", id, e);
                            return Rejection::Internal { id: id.to_string() }.into_response();
                        }
                    };
                info!(
                    "Streaming {} bytes {}-{}/{} ({})",
                    id,
                    range.start(),
                    range.end(),
                    plan.content.total_length,
                    plan.status
                );
                let session = StreamSession::new(id, reader, self.stats.clone());
                Body::from_stream(session.into_body_stream())
            }
            None => Body::empty(),
        };

        self.build_response(&plan, body)
    }

    /// HEAD handling: identical headers to GET, no file is opened.
    pub async fn respond_head(&self, id: &str, range_header: Option<&str>) -> Response {
        match self.negotiate(id, range_header).await {
            Ok(plan) => self.build_response(&plan, Body::empty()),
            Err(rejection) => rejection.into_response(),
        }
    }

    fn build_response(&self, plan: &TransferPlan, body: Body) -> Response {
        let mut response = Response::builder()
            .status(plan.status)
            .header(header::CONTENT_TYPE, &plan.content.media_type)
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::CONTENT_LENGTH, plan.content_length())
            .header(header::CACHE_CONTROL, self.cache_control.clone());

        if plan.status == StatusCode::PARTIAL_CONTENT
            && let Some(range) = plan.range
        {
            response = response.header(
                header::CONTENT_RANGE,
                range.content_range(plan.content.total_length),
            );
        }

        response
            .body(body)
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use async_trait::async_trait;
    use axum::body::to_bytes;

    use super::*;
    use crate::catalog::test_fixtures::{create_test_catalog, patterned_bytes};

    const BODY_LIMIT: usize = 16 * 1024 * 1024;

    async fn responder_with(
        files: &[(&str, &str, Vec<u8>)],
    ) -> (tempfile::TempDir, Arc<crate::catalog::Catalog>, StreamResponder) {
        let (dir, catalog) = create_test_catalog(files).await;
        let config = StreamingConfig::default();
        let responder = StreamResponder::new(catalog.clone(), &config);
        (dir, catalog, responder)
    }

    fn header_str<'a>(response: &'a Response, name: header::HeaderName) -> Option<&'a str> {
        response.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// Locator that reports whatever it was built with, without touching disk.
    struct FixedLocator(ContentRef);

    #[async_trait]
    impl ContentLocator for FixedLocator {
        async fn locate(&self, _id: &str) -> Result<ContentRef, LocateError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_partial_content_scenario() {
        let data = patterned_bytes(1000);
        let (_dir, _catalog, responder) = responder_with(&[("film", "film.mp4", data.clone())]).await;

        let response = responder.respond("film", Some("bytes=200-299")).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            header_str(&response, header::CONTENT_RANGE),
            Some("bytes 200-299/1000")
        );
        assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("100"));
        assert_eq!(header_str(&response, header::ACCEPT_RANGES), Some("bytes"));
        assert_eq!(header_str(&response, header::CONTENT_TYPE), Some("video/mp4"));

        let body = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        assert_eq!(&body[..], &data[200..300]);
    }

    #[tokio::test]
    async fn test_overlong_range_is_clamped() {
        let data = patterned_bytes(1000);
        let (_dir, _catalog, responder) = responder_with(&[("film", "film.mp4", data.clone())]).await;

        let response = responder.respond("film", Some("bytes=900-2000")).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            header_str(&response, header::CONTENT_RANGE),
            Some("bytes 900-999/1000")
        );
        assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("100"));

        let body = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        assert_eq!(&body[..], &data[900..]);
    }

    #[tokio::test]
    async fn test_full_content_without_range() {
        let data = patterned_bytes(1000);
        let (_dir, _catalog, responder) = responder_with(&[("film", "film.mp4", data.clone())]).await;

        let response = responder.respond("film", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("1000"));
        assert_eq!(header_str(&response, header::ACCEPT_RANGES), Some("bytes"));
        assert!(response.headers().get(header::CONTENT_RANGE).is_none());

        let full = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        assert_eq!(&full[..], &data[..]);

        let ranged = responder.respond("film", Some("bytes=0-999")).await;
        let ranged = to_bytes(ranged.into_body(), BODY_LIMIT).await.unwrap();
        assert_eq!(full, ranged);
    }

    #[tokio::test]
    async fn test_repeated_requests_are_identical() {
        let data = patterned_bytes(5000);
        let (_dir, _catalog, responder) = responder_with(&[("film", "film.mp4", data)]).await;

        let first = responder.respond("film", Some("bytes=1234-4321")).await;
        let second = responder.respond("film", Some("bytes=1234-4321")).await;
        assert_eq!(first.headers(), second.headers());

        let first = to_bytes(first.into_body(), BODY_LIMIT).await.unwrap();
        let second = to_bytes(second.into_body(), BODY_LIMIT).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_range_starting_at_eof_is_rejected() {
        let (_dir, _catalog, responder) =
            responder_with(&[("film", "film.mp4", patterned_bytes(1000))]).await;

        let response = responder.respond("film", Some("bytes=1000-")).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            header_str(&response, header::CONTENT_RANGE),
            Some("bytes */1000")
        );
        let body = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        assert!(body.is_empty());
        assert_eq!(responder.stats().snapshot().active_sessions, 0);
    }

    #[tokio::test]
    async fn test_suffix_longer_than_file() {
        let data = vec![1, 2, 3, 4, 5];
        let (_dir, _catalog, responder) = responder_with(&[("tiny", "tiny.mp4", data.clone())]).await;

        let response = responder.respond("tiny", Some("bytes=-10")).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            header_str(&response, header::CONTENT_RANGE),
            Some("bytes 0-4/5")
        );
        let body = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        assert_eq!(&body[..], &data[..]);
    }

    #[tokio::test]
    async fn test_multi_range_degrades_to_full_content() {
        let data = patterned_bytes(300);
        let (_dir, _catalog, responder) = responder_with(&[("film", "film.mp4", data.clone())]).await;

        let response = responder.respond("film", Some("bytes=0-9,20-29")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        assert_eq!(&body[..], &data[..]);
    }

    #[tokio::test]
    async fn test_unknown_and_unavailable_content() {
        let (dir, catalog, responder) =
            responder_with(&[("film", "film.mp4", patterned_bytes(10))]).await;

        let response = responder.respond("nope", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        std::fs::remove_file(dir.path().join("media").join("film.mp4")).unwrap();
        assert!(catalog.get("film").is_some());
        let response = responder.respond("film", Some("bytes=0-")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_file() {
        let (_dir, _catalog, responder) = responder_with(&[("empty", "empty.mp4", Vec::new())]).await;

        let response = responder.respond("empty", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("0"));

        let response = responder.respond("empty", Some("bytes=0-")).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            header_str(&response, header::CONTENT_RANGE),
            Some("bytes */0")
        );
    }

    #[tokio::test]
    async fn test_head_has_headers_but_opens_nothing() {
        let (_dir, _catalog, responder) =
            responder_with(&[("film", "film.mp4", patterned_bytes(1000))]).await;

        let response = responder.respond_head("film", Some("bytes=10-19")).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("10"));
        assert_eq!(
            header_str(&response, header::CONTENT_RANGE),
            Some("bytes 10-19/1000")
        );
        drop(response);

        let snapshot = responder.stats().snapshot();
        assert_eq!(snapshot.active_sessions, 0);
        assert_eq!(snapshot.disconnected_sessions, 0);
    }

    #[tokio::test]
    async fn test_open_failure_is_clean_server_error() {
        let locator = FixedLocator(ContentRef {
            id: "ghost".to_string(),
            path: PathBuf::from("/nonexistent/reel/ghost.mp4"),
            total_length: 10,
            media_type: "video/mp4".to_string(),
        });
        let responder = StreamResponder::new(Arc::new(locator), &StreamingConfig::default());

        let response = responder.respond("ghost", None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(responder.stats().snapshot().active_sessions, 0);
    }

    #[tokio::test]
    async fn test_mid_transfer_failure_is_not_a_clean_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shrunk.mp4");
        std::fs::write(&path, patterned_bytes(100_000)).unwrap();

        // Locator believes the file is larger than it is
        let locator = FixedLocator(ContentRef {
            id: "shrunk".to_string(),
            path,
            total_length: 500_000,
            media_type: "video/mp4".to_string(),
        });
        let responder = StreamResponder::new(Arc::new(locator), &StreamingConfig::default());

        let response = responder.respond("shrunk", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("500000"));

        let result = to_bytes(response.into_body(), BODY_LIMIT).await;
        assert!(result.is_err(), "truncated transfer must surface as an error");

        let snapshot = responder.stats().snapshot();
        assert_eq!(snapshot.failed_sessions, 1);
        assert_eq!(snapshot.completed_sessions, 0);
    }

    #[tokio::test]
    async fn test_completed_transfer_is_counted() {
        let (_dir, _catalog, responder) =
            responder_with(&[("film", "film.mp4", patterned_bytes(300_000))]).await;

        let response = responder.respond("film", Some("bytes=1000-200999")).await;
        let body = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        assert_eq!(body.len(), 200_000);

        let snapshot = responder.stats().snapshot();
        assert_eq!(snapshot.completed_sessions, 1);
        assert_eq!(snapshot.bytes_served, 200_000);
        assert_eq!(snapshot.active_sessions, 0);
    }
}
