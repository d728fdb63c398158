//! Router assembly and server lifecycle.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::http::header;
use axum::routing::get;
use reel_core::config::ReelConfig;
use reel_core::{Catalog, ReelError, StreamResponder};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::auth::{AccessPolicy, AllowAll, BearerTokenPolicy};
use crate::handlers::{api_catalog, api_stats, health, stream_content};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub responder: Arc<StreamResponder>,
    pub access_policy: Arc<dyn AccessPolicy>,
    pub server_started_at: Instant,
}

impl AppState {
    /// Wires the responder and access policy described by `config` around `catalog`.
    pub fn from_config(config: &ReelConfig, catalog: Arc<Catalog>) -> Self {
        let responder = StreamResponder::new(catalog.clone(), &config.streaming);
        let access_policy: Arc<dyn AccessPolicy> = match &config.server.access_token {
            Some(token) => Arc::new(BearerTokenPolicy::new(token.clone())),
            None => Arc::new(AllowAll),
        };

        Self {
            catalog,
            responder: Arc::new(responder),
            access_policy,
            server_started_at: Instant::now(),
        }
    }

    /// Replaces the access policy.
    pub fn with_access_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.access_policy = policy;
        self
    }
}

/// Errors that stop the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

impl From<ServerError> for ReelError {
    fn from(error: ServerError) -> Self {
        match error {
            ServerError::Bind { addr, source } => ReelError::Configuration {
                reason: format!("cannot listen on {addr}: {source}"),
            },
            ServerError::Serve(source) => ReelError::Io(source),
        }
    }
}

/// Builds the application router.
///
/// `GET` routes answer `HEAD` as well; the stream handler uses that to
/// skip opening the file.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/stream/{id}", get(stream_content))
        .route("/api/catalog", get(api_catalog))
        .route("/api/stats", get(api_stats))
        .route("/health", get(health))
        .layer(cors_layer())
        .with_state(state)
}

/// Cross-origin players must be able to read range headers from scripts.
fn cors_layer() -> CorsLayer {
    CorsLayer::permissive().expose_headers([
        header::CONTENT_RANGE,
        header::CONTENT_LENGTH,
        header::ACCEPT_RANGES,
    ])
}

/// Serves on an already bound listener until `shutdown` resolves.
///
/// # Errors
///
/// - `ServerError::Serve` - The accept loop failed
pub async fn serve_on<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Binds `config.server.bind_addr` and serves until Ctrl-C.
///
/// # Errors
///
/// - `ServerError::Bind` - The address is unavailable
/// - `ServerError::Serve` - The accept loop failed
pub async fn run_server(config: ReelConfig, catalog: Arc<Catalog>) -> Result<(), ServerError> {
    let addr = config.server.bind_addr;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let local_addr = listener.local_addr().unwrap_or(addr);

    let state = AppState::from_config(&config, catalog);
    info!(
        "Reel serving {} catalog entries on http://{}",
        state.catalog.snapshot().len(),
        local_addr
    );
    if config.server.access_token.is_some() {
        info!("Stream route requires a bearer token");
    }

    serve_on(listener, state, shutdown_signal()).await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C, graceful shutdown disabled: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested, waiting for open connections");
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode};
    use reel_core::catalog::test_fixtures::{create_test_catalog, patterned_bytes};
    use tower::ServiceExt;

    use super::*;

    const BODY_LIMIT: usize = 16 * 1024 * 1024;

    async fn test_state(files: &[(&str, &str, Vec<u8>)]) -> (tempfile::TempDir, AppState) {
        let (dir, catalog) = create_test_catalog(files).await;
        let config = ReelConfig::for_testing(dir.path());
        (dir, AppState::from_config(&config, catalog))
    }

    fn request(method: Method, uri: &str) -> axum::http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    #[tokio::test]
    async fn test_occupied_address_is_a_configuration_error() {
        let (dir, catalog) = create_test_catalog(&[]).await;
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = ReelConfig::for_testing(dir.path());
        config.server.bind_addr = taken.local_addr().unwrap();

        let error = run_server(config, catalog).await.unwrap_err();
        assert!(matches!(error, ServerError::Bind { .. }));

        let error = ReelError::from(error);
        assert!(error.is_user_error());
        assert!(error.user_message().contains("cannot listen on"));
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, state) = test_state(&[]).await;
        let response = build_router(state)
            .oneshot(request(Method::GET, "/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_range_request_through_router() {
        let data = patterned_bytes(1000);
        let (_dir, state) = test_state(&[("film", "film.mp4", data.clone())]).await;

        let response = build_router(state)
            .oneshot(
                request(Method::GET, "/stream/film")
                    .header(header::RANGE, "bytes=200-299")
                    .header(header::ORIGIN, "http://player.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers()[header::CONTENT_RANGE],
            "bytes 200-299/1000"
        );
        let exposed = response.headers()[header::ACCESS_CONTROL_EXPOSE_HEADERS]
            .to_str()
            .unwrap()
            .to_ascii_lowercase();
        assert!(exposed.contains("content-range"));
        assert!(exposed.contains("accept-ranges"));

        let body = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        assert_eq!(&body[..], &data[200..300]);
    }

    #[tokio::test]
    async fn test_head_request_has_no_body() {
        let (_dir, state) = test_state(&[("film", "film.mp4", patterned_bytes(1000))]).await;
        let stats = state.responder.stats().clone();

        let response = build_router(state)
            .oneshot(request(Method::HEAD, "/stream/film").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "1000");
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
        let body = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        assert!(body.is_empty());
        assert_eq!(stats.snapshot().disconnected_sessions, 0);
    }

    #[tokio::test]
    async fn test_unknown_and_traversal_ids_are_not_found() {
        let (_dir, state) = test_state(&[("film", "film.mp4", patterned_bytes(10))]).await;
        let router = build_router(state);

        for uri in ["/stream/missing", "/stream/..%2Fcatalog.json", "/stream/.hidden"] {
            let response = router
                .clone()
                .oneshot(request(Method::GET, uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_token_policy_guards_stream_route() {
        let (_dir, state) = test_state(&[("film", "film.mp4", patterned_bytes(100))]).await;
        let state = state.with_access_policy(Arc::new(BearerTokenPolicy::new("s3cret")));
        let router = build_router(state);

        let send = |builder: axum::http::request::Builder| {
            let router = router.clone();
            async move {
                router
                    .oneshot(builder.body(Body::empty()).unwrap())
                    .await
                    .unwrap()
                    .status()
            }
        };

        assert_eq!(
            send(request(Method::GET, "/stream/film")).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            send(request(Method::GET, "/stream/film").header(header::AUTHORIZATION, "Bearer nope"))
                .await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            send(
                request(Method::GET, "/stream/film").header(header::AUTHORIZATION, "Bearer s3cret")
            )
            .await,
            StatusCode::OK
        );
        assert_eq!(
            send(request(Method::GET, "/stream/film?token=s3cret")).await,
            StatusCode::OK
        );
        // Unknown ids are refused before lookup
        assert_eq!(
            send(request(Method::GET, "/stream/missing")).await,
            StatusCode::UNAUTHORIZED
        );
        // Non-stream routes stay open
        assert_eq!(send(request(Method::GET, "/health")).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_catalog_api_reports_availability() {
        let (dir, state) = test_state(&[
            ("kept", "kept.mp4", patterned_bytes(1234)),
            ("gone", "gone.webm", patterned_bytes(10)),
        ])
        .await;
        std::fs::remove_file(dir.path().join("media").join("gone.webm")).unwrap();

        let response = build_router(state)
            .oneshot(request(Method::GET, "/api/catalog").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        let listing: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(listing["total"], 2);

        let entries = listing["entries"].as_array().unwrap();
        let kept = entries.iter().find(|e| e["id"] == "kept").unwrap();
        assert_eq!(kept["available"], true);
        assert_eq!(kept["size"], 1234);
        assert_eq!(kept["stream_url"], "/stream/kept");
        assert_eq!(kept["media_type"], "video/mp4");

        let gone = entries.iter().find(|e| e["id"] == "gone").unwrap();
        assert_eq!(gone["available"], false);
        assert!(gone["size"].is_null());
    }

    #[tokio::test]
    async fn test_stats_api_counts_transfers() {
        let (_dir, state) = test_state(&[("film", "film.mp4", patterned_bytes(500))]).await;
        let router = build_router(state);

        let response = router
            .clone()
            .oneshot(
                request(Method::GET, "/stream/film")
                    .header(header::RANGE, "bytes=0-99")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();

        let response = router
            .oneshot(request(Method::GET, "/api/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        let stats: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(stats["catalog_entries"], 1);
        assert_eq!(stats["streams"]["completed_sessions"], 1);
        assert_eq!(stats["streams"]["bytes_served"], 100);
        assert_eq!(stats["streams"]["active_sessions"], 0);
    }

    #[tokio::test]
    async fn test_from_config_selects_token_policy() {
        let (dir, catalog) = create_test_catalog(&[("film", "film.mp4", patterned_bytes(10))]).await;
        let mut config = ReelConfig::for_testing(dir.path());
        config.server.access_token = Some("s3cret".to_string());

        let response = build_router(AppState::from_config(&config, catalog))
            .oneshot(request(Method::GET, "/stream/film").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
