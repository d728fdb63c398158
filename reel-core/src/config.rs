//! Centralized configuration for Reel.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;

/// Smallest chunk the stream responder will read per poll.
pub const MIN_CHUNK_SIZE: usize = 64 * 1024; // 64 KiB
/// Largest chunk the stream responder will read per poll.
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024; // 1 MiB

/// Central configuration for all Reel components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct ReelConfig {
    pub server: ServerConfig,
    pub streaming: StreamingConfig,
    pub catalog: CatalogConfig,
}

/// HTTP listener and access configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    pub bind_addr: SocketAddr,
    /// Shared bearer token required by the stream route (None = open access)
    pub access_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 3001)),
            access_token: None,
        }
    }
}

/// Byte transfer tuning.
///
/// Controls how much of a file is held in memory per in-flight response
/// and which caching directives accompany streamed media.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Bytes read from disk per body chunk
    pub chunk_size: usize,
    /// Value of the `Cache-Control` header on media responses
    pub cache_control: String,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 256 * 1024, // 256 KiB
            cache_control: "no-cache".to_string(),
        }
    }
}

impl StreamingConfig {
    /// Chunk size clamped into the supported window.
    ///
    /// # Examples
    /// ```
    /// use reel_core::config::{MAX_CHUNK_SIZE, StreamingConfig};
    ///
    /// let config = StreamingConfig {
    ///     chunk_size: usize::MAX,
    ///     ..Default::default()
    /// };
    /// assert_eq!(config.effective_chunk_size(), MAX_CHUNK_SIZE);
    /// ```
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
    }
}

/// Catalog storage locations.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// JSON file holding the catalog entries
    pub catalog_path: PathBuf,
    /// Directory that published media files live under
    pub media_dir: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("data/catalog.json"),
            media_dir: PathBuf::from("data/media"),
        }
    }
}

impl ReelConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("REEL_BIND_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.server.bind_addr = parsed,
                Err(_) => tracing::warn!("Ignoring invalid REEL_BIND_ADDR: {addr}"),
            }
        }

        if let Ok(token) = std::env::var("REEL_ACCESS_TOKEN")
            && !token.is_empty()
        {
            config.server.access_token = Some(token);
        }

        if let Ok(size) = std::env::var("REEL_CHUNK_SIZE") {
            match size.parse::<usize>() {
                Ok(bytes) => config.streaming.chunk_size = bytes,
                Err(_) => tracing::warn!("Ignoring invalid REEL_CHUNK_SIZE: {size}"),
            }
        }

        if let Ok(path) = std::env::var("REEL_CATALOG_PATH") {
            config.catalog.catalog_path = PathBuf::from(path);
        }

        if let Ok(dir) = std::env::var("REEL_MEDIA_DIR") {
            config.catalog.media_dir = PathBuf::from(dir);
        }

        config
    }

    /// Creates a configuration rooted in a scratch directory, for tests.
    pub fn for_testing(root: &std::path::Path) -> Self {
        Self {
            server: ServerConfig {
                bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)),
                access_token: None,
            },
            streaming: StreamingConfig {
                chunk_size: MIN_CHUNK_SIZE,
                ..Default::default()
            },
            catalog: CatalogConfig {
                catalog_path: root.join("catalog.json"),
                media_dir: root.join("media"),
            },
        }
    }
}
