//! Shared harness: a real Reel server bound to an ephemeral port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reel_core::catalog::test_fixtures::create_test_catalog;
use reel_core::config::ReelConfig;
use reel_core::streaming::StreamStatsSnapshot;
use reel_web::{AppState, serve_on};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub dir: TempDir,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    /// Starts a server over a fresh catalog holding `files`.
    pub async fn start(files: &[(&str, &str, Vec<u8>)]) -> Self {
        Self::start_with(files, |_| {}).await
    }

    /// Like [`TestServer::start`], with a hook to adjust the configuration.
    pub async fn start_with(
        files: &[(&str, &str, Vec<u8>)],
        configure: impl FnOnce(&mut ReelConfig),
    ) -> Self {
        let (dir, catalog) = create_test_catalog(files).await;
        let mut config = ReelConfig::for_testing(dir.path());
        configure(&mut config);

        let state = AppState::from_config(&config, catalog);
        let listener = TcpListener::bind(config.server.bind_addr).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server_state = state.clone();
        tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            serve_on(listener, server_state, shutdown).await.unwrap();
        });

        Self {
            addr,
            state,
            dir,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn media_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("media")
    }

    pub fn catalog(&self) -> &Arc<reel_core::Catalog> {
        &self.state.catalog
    }

    pub fn stats(&self) -> StreamStatsSnapshot {
        self.state.responder.stats().snapshot()
    }

    /// Polls the stream counters until `done` holds or five seconds pass.
    pub async fn wait_for_stats(
        &self,
        done: impl Fn(&StreamStatsSnapshot) -> bool,
    ) -> StreamStatsSnapshot {
        for _ in 0..100 {
            let snapshot = self.stats();
            if done(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.stats()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Client that never reuses connections, so a dropped body closes its socket.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}
