//! Catalog changes seen through the HTTP surface.

use reel_core::Catalog;
use reel_core::catalog::test_fixtures::patterned_bytes;
use reel_core::catalog::{IngestMetadata, ingest_file, scan_media_dir};
use reqwest::StatusCode;
use reqwest::header::RANGE;
use serde_json::Value;

use crate::common::{TestServer, http_client};

#[tokio::test]
async fn test_ingested_file_is_streamable_immediately() {
    let server = TestServer::start(&[]).await;
    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("Night_Train.MP4");
    let data = patterned_bytes(150_000);
    std::fs::write(&source, &data).unwrap();

    let entry = ingest_file(
        server.catalog(),
        &source,
        IngestMetadata {
            category: "Drama".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(entry.title, "Night Train");
    assert_eq!(entry.media_type, "video/mp4");

    let response = http_client()
        .get(server.url(&format!("/stream/{}", entry.id)))
        .header(RANGE, "bytes=100000-")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers()["content-range"],
        "bytes 100000-149999/150000"
    );
    assert_eq!(&response.bytes().await.unwrap()[..], &data[100_000..]);

    // No partial file is left behind next to the published one
    let leftovers: Vec<_> = std::fs::read_dir(server.media_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".partial"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[tokio::test]
async fn test_published_entries_survive_restart() {
    let server = TestServer::start(&[("first", "first.mkv", patterned_bytes(64))]).await;
    let source = server.dir.path().join("second.mp4");
    std::fs::write(&source, patterned_bytes(32)).unwrap();
    ingest_file(
        server.catalog(),
        &source,
        IngestMetadata {
            title: "Second".to_string(),
            id: Some("second".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let reopened = Catalog::open(server.catalog().catalog_path(), server.media_dir())
        .await
        .unwrap();
    let ids: Vec<String> = reopened.entries().into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec!["first".to_string(), "second".to_string()]);
    assert_eq!(reopened.get("second").unwrap().title, "Second");
}

#[tokio::test]
async fn test_scanned_files_appear_in_catalog_api() {
    let server = TestServer::start(&[]).await;
    let shows = server.media_dir().join("shows");
    std::fs::create_dir_all(&shows).unwrap();
    std::fs::write(shows.join("pilot_episode.webm"), patterned_bytes(4096)).unwrap();
    std::fs::write(server.media_dir().join("notes.txt"), b"not a video").unwrap();

    let added = scan_media_dir(server.catalog()).await.unwrap();
    assert_eq!(added, 1);

    let client = http_client();
    let listing: Value = client
        .get(server.url("/api/catalog"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["total"], 1);

    let item = &listing["entries"][0];
    assert_eq!(item["title"], "pilot episode");
    assert_eq!(item["size"], 4096);
    assert_eq!(item["available"], true);

    let stream_url = item["stream_url"].as_str().unwrap();
    let body = client
        .get(server.url(stream_url))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(body.len(), 4096);
}

#[tokio::test]
async fn test_content_published_by_another_process_is_served() {
    let server = TestServer::start(&[("first", "first.mkv", patterned_bytes(64))]).await;
    let client = http_client();

    let response = client.get(server.url("/stream/clip")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Same files, separate handle: what `reel ingest` does while the server runs
    let cli_catalog = Catalog::open(server.catalog().catalog_path(), server.media_dir())
        .await
        .unwrap();
    let source = server.dir.path().join("clip.mp4");
    let data = patterned_bytes(70_000);
    std::fs::write(&source, &data).unwrap();
    ingest_file(
        &cli_catalog,
        &source,
        IngestMetadata {
            id: Some("clip".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let response = client.get(server.url("/stream/clip")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&response.bytes().await.unwrap()[..], &data[..]);

    let listing: Value = client
        .get(server.url("/api/catalog"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["total"], 2);

    // A write from the server side keeps the other process's entry
    server.catalog().remove("first").await.unwrap();
    let reopened = Catalog::open(server.catalog().catalog_path(), server.media_dir())
        .await
        .unwrap();
    let ids: Vec<String> = reopened.entries().into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec!["clip".to_string()]);
}

#[tokio::test]
async fn test_removed_entry_stops_streaming() {
    let server = TestServer::start(&[("film", "film.mp4", patterned_bytes(100))]).await;
    let client = http_client();

    let response = client.get(server.url("/stream/film")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    server.catalog().remove("film").await.unwrap();
    let response = client.get(server.url("/stream/film")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_token_protected_server() {
    let server = TestServer::start_with(&[("film", "film.mp4", patterned_bytes(100))], |config| {
        config.server.access_token = Some("let-me-in".to_string());
    })
    .await;
    let client = http_client();

    let response = client.get(server.url("/stream/film")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(server.url("/stream/film?token=wrong"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .get(server.url("/stream/film?token=let-me-in"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.bytes().await.unwrap().len(), 100);

    let response = client
        .get(server.url("/stream/film"))
        .bearer_auth("let-me-in")
        .header(RANGE, "bytes=0-9")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
}
