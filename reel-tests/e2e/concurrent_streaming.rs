//! Concurrent sessions, abandoned transfers, and files that shrink mid-stream.

use futures::future::join_all;
use reel_core::catalog::test_fixtures::patterned_bytes;
use reqwest::StatusCode;
use reqwest::header::RANGE;

use crate::common::{TestServer, http_client};

const LARGE_FILE: usize = 32 * 1024 * 1024;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_ranges_are_independent() {
    let data = patterned_bytes(4 * 1024 * 1024);
    let server = TestServer::start(&[("film", "film.mp4", data.clone())]).await;
    let client = http_client();

    let ranges: Vec<(usize, usize)> = (0..12)
        .map(|i| {
            let start = i * 300_000 + i * 7;
            (start, start + 250_000 + i * 1_001)
        })
        .collect();

    let requests = ranges.iter().map(|&(start, end)| {
        let client = client.clone();
        let url = server.url("/stream/film");
        async move {
            let response = client
                .get(url)
                .header(RANGE, format!("bytes={start}-{end}"))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
            response.bytes().await.unwrap()
        }
    });
    let bodies = join_all(requests).await;

    for ((start, end), body) in ranges.iter().zip(&bodies) {
        assert_eq!(&body[..], &data[*start..=*end], "range {start}-{end}");
    }

    let stats = server
        .wait_for_stats(|s| s.active_sessions == 0 && s.completed_sessions == 12)
        .await;
    assert_eq!(stats.completed_sessions, 12);
    assert_eq!(stats.disconnected_sessions, 0);
    assert_eq!(stats.failed_sessions, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_client_disconnect_does_not_affect_other_sessions() {
    let data = patterned_bytes(LARGE_FILE);
    let server = TestServer::start(&[("film", "film.mp4", data.clone())]).await;
    let client = http_client();

    // Leaver reads a little and hangs up while the server still has most of the file to send
    let mut leaver = client.get(server.url("/stream/film")).send().await.unwrap();
    assert_eq!(leaver.status(), StatusCode::OK);
    let first = leaver.chunk().await.unwrap().unwrap();
    assert!(!first.is_empty());

    let stayer = client
        .get(server.url("/stream/film"))
        .header(RANGE, format!("bytes=1000-{}", LARGE_FILE - 1))
        .send()
        .await
        .unwrap();
    assert_eq!(stayer.status(), StatusCode::PARTIAL_CONTENT);

    drop(leaver);

    let body = stayer.bytes().await.unwrap();
    assert_eq!(body.len(), LARGE_FILE - 1000);
    assert!(body[..] == data[1000..], "surviving session received wrong bytes");

    let stats = server
        .wait_for_stats(|s| s.active_sessions == 0 && s.disconnected_sessions == 1)
        .await;
    assert_eq!(stats.active_sessions, 0);
    assert_eq!(stats.disconnected_sessions, 1);
    assert_eq!(stats.completed_sessions, 1);
    assert_eq!(stats.failed_sessions, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shrinking_file_aborts_the_connection() {
    let server = TestServer::start(&[("film", "film.mp4", patterned_bytes(LARGE_FILE))]).await;
    let path = server.media_dir().join("film.mp4");

    let mut response = http_client()
        .get(server.url("/stream/film"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut received = response.chunk().await.unwrap().map_or(0, |c| c.len());

    // Replace the content underneath the open transfer
    std::fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(0)
        .unwrap();

    let aborted = loop {
        match response.chunk().await {
            Ok(Some(chunk)) => received += chunk.len(),
            Ok(None) => break false,
            Err(_) => break true,
        }
    };

    assert!(aborted, "short transfer must not end like a complete one");
    assert!(received < LARGE_FILE);

    let stats = server
        .wait_for_stats(|s| s.active_sessions == 0 && s.failed_sessions == 1)
        .await;
    assert_eq!(stats.failed_sessions, 1);
    assert_eq!(stats.completed_sessions, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_clients_seeking_the_same_file() {
    let data = patterned_bytes(2 * 1024 * 1024);
    let server = TestServer::start(&[("film", "film.mp4", data.clone())]).await;
    let client = http_client();

    // Browsers fetch the tail for the index, then jump around
    let seeks = ["bytes=-65536", "bytes=0-", "bytes=1048576-", "bytes=2000000-2097151"];
    let requests = (0..16).map(|i| {
        let client = client.clone();
        let url = server.url("/stream/film");
        let seek = seeks[i % seeks.len()];
        async move {
            let response = client.get(url).header(RANGE, seek).send().await.unwrap();
            let range = response.headers()["content-range"]
                .to_str()
                .unwrap()
                .to_string();
            (range, response.bytes().await.unwrap())
        }
    });

    for (content_range, body) in join_all(requests).await {
        let span = content_range
            .strip_prefix("bytes ")
            .and_then(|rest| rest.split_once('/'))
            .map(|(span, _)| span.to_string())
            .unwrap();
        let (start, end) = span.split_once('-').unwrap();
        let (start, end): (usize, usize) = (start.parse().unwrap(), end.parse().unwrap());
        assert_eq!(&body[..], &data[start..=end], "{content_range}");
    }
}
