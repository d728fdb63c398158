//! Range negotiation over a real socket.

use reel_core::catalog::test_fixtures::patterned_bytes;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};

use crate::common::{TestServer, http_client};

async fn film_server(len: usize) -> (TestServer, Vec<u8>) {
    let data = patterned_bytes(len);
    let server = TestServer::start(&[("film", "film.mp4", data.clone())]).await;
    (server, data)
}

fn header<'a>(response: &'a reqwest::Response, name: reqwest::header::HeaderName) -> &'a str {
    response.headers()[name].to_str().unwrap()
}

#[tokio::test]
async fn test_seek_into_middle_of_file() {
    let (server, data) = film_server(1000).await;

    let response = http_client()
        .get(server.url("/stream/film"))
        .header(RANGE, "bytes=200-299")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&response, CONTENT_RANGE), "bytes 200-299/1000");
    assert_eq!(header(&response, CONTENT_LENGTH), "100");
    assert_eq!(header(&response, ACCEPT_RANGES), "bytes");
    assert_eq!(header(&response, CONTENT_TYPE), "video/mp4");

    let body = response.bytes().await.unwrap();
    assert_eq!(&body[..], &data[200..300]);
}

#[tokio::test]
async fn test_overlong_end_is_clamped() {
    let (server, data) = film_server(1000).await;

    let response = http_client()
        .get(server.url("/stream/film"))
        .header(RANGE, "bytes=900-2000")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&response, CONTENT_RANGE), "bytes 900-999/1000");
    assert_eq!(header(&response, CONTENT_LENGTH), "100");
    assert_eq!(&response.bytes().await.unwrap()[..], &data[900..]);
}

#[tokio::test]
async fn test_plain_get_returns_whole_file() {
    let (server, data) = film_server(1000).await;
    let client = http_client();

    let full = client.get(server.url("/stream/film")).send().await.unwrap();
    assert_eq!(full.status(), StatusCode::OK);
    assert_eq!(header(&full, CONTENT_LENGTH), "1000");
    assert_eq!(header(&full, ACCEPT_RANGES), "bytes");
    assert!(full.headers().get(CONTENT_RANGE).is_none());
    let full = full.bytes().await.unwrap();
    assert_eq!(&full[..], &data[..]);

    let ranged = client
        .get(server.url("/stream/film"))
        .header(RANGE, "bytes=0-999")
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(full, ranged);
}

#[tokio::test]
async fn test_range_past_end_is_unsatisfiable() {
    let (server, _data) = film_server(1000).await;

    for range in ["bytes=1000-", "bytes=5000-6000", "bytes=-0", "items=0-10"] {
        let response = http_client()
            .get(server.url("/stream/film"))
            .header(RANGE, range)
            .send()
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::RANGE_NOT_SATISFIABLE,
            "{range}"
        );
        assert_eq!(header(&response, CONTENT_RANGE), "bytes */1000", "{range}");
    }
}

#[tokio::test]
async fn test_suffix_range_covers_small_file() {
    let server = TestServer::start(&[("tiny", "tiny.webm", vec![9, 8, 7, 6, 5])]).await;

    let response = http_client()
        .get(server.url("/stream/tiny"))
        .header(RANGE, "bytes=-10")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&response, CONTENT_RANGE), "bytes 0-4/5");
    assert_eq!(header(&response, CONTENT_TYPE), "video/webm");
    assert_eq!(&response.bytes().await.unwrap()[..], &[9, 8, 7, 6, 5]);
}

#[tokio::test]
async fn test_repeated_range_requests_match() {
    let (server, data) = film_server(300_000).await;
    let client = http_client();

    let mut bodies = Vec::new();
    for _ in 0..3 {
        let body = client
            .get(server.url("/stream/film"))
            .header(RANGE, "bytes=70000-250000")
            .send()
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        bodies.push(body);
    }

    assert_eq!(&bodies[0][..], &data[70_000..=250_000]);
    assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn test_head_mirrors_get_headers() {
    let (server, _data) = film_server(1000).await;
    let client = http_client();

    let head = client
        .head(server.url("/stream/film"))
        .header(RANGE, "bytes=100-")
        .send()
        .await
        .unwrap();
    let get = client
        .get(server.url("/stream/film"))
        .header(RANGE, "bytes=100-")
        .send()
        .await
        .unwrap();

    assert_eq!(head.status(), get.status());
    for name in [CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ACCEPT_RANGES] {
        assert_eq!(head.headers().get(&name), get.headers().get(&name), "{name}");
    }
    assert!(head.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_content_is_not_found() {
    let (server, _data) = film_server(10).await;

    let response = http_client()
        .get(server.url("/stream/not-here"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cross_origin_player_can_read_range_headers() {
    let (server, _data) = film_server(1000).await;

    let response = http_client()
        .get(server.url("/stream/film"))
        .header(RANGE, "bytes=0-1")
        .header("Origin", "http://player.example")
        .send()
        .await
        .unwrap();

    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let exposed = header(&response, reqwest::header::ACCESS_CONTROL_EXPOSE_HEADERS)
        .to_ascii_lowercase();
    assert!(exposed.contains("content-range"));
    assert!(exposed.contains("content-length"));
}
