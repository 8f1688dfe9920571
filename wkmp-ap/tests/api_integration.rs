//! Router-level integration tests for the `/transcode` HTTP surface
//! (spec §6.2, §8 boundary behaviors B1-B3).

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use wkmp_ap::api::{create_router, AppState};
use wkmp_ap::config::Config;
use wkmp_ap::transcode::registry::SessionRegistry;

const PAYLOAD: &str = "WKMPFAKEENCODEROUTPUTBYTES0123456789";

fn fixture(name: &str) -> String {
    concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/").to_string() + name
}

fn test_app(cache_root: PathBuf) -> axum::Router {
    let config = Arc::new(Config {
        cache_root,
        port: 0,
        encoder_path: fixture("fake_encoder.sh"),
        allowed_bitrates: vec![320_000, 256_000, 192_000, 160_000, 128_000, 96_000, 64_000, 32_000],
        client_wait_timeout_seconds: 5,
    });
    let registry = SessionRegistry::new();
    create_router(AppState { config, registry })
}

async fn get(app: &axum::Router, uri: &str, range: Option<&str>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(range) = range {
        builder = builder.header(axum::http::header::RANGE, range);
    }
    let request = builder.body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, headers, body)
}

#[tokio::test]
async fn health_reports_configured_port() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path().to_path_buf());

    let (status, _headers, body) = get(&app, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "wkmp-ap");
}

#[tokio::test]
async fn full_stream_pads_body_to_estimated_content_length() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path().to_path_buf());

    let uri = "/transcode?path=/music/full.flac&duration_ms=60000&format=mp3&bitrate=128000";
    let (status, headers, body) = get(&app, uri, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("content-type").unwrap(), "audio/mpeg");
    // 128000 / 8 * 60 = 960000 (spec §4.2's constant-bitrate estimate).
    assert_eq!(headers.get("content-length").unwrap(), "960000");
    assert_eq!(body.len(), 960_000);
    assert_eq!(&body[..PAYLOAD.len()], PAYLOAD.as_bytes());
    assert!(body[PAYLOAD.len()..].iter().all(|&b| b == 0), "remainder must be zero-padded");
}

#[tokio::test]
async fn range_request_slices_the_same_underlying_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path().to_path_buf());

    let uri = "/transcode?path=/music/range.flac&duration_ms=60000&format=mp3&bitrate=128000";
    let (status, headers, body) = get(&app, uri, Some("bytes=10-20")).await;

    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(headers.get("content-range").unwrap(), "bytes 10-20/960000");
    assert_eq!(headers.get("content-length").unwrap(), "11");
    assert_eq!(body, PAYLOAD.as_bytes()[10..21].to_vec());
}

#[tokio::test]
async fn range_entirely_beyond_estimate_is_unsatisfiable() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path().to_path_buf());

    let uri = "/transcode?path=/music/beyond.flac&duration_ms=60000&format=mp3&bitrate=128000";
    let (status, headers, _body) = get(&app, uri, Some("bytes=970000-980000")).await;

    assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(headers.get("content-range").unwrap(), "bytes */960000");
}

#[tokio::test]
async fn second_request_is_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path().to_path_buf());
    let uri = "/transcode?path=/music/cache.flac&duration_ms=60000&format=mp3&bitrate=128000";

    let (status_one, _headers_one, body_one) = get(&app, uri, None).await;
    assert_eq!(status_one, StatusCode::OK);

    let (status_two, headers_two, body_two) = get(&app, uri, None).await;
    assert_eq!(status_two, StatusCode::OK);
    assert_eq!(headers_two.get("content-length").unwrap(), "960000");
    assert_eq!(body_one, body_two, "cache hit must reproduce the same bytes");
}

#[tokio::test]
async fn unknown_format_is_a_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path().to_path_buf());

    let uri = "/transcode?path=/music/badformat.flac&duration_ms=60000&format=flac&bitrate=128000";
    let (status, _headers, _body) = get(&app, uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn zero_bitrate_is_a_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path().to_path_buf());

    let uri = "/transcode?path=/music/badbitrate.flac&duration_ms=60000&format=mp3&bitrate=0";
    let (status, _headers, _body) = get(&app, uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
