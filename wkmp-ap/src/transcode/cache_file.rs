//! Cache-hit resource handler: a minimal byte-range static file server.
//!
//! Spec §4.6 calls this out-of-core-scope but specifies it "minimally...
//! so tests can assert end-to-end behavior". It reuses the same
//! range-parsing rules as the live path (`super::client::parse_range`) so
//! a client can't tell a cache hit from a live session by range handling
//! alone.

use std::path::PathBuf;

use async_stream::try_stream;
use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::client::{parse_range, ParsedRange};
use super::session::CHUNK_SIZE;
use crate::error::Result;

pub async fn serve_cached_file(
    path: PathBuf,
    mime_type: &'static str,
    range_header: Option<&str>,
) -> Result<Response<Body>> {
    let metadata = tokio::fs::metadata(&path).await?;
    let total_len = metadata.len();
    let parsed = parse_range(range_header, total_len);

    if parsed == ParsedRange::Unsatisfiable {
        return Ok(Response::builder()
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(header::CONTENT_RANGE, format!("bytes */{total_len}"))
            .body(Body::empty())
            .expect("static response is well-formed"));
    }

    let (status, start, end) = match parsed {
        ParsedRange::Absent | ParsedRange::Multiple => (StatusCode::OK, 0u64, total_len),
        ParsedRange::Single { start, end: Some(e) } => (StatusCode::PARTIAL_CONTENT, start, (e + 1).min(total_len)),
        ParsedRange::Single { start, end: None } => (StatusCode::PARTIAL_CONTENT, start, total_len),
        ParsedRange::Unsatisfiable => unreachable!("handled above"),
    };
    let content_length = end.saturating_sub(start);

    let mut builder = Response::builder()
        .status(status)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_TYPE, mime_type)
        .header(header::CONTENT_LENGTH, content_length);
    if status == StatusCode::PARTIAL_CONTENT {
        builder = builder.header(
            header::CONTENT_RANGE,
            HeaderValue::from_str(&format!("bytes {start}-{}/{total_len}", end.saturating_sub(1)))
                .expect("numeric range header is valid ascii"),
        );
    }

    let stream = try_stream! {
        let mut file = tokio::fs::File::open(&path).await?;
        file.seek(std::io::SeekFrom::Start(start)).await?;
        let mut remaining = content_length;
        let mut buf = vec![0u8; CHUNK_SIZE];
        while remaining > 0 {
            let want = std::cmp::min(remaining, CHUNK_SIZE as u64) as usize;
            let n = file.read(&mut buf[..want]).await?;
            if n == 0 {
                break;
            }
            remaining -= n as u64;
            yield Bytes::copy_from_slice(&buf[..n]);
        }
    };

    Ok(builder
        .body(Body::from_stream(stream))
        .expect("response with a streaming body is well-formed"))
}
