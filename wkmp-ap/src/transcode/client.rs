//! Per-HTTP-request adapter between a live [`Session`] and the response
//! body the HTTP layer streams to the client.
//!
//! Grounded in `original_source/src/libs/av/impl/CachingTranscoderClientHandler.cpp`
//! for the state machine and range-parse rules; the suspend/resume
//! machinery is rendered as a single `async_stream::stream!` generator
//! instead of a continuation object, per spec §9's design note.

use std::time::Duration;

use async_stream::try_stream;
use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use bytes::Bytes;
use futures::Stream;

use super::session::{Session, SessionStatus};
use std::sync::Arc;

use super::session::ClientShared;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParsedRange {
    Absent,
    Single { start: u64, end: Option<u64> },
    Multiple,
    Unsatisfiable,
}

/// Parses a `Range` header value against a known resource length. Only a
/// single closed or open range is honored (spec §4.5); anything else that
/// isn't outright unsatisfiable downgrades to serving the whole resource.
pub(crate) fn parse_range(header_value: Option<&str>, total_len: u64) -> ParsedRange {
    let Some(value) = header_value else {
        return ParsedRange::Absent;
    };
    let Some(ranges) = value.strip_prefix("bytes=") else {
        return ParsedRange::Unsatisfiable;
    };
    if ranges.contains(',') {
        return ParsedRange::Multiple;
    }
    let Some((start_str, end_str)) = ranges.split_once('-') else {
        return ParsedRange::Unsatisfiable;
    };
    if start_str.is_empty() {
        // Suffix ranges ("-500" = last 500 bytes) aren't specified; treat
        // conservatively as unsatisfiable rather than guess intent.
        return ParsedRange::Unsatisfiable;
    }
    let Ok(start) = start_str.parse::<u64>() else {
        return ParsedRange::Unsatisfiable;
    };
    if start >= total_len {
        return ParsedRange::Unsatisfiable;
    }
    if end_str.is_empty() {
        return ParsedRange::Single { start, end: None };
    }
    let Ok(end) = end_str.parse::<u64>() else {
        return ParsedRange::Unsatisfiable;
    };
    if end < start {
        return ParsedRange::Unsatisfiable;
    }
    ParsedRange::Single { start, end: Some(end) }
}

/// One client's view onto a live session: where it is in the stream, and
/// where it stops.
pub struct ClientAdapter {
    session: Arc<Session>,
    shared: Arc<ClientShared>,
    wait_timeout: Duration,
}

impl ClientAdapter {
    pub(crate) fn new(session: Arc<Session>, shared: Arc<ClientShared>, wait_timeout: Duration) -> Self {
        ClientAdapter {
            session,
            shared,
            wait_timeout,
        }
    }

    /// Consumes the adapter and produces the full HTTP response: status
    /// and headers are fixed up front (Init → Serving of spec §4.5); the
    /// body is a stream driven by the remaining states.
    pub fn into_response(self, range_header: Option<&str>) -> Response<Body> {
        let total_len = self.session.estimated_total();
        let parsed = parse_range(range_header, total_len);

        if parsed == ParsedRange::Unsatisfiable {
            self.shared.mark_dead();
            return Response::builder()
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(header::CONTENT_RANGE, format!("bytes */{total_len}"))
                .body(Body::empty())
                .expect("static response is well-formed");
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
            .header(header::CONTENT_TYPE, self.session.mime_type())
            .header(header::CONTENT_LENGTH, content_length);
        if status == StatusCode::PARTIAL_CONTENT {
            builder = builder.header(
                header::CONTENT_RANGE,
                HeaderValue::from_str(&format!("bytes {start}-{}/{total_len}", end.saturating_sub(1)))
                    .expect("numeric range header is valid ascii"),
            );
        }

        let body_stream = self.stream_body(start, end);
        builder
            .body(Body::from_stream(body_stream))
            .expect("response with a streaming body is well-formed")
    }

    fn stream_body(self, start: u64, end: u64) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        try_stream! {
            let ClientAdapter { session, shared, wait_timeout } = self;
            let mut next_offset = start;

            'outer: loop {
                if shared.is_dead() {
                    break 'outer;
                }
                if next_offset >= end {
                    break 'outer;
                }

                let produced = session.produced_bytes();
                if next_offset < produced {
                    let chunk = session.serve(next_offset, end - next_offset).await?;
                    if chunk.is_empty() {
                        // Nothing actually available despite the check above
                        // (session truncated concurrently); fall through to
                        // re-evaluate status below instead of spinning.
                    } else {
                        next_offset += chunk.len() as u64;
                        yield chunk;
                        continue 'outer;
                    }
                }

                match session.status() {
                    SessionStatus::Working => {
                        let waited = tokio::time::timeout(wait_timeout, shared.wait()).await;
                        if waited.is_err() {
                            tracing::warn!("client wait timer expired without a session notification");
                        }
                        continue 'outer;
                    }
                    SessionStatus::Done => {
                        let final_bytes = session.final_bytes().unwrap_or(produced);
                        if next_offset < final_bytes {
                            // A last sliver landed between our produced_bytes
                            // read and the Done transition; go round again.
                            continue 'outer;
                        }
                        if next_offset < end {
                            // Padding: the encoder finished short of the
                            // estimate we already promised in Content-Length.
                            let pad_len = (end - next_offset) as usize;
                            yield Bytes::from(vec![0u8; pad_len]);
                            next_offset = end;
                        }
                        break 'outer;
                    }
                    SessionStatus::Errored => {
                        shared.mark_dead();
                        break 'outer;
                    }
                }
            }
        }
    }
}
