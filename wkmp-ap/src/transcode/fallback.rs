//! Non-caching transcode path: used only when cache-path preparation or
//! encoder spawn failed (spec §4.1 step 7), so the request still succeeds
//! even though nothing durable gets written.
//!
//! Out of the core's coordination scope per spec, but simple enough to
//! implement directly rather than stub out: spawn the encoder and stream
//! its stdout straight to the client. There is no cache file to seek
//! within, so range requests are not honored here — every response is a
//! full `200 OK` body.

use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use async_stream::try_stream;
use bytes::Bytes;

use super::encoder::EncoderDriver;
use super::fingerprint::{InputParams, OutputParams};
use super::session::{estimate_content_length, CHUNK_SIZE};
use crate::error::Result;

pub async fn stream_without_cache(
    encoder_path: &str,
    input: InputParams,
    output: OutputParams,
) -> Result<Response<Body>> {
    let estimated_total = estimate_content_length(&input, &output);
    let mime_type = output.format.mime_type();
    let mut driver = EncoderDriver::spawn(encoder_path, &input, &output)?;

    let body_stream = try_stream! {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = driver.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            yield Bytes::copy_from_slice(&buf[..n]);
        }
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime_type)
        .header(header::CONTENT_LENGTH, estimated_total)
        .header(header::ACCEPT_RANGES, "none")
        .body(Body::from_stream(body_stream))
        .expect("response with a streaming body is well-formed"))
}
