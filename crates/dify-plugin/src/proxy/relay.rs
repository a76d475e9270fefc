//! Relaying upstream responses back to the caller.
//!
//! The upstream body is re-read through a bounded buffer and handed to the
//! caller chunk by chunk as it arrives. Each read is bounded by an idle
//! deadline, and the whole relay is dropped (closing the upstream connection)
//! as soon as the caller goes away and the server drops the response body.

use std::convert::Infallible;
use std::io;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode, Version, header};
use futures::{Stream, StreamExt, TryStreamExt};
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, error, warn};

use crate::error::{ApiError, ApiResult};

/// Read buffer used when relaying JSON and workflow bodies.
pub const RELAY_CHUNK_SIZE: usize = 32 * 1024;

/// Read buffer used when relaying event streams.
pub const SSE_CHUNK_SIZE: usize = 4 * 1024;

pub const EVENT_STREAM: &str = "text/event-stream";

/// Connection-scoped headers that must not be copied between hops.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Copy upstream headers, dropping hop-by-hop headers and anything in `skip`.
pub fn copy_headers(src: &HeaderMap, dst: &mut HeaderMap, skip: &[HeaderName]) {
    for (name, value) in src.iter() {
        if is_hop_by_hop(name) || skip.contains(name) {
            continue;
        }
        dst.append(name.clone(), value.clone());
    }
}

/// Re-chunk `stream` into reads of at most `chunk_size` bytes.
///
/// The stream ends quietly at upstream EOF, at the first read error, or when
/// no bytes arrive within `idle_timeout`; the status line is already
/// committed by then, so failures are only logged.
pub fn relay_stream<S, E>(
    stream: S,
    chunk_size: usize,
    idle_timeout: Duration,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let reader = StreamReader::new(stream.map_err(io::Error::other));
    let chunks = Box::pin(ReaderStream::with_capacity(reader, chunk_size));

    futures::stream::unfold(chunks, move |mut chunks| async move {
        match tokio::time::timeout(idle_timeout, chunks.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), chunks)),
            Ok(Some(Err(e))) => {
                debug!("Error reading from upstream: {}", e);
                None
            }
            Ok(None) => None,
            Err(_) => {
                warn!(
                    "Upstream sent nothing for {:?}; closing relay",
                    idle_timeout
                );
                None
            }
        }
    })
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> ApiResult<Response<Body>> {
    let mut response = Response::builder()
        .status(status)
        .body(body)
        .map_err(|e| {
            error!("Failed to build relay response: {:?}", e);
            ApiError::internal("Failed to build response")
        })?;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Relay status, headers and body of `upstream` unchanged.
pub fn relay_response(
    upstream: reqwest::Response,
    chunk_size: usize,
    idle_timeout: Duration,
) -> ApiResult<Response<Body>> {
    let status = upstream.status();
    let mut headers = HeaderMap::new();
    copy_headers(upstream.headers(), &mut headers, &[]);

    let body = Body::from_stream(relay_stream(upstream.bytes_stream(), chunk_size, idle_timeout));
    build_response(status, headers, body)
}

/// A response writer able to deliver a body incrementally.
///
/// Construction is where streaming capability is decided: protocols that
/// cannot carry a chunked body are refused up front.
#[derive(Debug, Clone, Copy)]
pub struct SseWriter {
    chunk_size: usize,
    idle_timeout: Duration,
}

impl SseWriter {
    /// Create a writer for a caller speaking `version`.
    pub fn for_version(version: Version, idle_timeout: Duration) -> ApiResult<Self> {
        if version == Version::HTTP_09 || version == Version::HTTP_10 {
            warn!("Caller speaks {:?}; event streams need chunked delivery", version);
            return Err(ApiError::StreamingUnsupported);
        }
        Ok(Self {
            chunk_size: SSE_CHUNK_SIZE,
            idle_timeout,
        })
    }

    /// Relay `upstream` as an event stream.
    ///
    /// `Content-Length` is dropped so the body can be delivered in chunks and
    /// `Content-Type` is forced to `text/event-stream`.
    pub fn relay(self, upstream: reqwest::Response) -> ApiResult<Response<Body>> {
        let status = upstream.status();
        let mut headers = HeaderMap::new();
        copy_headers(upstream.headers(), &mut headers, &[header::CONTENT_LENGTH]);
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM));

        let body = Body::from_stream(relay_stream(
            upstream.bytes_stream(),
            self.chunk_size,
            self.idle_timeout,
        ));
        build_response(status, headers, body)
    }
}
