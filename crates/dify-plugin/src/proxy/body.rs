//! Inbound request body limits and JSON decoding.

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, header};
use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::error::{ApiError, ApiResult};

/// Reject a request whose declared `Content-Length` exceeds `max_body_bytes`.
pub fn enforce_body_limit(headers: &HeaderMap, max_body_bytes: usize) -> ApiResult<()> {
    if let Some(value) = headers.get(header::CONTENT_LENGTH) {
        let length = value
            .to_str()
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| ApiError::bad_request("Invalid Content-Length header"))?;
        if length > max_body_bytes as u64 {
            warn!(
                "Request body of {} bytes exceeds limit of {} bytes",
                length, max_body_bytes
            );
            return Err(ApiError::PayloadTooLarge {
                limit: max_body_bytes,
            });
        }
    }
    Ok(())
}

/// Buffer a request body, enforcing `max_body_bytes` on both the declared
/// and the actual length.
pub async fn read_body(headers: &HeaderMap, body: Body, max_body_bytes: usize) -> ApiResult<Bytes> {
    enforce_body_limit(headers, max_body_bytes)?;
    axum::body::to_bytes(body, max_body_bytes)
        .await
        .map_err(|e| {
            if e.to_string().contains("length limit") {
                warn!(
                    "Request body exceeded limit of {} bytes while streaming",
                    max_body_bytes
                );
                return ApiError::PayloadTooLarge {
                    limit: max_body_bytes,
                };
            }
            error!("Failed to buffer request body: {:?}", e);
            ApiError::bad_request(format!("Failed to read request body: {e}"))
        })
}

/// Decode a body as a JSON object. `null` decodes as an empty object.
pub fn parse_json_object(bytes: &[u8]) -> ApiResult<Map<String, Value>> {
    let parsed: Option<Map<String, Value>> = serde_json::from_slice(bytes)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON in request body: {e}")))?;
    Ok(parsed.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_length(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn enforce_body_limit_allows_small() {
        assert!(enforce_body_limit(&headers_with_length("10"), 20).is_ok());
        assert!(enforce_body_limit(&HeaderMap::new(), 20).is_ok());
    }

    #[test]
    fn enforce_body_limit_allows_exact_limit() {
        assert!(enforce_body_limit(&headers_with_length("64"), 64).is_ok());
    }

    #[test]
    fn enforce_body_limit_rejects_large() {
        let err = enforce_body_limit(&headers_with_length("65"), 64).unwrap_err();
        assert!(matches!(err, ApiError::PayloadTooLarge { limit: 64 }));
    }

    #[test]
    fn enforce_body_limit_rejects_invalid_length() {
        let err = enforce_body_limit(&headers_with_length("nope"), 64).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn read_body_rejects_undeclared_oversize() {
        let err = read_body(&HeaderMap::new(), Body::from(vec![b'x'; 65]), 64)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::PayloadTooLarge { .. }));
    }

    #[tokio::test]
    async fn read_body_returns_bytes_within_limit() {
        let bytes = read_body(&HeaderMap::new(), Body::from("{}"), 64)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"{}");
    }

    #[test]
    fn parse_json_object_accepts_objects_and_null() {
        let parsed = parse_json_object(br#"{"a":1}"#).unwrap();
        assert_eq!(parsed.get("a"), Some(&Value::from(1)));
        assert!(parse_json_object(b"null").unwrap().is_empty());
    }

    #[test]
    fn parse_json_object_rejects_other_json() {
        for body in [&b"[1]"[..], b"\"text\"", b"{broken", b"   "] {
            let err = parse_json_object(body).unwrap_err();
            assert!(
                err.to_string().starts_with("Invalid JSON in request body"),
                "{err}"
            );
        }
    }
}
