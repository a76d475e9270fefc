//! Workflow run proxy.

use axum::{
    body::Body,
    extract::{Request, State},
    http::Response,
};
use serde_json::Map;
use tracing::debug;

use crate::AppState;
use crate::error::ApiResult;
use crate::settings::DifyConfig;

use super::body::{parse_json_object, read_body};
use super::relay::{RELAY_CHUNK_SIZE, relay_response};
use super::upstream::DifyClient;

/// Run a Dify workflow with the request body as its inputs.
///
/// Any method is accepted. An empty body runs the workflow with no inputs.
pub async fn dify_workflow_proxy(
    State(state): State<AppState>,
    config: DifyConfig,
    req: Request,
) -> ApiResult<Response<Body>> {
    let (parts, body) = req.into_parts();
    debug!(
        method = %parts.method,
        uri = %parts.uri,
        content_length = ?parts.headers.get(axum::http::header::CONTENT_LENGTH),
        "Received workflow proxy request"
    );

    let bytes = read_body(&parts.headers, body, state.upstream.max_body_bytes).await?;
    let inputs = if bytes.is_empty() {
        Map::new()
    } else {
        parse_json_object(&bytes)?
    };

    let client = DifyClient::new(&state, &config);
    let upstream = client.run_workflow(&inputs).await?;

    relay_response(upstream, RELAY_CHUNK_SIZE, state.upstream.idle_timeout())
}
