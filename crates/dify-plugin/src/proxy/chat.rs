//! Streaming chat proxy.

use axum::{
    body::Body,
    extract::{Request, State},
    http::Response,
};
use serde_json::Value;
use tracing::debug;

use crate::AppState;
use crate::error::{ApiError, ApiResult};
use crate::settings::DifyConfig;

use super::body::{parse_json_object, read_body};
use super::relay::SseWriter;
use super::upstream::DifyClient;

/// A validated chat request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub query: String,
    pub conversation_id: String,
}

impl ChatRequest {
    /// Validate a raw chat request body.
    ///
    /// `query` must be a non-empty string. `conversation_id` starts a new
    /// conversation when absent.
    pub fn from_body(bytes: &[u8]) -> ApiResult<Self> {
        if bytes.is_empty() {
            return Err(ApiError::bad_request("Request body cannot be empty"));
        }
        let body = parse_json_object(bytes)?;

        let query = match body.get("query") {
            None | Some(Value::Null) => {
                return Err(ApiError::bad_request(
                    "query field is required in the request body",
                ));
            }
            Some(Value::String(query)) if query.is_empty() => {
                return Err(ApiError::bad_request("query field cannot be empty"));
            }
            Some(Value::String(query)) => query.clone(),
            Some(_) => return Err(ApiError::bad_request("query field must be a string")),
        };

        let conversation_id = match body.get("conversation_id") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(id)) => id.clone(),
            Some(_) => {
                return Err(ApiError::bad_request(
                    "conversation_id field must be a string",
                ));
            }
        };

        Ok(Self {
            query,
            conversation_id,
        })
    }
}

/// Send a chat message to Dify and relay its event stream.
pub async fn dify_chat_proxy(
    State(state): State<AppState>,
    config: DifyConfig,
    req: Request,
) -> ApiResult<Response<Body>> {
    let writer = SseWriter::for_version(req.version(), state.upstream.idle_timeout())?;

    let (parts, body) = req.into_parts();
    let bytes = read_body(&parts.headers, body, state.upstream.max_body_bytes).await?;
    let chat = ChatRequest::from_body(&bytes)?;
    debug!(
        conversation_id = %chat.conversation_id,
        query_len = chat.query.len(),
        "Received chat proxy request"
    );

    let client = DifyClient::new(&state, &config);
    let upstream = client
        .send_chat_message(&chat.query, &chat.conversation_id)
        .await?;

    writer.relay(upstream)
}
