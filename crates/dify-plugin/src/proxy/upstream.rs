//! Outbound calls to the Dify API.
//!
//! URL and payload construction live here so handlers only decide how to
//! validate the inbound request and how to relay what comes back.

use reqwest::{RequestBuilder, Response, Url, header};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::AppState;
use crate::config::UpstreamConfig;
use crate::error::{ApiError, ApiResult};
use crate::settings::DifyConfig;

pub const WORKFLOW_RUN_PATH: &str = "/v1/workflows/run";
pub const CHAT_MESSAGES_PATH: &str = "/v1/chat-messages";
pub const CONVERSATIONS_PATH: &str = "/v1/conversations";
pub const MESSAGES_PATH: &str = "/v1/messages";

/// Body of `POST /v1/workflows/run`.
#[derive(Debug, Serialize)]
pub struct WorkflowRunPayload<'a> {
    pub inputs: &'a Map<String, Value>,
    pub response_mode: &'a str,
    pub user: &'a str,
}

/// Body of `POST /v1/chat-messages`.
#[derive(Debug, Serialize)]
pub struct ChatMessagePayload<'a> {
    pub inputs: Map<String, Value>,
    pub query: &'a str,
    pub response_mode: &'a str,
    pub conversation_id: &'a str,
    pub user: &'a str,
    pub files: Vec<Value>,
}

/// A Dify API client bound to one request's configuration.
pub struct DifyClient<'a> {
    http: &'a reqwest::Client,
    config: &'a DifyConfig,
    upstream: &'a UpstreamConfig,
}

impl<'a> DifyClient<'a> {
    pub fn new(state: &'a AppState, config: &'a DifyConfig) -> Self {
        Self {
            http: &state.http_client,
            config,
            upstream: &state.upstream,
        }
    }

    /// Resolve an API path against the configured base URL.
    pub fn endpoint(&self, path: &str) -> ApiResult<Url> {
        let base = self.config.api_url.trim_end_matches('/');
        let target = format!("{base}{path}");
        Url::parse(&target).map_err(|e| {
            error!("Invalid Dify URL {}: {}", target, e);
            ApiError::internal("Failed to create request to Dify")
        })
    }

    /// Resolve an API path and attach `query` as its query string.
    pub fn endpoint_with_query(&self, path: &str, query: &[(String, String)]) -> ApiResult<Url> {
        let mut url = self.endpoint(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    pub fn workflow_payload<'p>(&'p self, inputs: &'p Map<String, Value>) -> WorkflowRunPayload<'p> {
        WorkflowRunPayload {
            inputs,
            response_mode: &self.upstream.response_mode,
            user: &self.upstream.user,
        }
    }

    pub fn chat_payload<'p>(&'p self, query: &'p str, conversation_id: &'p str) -> ChatMessagePayload<'p> {
        ChatMessagePayload {
            inputs: Map::new(),
            query,
            response_mode: &self.upstream.response_mode,
            conversation_id,
            user: &self.upstream.user,
            files: Vec::new(),
        }
    }

    /// The user identifier forced onto every upstream call.
    pub fn user(&self) -> &str {
        &self.upstream.user
    }

    /// Start a workflow run with `inputs`.
    pub async fn run_workflow(&self, inputs: &Map<String, Value>) -> ApiResult<Response> {
        let url = self.endpoint(WORKFLOW_RUN_PATH)?;
        let payload = self.workflow_payload(inputs);
        debug!(url = %url, inputs = ?inputs, "Making request to Dify API");

        let request = self.http.post(url.clone()).json(&payload);
        self.send(request, &url).await.map_err(ApiError::Upstream)
    }

    /// Send a chat message in streaming mode.
    pub async fn send_chat_message(&self, query: &str, conversation_id: &str) -> ApiResult<Response> {
        let url = self.endpoint(CHAT_MESSAGES_PATH)?;
        let payload = self.chat_payload(query, conversation_id);
        debug!(url = %url, conversation_id, "Sending chat message to Dify API");

        let request = self.http.post(url.clone()).json(&payload);
        self.send(request, &url).await.map_err(ApiError::Upstream)
    }

    /// Fetch a JSON listing.
    pub async fn get_json(&self, url: Url) -> ApiResult<Response> {
        debug!(url = %url, "Fetching listing from Dify API");
        let request = self
            .http
            .get(url.clone())
            .header(header::ACCEPT, "application/json");
        self.send(request, &url).await.map_err(ApiError::BadGateway)
    }

    /// Send `request` with the API key, waiting at most the idle timeout for
    /// response headers.
    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<Response, String> {
        let idle_timeout = self.upstream.idle_timeout();
        let request = request.bearer_auth(&self.config.api_key).send();

        match tokio::time::timeout(idle_timeout, request).await {
            Ok(Ok(response)) => {
                debug!(status = %response.status(), url = %url, "Received response from Dify API");
                Ok(response)
            }
            Ok(Err(e)) => {
                error!("Failed to make request to Dify API at {}: {}", url, e);
                Err(e.to_string())
            }
            Err(_) => {
                error!("Dify API at {} sent no response within {:?}", url, idle_timeout);
                Err(format!("no response within {}s", idle_timeout.as_secs()))
            }
        }
    }
}
