//! Simple resource endpoints that never call the upstream.

use axum::{Json, body::Bytes};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::settings::DifyConfig;

/// `{"message": ...}` request and response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub message: String,
}

/// Resolved connection details, as reported by `/difyWorkflow`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInfo {
    pub api_key: String,
    pub api_url: String,
}

/// Liveness probe for the frontend.
pub async fn ping() -> Json<MessageBody> {
    Json(MessageBody {
        message: "ok".to_string(),
    })
}

/// Return the posted message unchanged.
///
/// The body is decoded regardless of `Content-Type`.
pub async fn echo(body: Bytes) -> ApiResult<Json<MessageBody>> {
    let message: MessageBody =
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(Json(message))
}

/// Report the configured Dify URL and key.
pub async fn dify_workflow(config: DifyConfig) -> Json<WorkflowInfo> {
    Json(WorkflowInfo {
        api_key: config.api_key,
        api_url: config.api_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_keeps_message() {
        let Json(reply) = echo(Bytes::from_static(br#"{"message":"ok"}"#)).await.unwrap();
        assert_eq!(reply.message, "ok");
    }

    #[tokio::test]
    async fn echo_drops_unknown_fields_and_defaults_message() {
        let Json(reply) = echo(Bytes::from_static(br#"{"other":1}"#)).await.unwrap();
        assert_eq!(reply.message, "");
    }

    #[tokio::test]
    async fn echo_rejects_bad_json() {
        for body in [&b""[..], b"{", br#"{"message":5}"#] {
            let err = echo(Bytes::copy_from_slice(body)).await.unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(_)));
        }
    }

    #[test]
    fn workflow_info_uses_camel_case_keys() {
        let info = WorkflowInfo {
            api_key: "K".to_string(),
            api_url: "https://api.dify.ai".to_string(),
        };
        assert_eq!(
            serde_json::to_value(info).unwrap(),
            serde_json::json!({"apiKey": "K", "apiUrl": "https://api.dify.ai"})
        );
    }
}
