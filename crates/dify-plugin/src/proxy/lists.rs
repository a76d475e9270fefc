//! Conversation and message-history listing proxies.

use axum::{
    body::Body,
    extract::{Query, State},
    http::Response,
};

use crate::AppState;
use crate::error::ApiResult;
use crate::settings::DifyConfig;

use super::relay::{RELAY_CHUNK_SIZE, relay_response};
use super::upstream::{CONVERSATIONS_PATH, DifyClient, MESSAGES_PATH};

/// Query parameters forwarded to `/v1/conversations`.
pub const CONVERSATION_PARAMS: &[&str] = &["user", "last_id", "limit", "sort_by"];

/// Query parameters forwarded to `/v1/messages`.
pub const MESSAGE_PARAMS: &[&str] = &["user", "first_id", "limit", "conversation_id"];

/// Build the upstream query from the caller's parameters.
///
/// Only names in `allowed` survive, in that order, with the first value of
/// each; empty values are dropped and `user` is always set to `user`.
pub fn forwarded_query(
    query: &[(String, String)],
    allowed: &[&str],
    user: &str,
) -> Vec<(String, String)> {
    allowed
        .iter()
        .filter_map(|&name| {
            let value = if name == "user" {
                user
            } else {
                query
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| value.as_str())?
            };
            (!value.is_empty()).then(|| (name.to_string(), value.to_string()))
        })
        .collect()
}

async fn proxy_listing(
    state: &AppState,
    config: &DifyConfig,
    path: &str,
    allowed: &[&str],
    query: &[(String, String)],
) -> ApiResult<Response<Body>> {
    let client = DifyClient::new(state, config);
    let url = client.endpoint_with_query(path, &forwarded_query(query, allowed, client.user()))?;
    let upstream = client.get_json(url).await?;

    relay_response(upstream, RELAY_CHUNK_SIZE, state.upstream.idle_timeout())
}

/// List the conversations of the plugin's upstream user.
pub async fn dify_get_conversations(
    State(state): State<AppState>,
    config: DifyConfig,
    Query(query): Query<Vec<(String, String)>>,
) -> ApiResult<Response<Body>> {
    proxy_listing(&state, &config, CONVERSATIONS_PATH, CONVERSATION_PARAMS, &query).await
}

/// List the messages of one conversation.
pub async fn dify_message_history_proxy(
    State(state): State<AppState>,
    config: DifyConfig,
    Query(query): Query<Vec<(String, String)>>,
) -> ApiResult<Response<Body>> {
    proxy_listing(&state, &config, MESSAGES_PATH, MESSAGE_PARAMS, &query).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn user_is_always_forced() {
        let forwarded = forwarded_query(&pairs(&[("user", "mallory")]), CONVERSATION_PARAMS, "grafana-user");
        assert_eq!(forwarded, pairs(&[("user", "grafana-user")]));

        let forwarded = forwarded_query(&[], MESSAGE_PARAMS, "grafana-user");
        assert_eq!(forwarded, pairs(&[("user", "grafana-user")]));
    }

    #[test]
    fn only_allowed_params_are_forwarded() {
        let query = pairs(&[
            ("limit", "20"),
            ("debug", "1"),
            ("last_id", "abc"),
            ("first_id", "xyz"),
            ("sort_by", "-updated_at"),
        ]);
        let forwarded = forwarded_query(&query, CONVERSATION_PARAMS, "grafana-user");
        assert_eq!(
            forwarded,
            pairs(&[
                ("user", "grafana-user"),
                ("last_id", "abc"),
                ("limit", "20"),
                ("sort_by", "-updated_at"),
            ])
        );
    }

    #[test]
    fn message_params_include_conversation() {
        let query = pairs(&[("conversation_id", "c-1"), ("first_id", "m-9"), ("last_id", "x")]);
        let forwarded = forwarded_query(&query, MESSAGE_PARAMS, "grafana-user");
        assert_eq!(
            forwarded,
            pairs(&[
                ("user", "grafana-user"),
                ("first_id", "m-9"),
                ("conversation_id", "c-1"),
            ])
        );
    }

    #[test]
    fn empty_values_are_dropped_and_first_value_wins() {
        let query = pairs(&[("limit", ""), ("limit", "5"), ("last_id", "a"), ("last_id", "b")]);
        let forwarded = forwarded_query(&query, CONVERSATION_PARAMS, "grafana-user");
        assert_eq!(forwarded, pairs(&[("user", "grafana-user"), ("last_id", "a")]));
    }
}
