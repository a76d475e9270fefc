use axum::{
    Router,
    routing::{any, get, post},
};

use crate::AppState;
use crate::handlers;
use crate::proxy;

/// Create the plugin's resource routes
pub fn resource_routes() -> Router<AppState> {
    Router::new()
        .route("/ping", any(handlers::ping))
        .route("/echo", post(handlers::echo))
        .route("/difyWorkflow", any(handlers::dify_workflow))
        // Upstream proxies
        .route("/difyWorkflowProxy", any(proxy::dify_workflow_proxy))
        .route("/difyChatProxy", any(proxy::dify_chat_proxy))
        .route("/difyGetConversations", get(proxy::dify_get_conversations))
        .route(
            "/difyMessageHistoryProxy",
            get(proxy::dify_message_history_proxy),
        )
}
