//! Proxies from resource endpoints to the Dify API.
//!
//! Each handler receives the resolved [`DifyConfig`](crate::settings::DifyConfig),
//! shapes the inbound request into a single upstream call and relays the
//! response back.

pub mod body;
mod chat;
mod lists;
pub mod relay;
pub mod upstream;
mod workflow;

pub use chat::{ChatRequest, dify_chat_proxy};
pub use lists::{
    CONVERSATION_PARAMS, MESSAGE_PARAMS, dify_get_conversations, dify_message_history_proxy,
    forwarded_query,
};
pub use workflow::dify_workflow_proxy;
