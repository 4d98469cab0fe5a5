use serde::Serialize;
use shared::error::ErrorCode;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendValidationError {
    #[error("no conversation selected")]
    MissingConversation,
    #[error("message has neither text nor media")]
    EmptyContent,
}

#[derive(Debug, Error)]
pub enum PushEventError {
    #[error("invalid push event: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("push event missing conversation_id")]
    MissingConversationId,
    #[error("push event for conversation {conversation_id} carries no message")]
    MissingMessage { conversation_id: String },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid api base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("server rejected request ({status}): {message}")]
    Rejected {
        status: u16,
        code: Option<ErrorCode>,
        message: String,
    },
}
