use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ConversationId, MessageId, SenderType};

/// A message as the application server serializes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: MessageId,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    pub sender_type: SenderType,
    pub created_at: DateTime<Utc>,
}

/// Event delivered over the push channel.
///
/// Both fields are optional on the wire so that a malformed event still
/// decodes and can be rejected with a precise reason instead of a parse error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    #[serde(default)]
    pub message: Option<MessagePayload>,
}

impl PushEvent {
    pub fn new(conversation_id: ConversationId, message: MessagePayload) -> Self {
        Self {
            conversation_id: Some(conversation_id),
            message: Some(message),
        }
    }
}

/// Body of `POST /conversations/{id}/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub message_content: String,
    pub sender_type: SenderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub message: MessagePayload,
}

/// Response of `GET /conversations/{id}/messages`.
///
/// Older server builds return a bare array, newer ones wrap it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageListResponse {
    Wrapped { messages: Vec<MessagePayload> },
    Bare(Vec<MessagePayload>),
}

impl MessageListResponse {
    pub fn into_messages(self) -> Vec<MessagePayload> {
        match self {
            Self::Wrapped { messages } | Self::Bare(messages) => messages,
        }
    }
}
