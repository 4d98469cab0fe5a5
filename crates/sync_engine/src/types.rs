use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{
    domain::{ConversationId, MessageId, SenderType},
    protocol::MessagePayload,
};

const MEDIA_PREVIEW: &str = "[attachment]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Confirmed,
    Failed,
}

/// A message as held in a cached timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    pub sender_type: SenderType,
    pub created_at: DateTime<Utc>,
    pub status: DeliveryStatus,
}

impl Message {
    /// Messages coming from the server are authoritative and therefore confirmed.
    pub fn from_payload(conversation_id: ConversationId, payload: MessagePayload) -> Self {
        Self {
            id: payload.id,
            conversation_id,
            content: payload.content.unwrap_or_default(),
            media_url: payload.media_url.filter(|url| !url.trim().is_empty()),
            sender_type: payload.sender_type,
            created_at: payload.created_at,
            status: DeliveryStatus::Confirmed,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == DeliveryStatus::Pending
    }

    /// Local message the server has not acknowledged (pending or failed).
    pub fn is_unconfirmed(&self) -> bool {
        self.status != DeliveryStatus::Confirmed
    }

    pub fn is_from_local_user(&self) -> bool {
        self.sender_type == SenderType::User
    }

    /// Same body as another message, ignoring surrounding whitespace.
    pub fn same_body_as(&self, other: &Message) -> bool {
        self.content.trim() == other.content.trim() && self.media_url == other.media_url
    }

    /// Single-line summary truncated to `max_chars` characters.
    pub fn preview(&self, max_chars: usize) -> String {
        let text = self.content.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            return if self.media_url.is_some() {
                MEDIA_PREVIEW.to_string()
            } else {
                String::new()
            };
        }
        truncate_chars(&text, max_chars)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}

/// What the operator typed into the composer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingContent {
    pub text: String,
    pub media_url: Option<String>,
}

impl OutgoingContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            media_url: None,
        }
    }

    pub fn with_media(mut self, media_url: impl Into<String>) -> Self {
        self.media_url = Some(media_url.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
            && self
                .media_url
                .as_deref()
                .map_or(true, |url| url.trim().is_empty())
    }
}

/// Host-supplied view state. The engine never reads the DOM or window itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    pub focused: bool,
    pub distance_from_bottom_px: f32,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            focused: true,
            distance_from_bottom_px: 0.0,
        }
    }
}

/// Sidebar row for one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationSummary {
    pub conversation_id: ConversationId,
    pub last_activity: Option<DateTime<Utc>>,
    pub unread: u32,
    pub preview: Option<String>,
    pub is_active: bool,
}
