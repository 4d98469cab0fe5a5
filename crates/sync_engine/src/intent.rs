//! Side effects the engine asks its host to perform.
//!
//! The engine only produces these values; rendering, sounds and OS
//! notifications live in whatever consumes them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::domain::{ConversationId, MessageId};

use crate::{
    error::SendValidationError,
    types::{DeliveryStatus, Message},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollBehavior {
    PreservePosition,
    ScrollToBottom,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    /// Insert one message into the displayed timeline without re-rendering it.
    AppendMessage {
        conversation_id: ConversationId,
        index: usize,
        message: Message,
        scroll: ScrollBehavior,
    },
    /// Swap a rendered message (usually an optimistic one) for a new version.
    ReplaceMessage {
        conversation_id: ConversationId,
        previous_id: MessageId,
        from: usize,
        to: usize,
        message: Message,
    },
    RemoveMessage {
        conversation_id: ConversationId,
        message_id: MessageId,
        index: usize,
    },
    MessageStatusChanged {
        conversation_id: ConversationId,
        message_id: MessageId,
        index: usize,
        status: DeliveryStatus,
    },
    RenderTimeline {
        conversation_id: ConversationId,
        messages: Vec<Message>,
        stale: bool,
    },
    ShowLoading {
        conversation_id: ConversationId,
    },
    ShowStaleIndicator {
        conversation_id: ConversationId,
        reason: String,
    },
    /// Empty/error state with a retry action.
    ShowHistoryUnavailable {
        conversation_id: ConversationId,
        reason: String,
        retryable: bool,
    },
    UnreadChanged {
        conversation_id: ConversationId,
        unread: u32,
        total_unread: u32,
    },
    ConversationTouched {
        conversation_id: ConversationId,
        last_activity: DateTime<Utc>,
        preview: Option<String>,
    },
    PlayNotificationSound,
    /// Clicking the notification must select `conversation_id`.
    ShowNotification {
        conversation_id: ConversationId,
        title: String,
        body: String,
    },
    /// Transient, dismissible error for a failed send.
    SendFailed {
        conversation_id: ConversationId,
        message_id: MessageId,
        reason: String,
    },
    ValidationRejected {
        reason: SendValidationError,
    },
}

impl Intent {
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        match self {
            Self::AppendMessage {
                conversation_id, ..
            }
            | Self::ReplaceMessage {
                conversation_id, ..
            }
            | Self::RemoveMessage {
                conversation_id, ..
            }
            | Self::MessageStatusChanged {
                conversation_id, ..
            }
            | Self::RenderTimeline {
                conversation_id, ..
            }
            | Self::ShowLoading { conversation_id }
            | Self::ShowStaleIndicator {
                conversation_id, ..
            }
            | Self::ShowHistoryUnavailable {
                conversation_id, ..
            }
            | Self::UnreadChanged {
                conversation_id, ..
            }
            | Self::ConversationTouched {
                conversation_id, ..
            }
            | Self::ShowNotification {
                conversation_id, ..
            }
            | Self::SendFailed {
                conversation_id, ..
            } => Some(conversation_id),
            Self::PlayNotificationSound | Self::ValidationRejected { .. } => None,
        }
    }

    /// Whether this intent touches the rendered timeline (as opposed to the
    /// sidebar, badges or notifications).
    pub fn is_timeline_render(&self) -> bool {
        matches!(
            self,
            Self::AppendMessage { .. }
                | Self::ReplaceMessage { .. }
                | Self::RemoveMessage { .. }
                | Self::MessageStatusChanged { .. }
                | Self::RenderTimeline { .. }
        )
    }
}
