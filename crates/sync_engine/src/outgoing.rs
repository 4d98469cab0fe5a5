use chrono::{DateTime, Utc};
use shared::{
    domain::{ConversationId, MessageId, SenderType},
    protocol::{MessagePayload, SendMessageRequest},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    engine::SyncEngine,
    error::SendValidationError,
    intent::{Intent, ScrollBehavior},
    resolver::{Applied, Reconciled},
    types::{DeliveryStatus, Message, OutgoingContent},
};

const LOCAL_ID_PREFIX: &str = "local-";

/// Handle for one in-flight send, carried across the network await.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub conversation_id: ConversationId,
    pub local_id: MessageId,
    pub request: SendMessageRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendStarted {
    pub pending: PendingSend,
    pub intents: Vec<Intent>,
}

pub fn new_local_id() -> MessageId {
    MessageId(format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()))
}

pub fn is_local_id(message_id: &MessageId) -> bool {
    message_id.as_str().starts_with(LOCAL_ID_PREFIX)
}

fn send_request(content: &OutgoingContent) -> SendMessageRequest {
    SendMessageRequest {
        message_content: content.text.trim().to_string(),
        sender_type: SenderType::User,
        media_url: content
            .media_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string),
    }
}

impl SyncEngine {
    /// Validate and optimistically insert a local message. The caller issues
    /// the request and reports back with [`SyncEngine::confirm_send`] or
    /// [`SyncEngine::fail_send`].
    pub fn begin_send(
        &mut self,
        conversation_id: Option<&ConversationId>,
        content: OutgoingContent,
        now: DateTime<Utc>,
    ) -> Result<SendStarted, SendValidationError> {
        let conversation_id = conversation_id
            .filter(|id| !id.is_blank())
            .ok_or(SendValidationError::MissingConversation)?
            .clone();
        if content.is_empty() {
            return Err(SendValidationError::EmptyContent);
        }

        let request = send_request(&content);
        let message = Message {
            id: new_local_id(),
            conversation_id: conversation_id.clone(),
            content: request.message_content.clone(),
            media_url: request.media_url.clone(),
            sender_type: SenderType::User,
            created_at: now,
            status: DeliveryStatus::Pending,
        };
        info!(
            conversation_id = %conversation_id,
            local_id = %message.id,
            "sync: optimistic send started"
        );

        let mut intents = Vec::new();
        self.outbox.insert(message.id.clone(), message.clone());
        if let Some(Applied::Inserted { index }) =
            self.cache.append(&conversation_id, message.clone())
        {
            if self.index.is_active(&conversation_id) {
                intents.push(Intent::AppendMessage {
                    conversation_id: conversation_id.clone(),
                    index,
                    message: message.clone(),
                    scroll: ScrollBehavior::ScrollToBottom,
                });
            }
        }
        let preview = message.preview(self.settings.notification_preview_chars);
        self.push_touch(&mut intents, &conversation_id, now, Some(preview));

        Ok(SendStarted {
            pending: PendingSend {
                conversation_id,
                local_id: message.id,
                request,
            },
            intents,
        })
    }

    /// Put a failed message back into `Pending` in place and hand out a new
    /// ticket for the same content.
    pub fn begin_retry(
        &mut self,
        conversation_id: &ConversationId,
        local_id: &MessageId,
    ) -> Option<SendStarted> {
        let message = self.outbox.get_mut(local_id)?;
        if message.status != DeliveryStatus::Failed || &message.conversation_id != conversation_id
        {
            return None;
        }
        message.status = DeliveryStatus::Pending;
        let request = SendMessageRequest {
            message_content: message.content.clone(),
            sender_type: SenderType::User,
            media_url: message.media_url.clone(),
        };
        info!(
            conversation_id = %conversation_id,
            local_id = %local_id,
            "sync: retrying failed send"
        );

        let mut intents = Vec::new();
        if let Some(index) =
            self.cache
                .set_status(conversation_id, local_id, DeliveryStatus::Pending)
        {
            if self.index.is_active(conversation_id) {
                intents.push(Intent::MessageStatusChanged {
                    conversation_id: conversation_id.clone(),
                    message_id: local_id.clone(),
                    index,
                    status: DeliveryStatus::Pending,
                });
            }
        }

        Some(SendStarted {
            pending: PendingSend {
                conversation_id: conversation_id.clone(),
                local_id: local_id.clone(),
                request,
            },
            intents,
        })
    }

    /// Swap the optimistic message for the server's copy.
    pub fn confirm_send(&mut self, pending: &PendingSend, payload: MessagePayload) -> Vec<Intent> {
        let conversation_id = &pending.conversation_id;
        self.outbox.remove(&pending.local_id);
        let confirmed = Message::from_payload(conversation_id.clone(), payload);
        self.index.remember(conversation_id, &confirmed.id);
        info!(
            conversation_id = %conversation_id,
            local_id = %pending.local_id,
            message_id = %confirmed.id,
            "sync: send confirmed"
        );

        let displayed = self.index.is_active(conversation_id);
        let mut intents = Vec::new();
        match self
            .cache
            .reconcile(conversation_id, &pending.local_id, confirmed.clone())
        {
            Some(Reconciled::Replaced { from, to }) if displayed => {
                intents.push(Intent::ReplaceMessage {
                    conversation_id: conversation_id.clone(),
                    previous_id: pending.local_id.clone(),
                    from,
                    to,
                    message: confirmed.clone(),
                });
            }
            Some(Reconciled::AlreadyPresent {
                removed: Some(index),
            }) if displayed => {
                intents.push(Intent::RemoveMessage {
                    conversation_id: conversation_id.clone(),
                    message_id: pending.local_id.clone(),
                    index,
                });
            }
            Some(Reconciled::Inserted { index }) if displayed => {
                intents.push(Intent::AppendMessage {
                    conversation_id: conversation_id.clone(),
                    index,
                    message: confirmed.clone(),
                    scroll: ScrollBehavior::ScrollToBottom,
                });
            }
            _ => {}
        }
        self.buffer_while_loading(conversation_id, &confirmed);

        let preview = confirmed.preview(self.settings.notification_preview_chars);
        self.push_touch(
            &mut intents,
            conversation_id,
            confirmed.created_at,
            Some(preview),
        );
        intents
    }

    /// Leave the optimistic message visible as `Failed` and raise a transient
    /// error. Nothing is retried here.
    pub fn fail_send(&mut self, pending: &PendingSend, reason: impl Into<String>) -> Vec<Intent> {
        let reason = reason.into();
        let conversation_id = &pending.conversation_id;
        let Some(message) = self.outbox.get_mut(&pending.local_id) else {
            // An echo already confirmed delivery while the request was failing.
            warn!(
                conversation_id = %conversation_id,
                local_id = %pending.local_id,
                "sync: send error after delivery was confirmed: {reason}"
            );
            return Vec::new();
        };
        message.status = DeliveryStatus::Failed;
        warn!(
            conversation_id = %conversation_id,
            local_id = %pending.local_id,
            "sync: send failed: {reason}"
        );

        let mut intents = Vec::new();
        if let Some(index) =
            self.cache
                .set_status(conversation_id, &pending.local_id, DeliveryStatus::Failed)
        {
            if self.index.is_active(conversation_id) {
                intents.push(Intent::MessageStatusChanged {
                    conversation_id: conversation_id.clone(),
                    message_id: pending.local_id.clone(),
                    index,
                    status: DeliveryStatus::Failed,
                });
            }
        }
        intents.push(Intent::SendFailed {
            conversation_id: conversation_id.clone(),
            message_id: pending.local_id.clone(),
            reason,
        });
        intents
    }

    /// Local messages still waiting for (or having failed) confirmation.
    pub fn unconfirmed_messages(&self, conversation_id: &ConversationId) -> Vec<Message> {
        let mut messages = self
            .outbox
            .values()
            .filter(|m| &m.conversation_id == conversation_id)
            .cloned()
            .collect::<Vec<_>>();
        messages.sort_by_key(|m| m.created_at);
        messages
    }
}

#[cfg(test)]
#[path = "tests/outgoing_tests.rs"]
mod tests;
