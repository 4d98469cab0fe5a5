use shared::{
    domain::{ConversationId, MessageId},
    protocol::{MessagePayload, PushEvent},
};
use tracing::{debug, trace, warn};

use crate::{
    engine::SyncEngine,
    error::PushEventError,
    intent::Intent,
    resolver::Applied,
    types::Message,
};

const NOTIFICATION_TITLE: &str = "New message";

/// Split a push event into its conversation and message, rejecting events
/// that cannot be attributed to a conversation.
pub fn validate_push_event(
    event: PushEvent,
) -> Result<(ConversationId, MessagePayload), PushEventError> {
    let conversation_id = event
        .conversation_id
        .filter(|id| !id.is_blank())
        .ok_or(PushEventError::MissingConversationId)?;
    let message = event
        .message
        .ok_or_else(|| PushEventError::MissingMessage {
            conversation_id: conversation_id.to_string(),
        })?;
    Ok((conversation_id, message))
}

pub fn decode_push_event(raw: &str) -> Result<(ConversationId, MessagePayload), PushEventError> {
    let event = serde_json::from_str::<PushEvent>(raw)?;
    validate_push_event(event)
}

impl SyncEngine {
    /// Decode and route one raw push payload. Malformed payloads are logged
    /// and dropped.
    pub fn handle_push_json(&mut self, raw: &str) -> Vec<Intent> {
        match decode_push_event(raw) {
            Ok((conversation_id, payload)) => self.route_message(conversation_id, payload),
            Err(err) => {
                warn!("sync: dropping push event: {err}");
                Vec::new()
            }
        }
    }

    pub fn handle_push_event(&mut self, event: PushEvent) -> Vec<Intent> {
        match validate_push_event(event) {
            Ok((conversation_id, payload)) => self.route_message(conversation_id, payload),
            Err(err) => {
                warn!("sync: dropping push event: {err}");
                Vec::new()
            }
        }
    }

    fn route_message(
        &mut self,
        conversation_id: ConversationId,
        payload: MessagePayload,
    ) -> Vec<Intent> {
        let message = Message::from_payload(conversation_id.clone(), payload);
        if self.index.has_seen(&conversation_id, &message.id) {
            debug!(
                conversation_id = %conversation_id,
                message_id = %message.id,
                "sync: duplicate push event ignored"
            );
            return Vec::new();
        }

        let displayed = self.index.is_active(&conversation_id);
        let is_active = displayed && self.viewport.focused;
        let preview = message.preview(self.settings.notification_preview_chars);
        let mut intents = Vec::new();

        if !self.place_incoming(&mut intents, &conversation_id, &message, displayed) {
            debug!(
                conversation_id = %conversation_id,
                message_id = %message.id,
                "sync: message already in timeline"
            );
            self.index.remember(&conversation_id, &message.id);
            return intents;
        }
        self.index.remember(&conversation_id, &message.id);
        self.buffer_while_loading(&conversation_id, &message);

        if !is_active && !message.is_from_local_user() {
            self.index.increment_unread(&conversation_id);
            intents.push(self.unread_intent(&conversation_id));
            intents.push(Intent::PlayNotificationSound);
            intents.push(Intent::ShowNotification {
                conversation_id: conversation_id.clone(),
                title: NOTIFICATION_TITLE.to_string(),
                body: preview.clone(),
            });
        }

        self.push_touch(
            &mut intents,
            &conversation_id,
            message.created_at,
            Some(preview),
        );
        trace!(
            conversation_id = %conversation_id,
            message_id = %message.id,
            is_active,
            intents = intents.len(),
            "sync: push event routed"
        );
        intents
    }

    /// Put an incoming message into the cache.
    /// Returns `false` when the timeline already held it.
    fn place_incoming(
        &mut self,
        intents: &mut Vec<Intent>,
        conversation_id: &ConversationId,
        message: &Message,
        displayed: bool,
    ) -> bool {
        if let Some((local_id, from, to)) = self.cache.adopt_echo(conversation_id, message) {
            self.outbox.remove(&local_id);
            debug!(
                conversation_id = %conversation_id,
                local_id = %local_id,
                message_id = %message.id,
                "sync: echo confirmed optimistic message"
            );
            if displayed {
                intents.push(Intent::ReplaceMessage {
                    conversation_id: conversation_id.clone(),
                    previous_id: local_id,
                    from,
                    to,
                    message: message.clone(),
                });
            }
            return true;
        }

        match self.cache.append(conversation_id, message.clone()) {
            Some(Applied::Duplicate) => false,
            Some(Applied::Inserted { index }) => {
                if displayed {
                    intents.push(Intent::AppendMessage {
                        conversation_id: conversation_id.clone(),
                        index,
                        message: message.clone(),
                        scroll: self.scroll_for_incoming(),
                    });
                }
                true
            }
            Some(Applied::Replaced { from, to }) => {
                if displayed {
                    intents.push(Intent::ReplaceMessage {
                        conversation_id: conversation_id.clone(),
                        previous_id: message.id.clone(),
                        from,
                        to,
                        message: message.clone(),
                    });
                }
                true
            }
            None => {
                if let Some(local_id) = self.outbox_echo_target(conversation_id, message) {
                    self.outbox.remove(&local_id);
                }
                true
            }
        }
    }

    /// Same matching rule as the cache uses, for sends whose conversation is
    /// not cached yet.
    fn outbox_echo_target(
        &self,
        conversation_id: &ConversationId,
        echo: &Message,
    ) -> Option<MessageId> {
        if !echo.is_from_local_user() {
            return None;
        }
        self.outbox
            .values()
            .filter(|m| &m.conversation_id == conversation_id)
            .filter(|m| m.is_unconfirmed() && m.same_body_as(echo))
            .min_by_key(|m| m.created_at)
            .map(|m| m.id.clone())
    }
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;
