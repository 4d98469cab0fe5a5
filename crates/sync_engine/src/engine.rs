use std::collections::HashMap;

use chrono::{DateTime, Utc};
use shared::domain::{ConversationId, MessageId};
use tracing::{debug, info, warn};

use crate::{
    cache::MessageCache,
    config::EngineSettings,
    index::ConversationIndex,
    intent::{Intent, ScrollBehavior},
    resolver,
    types::{ConversationSummary, Message, ViewportState},
};

/// Outcome of activating a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub intents: Vec<Intent>,
    /// The history is not cached and must be fetched.
    pub needs_fetch: bool,
}

/// Pure state-transition core: message cache, conversation index, outbox of
/// unconfirmed sends and the host's viewport state.
///
/// Every method is synchronous and returns the intents the host should act
/// on, so one call is one atomic transition.
pub struct SyncEngine {
    pub(crate) settings: EngineSettings,
    pub(crate) cache: MessageCache,
    pub(crate) index: ConversationIndex,
    pub(crate) viewport: ViewportState,
    /// Pending and failed local messages, keyed by temporary id.
    pub(crate) outbox: HashMap<MessageId, Message>,
    /// Messages that arrived while the conversation's history was loading.
    pub(crate) loading: HashMap<ConversationId, Vec<Message>>,
}

impl SyncEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            cache: MessageCache::new(settings.cache_capacity),
            index: ConversationIndex::new(settings.dedup_window),
            viewport: ViewportState::default(),
            outbox: HashMap::new(),
            loading: HashMap::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn active_conversation(&self) -> Option<&ConversationId> {
        self.index.active()
    }

    /// Selected and the host window has focus.
    pub fn is_active(&self, conversation_id: &ConversationId) -> bool {
        self.index.is_active(conversation_id) && self.viewport.focused
    }

    pub fn viewport(&self) -> ViewportState {
        self.viewport
    }

    pub fn unread(&self, conversation_id: &ConversationId) -> u32 {
        self.index.unread(conversation_id)
    }

    pub fn total_unread(&self) -> u32 {
        self.index.total_unread()
    }

    pub fn conversations(&self) -> Vec<ConversationSummary> {
        self.index.summaries()
    }

    pub fn conversation_order(&self) -> Vec<ConversationId> {
        self.index.ordered_ids()
    }

    pub fn cached_messages(&self, conversation_id: &ConversationId) -> Option<&[Message]> {
        self.cache.peek(conversation_id)
    }

    pub fn cached_conversation_count(&self) -> usize {
        self.cache.len()
    }

    pub fn is_loading(&self, conversation_id: &ConversationId) -> bool {
        self.loading.contains_key(conversation_id)
    }

    /// Load the initial conversation list in server order.
    pub fn seed_conversations(&mut self, conversations: Vec<ConversationSummary>) {
        for summary in conversations {
            self.index.seed(
                summary.conversation_id,
                summary.last_activity,
                summary.unread,
                summary.preview,
            );
        }
    }

    pub fn select_conversation(&mut self, conversation_id: &ConversationId) -> Selection {
        let previous = self.index.select_conversation(conversation_id);
        self.cache.pin(conversation_id.clone());
        if previous.as_ref() != Some(conversation_id) {
            let evicted = self.cache.evict_overflow();
            self.log_evictions(evicted);
        }
        info!(
            conversation_id = %conversation_id,
            previous = previous.as_ref().map(|id| id.as_str()).unwrap_or("-"),
            "sync: conversation selected"
        );

        let mut intents = vec![self.unread_intent(conversation_id)];
        let stale = self.cache.is_stale(conversation_id);
        match self.cache.get(conversation_id) {
            Some(messages) => {
                intents.push(Intent::RenderTimeline {
                    conversation_id: conversation_id.clone(),
                    messages: messages.to_vec(),
                    stale,
                });
                Selection {
                    intents,
                    needs_fetch: false,
                }
            }
            None => {
                let fetch_in_flight = self.loading.contains_key(conversation_id);
                self.loading.entry(conversation_id.clone()).or_default();
                intents.push(Intent::ShowLoading {
                    conversation_id: conversation_id.clone(),
                });
                Selection {
                    intents,
                    needs_fetch: !fetch_in_flight,
                }
            }
        }
    }

    pub fn clear_selection(&mut self) -> Option<ConversationId> {
        let previous = self.index.clear_selection();
        let evicted = self.cache.unpin();
        self.log_evictions(evicted);
        if let Some(previous) = &previous {
            debug!(conversation_id = %previous, "sync: selection cleared");
        }
        previous
    }

    /// Mark a history fetch as in flight so pushed messages are buffered.
    pub fn begin_history_load(&mut self, conversation_id: &ConversationId) {
        self.loading.entry(conversation_id.clone()).or_default();
    }

    pub fn set_viewport(&mut self, viewport: ViewportState) -> Vec<Intent> {
        let regained_focus = viewport.focused && !self.viewport.focused;
        self.viewport = viewport;
        let mut intents = Vec::new();
        if regained_focus {
            if let Some(active) = self.index.active().cloned() {
                if self.index.reset_unread(&active) {
                    intents.push(self.unread_intent(&active));
                }
            }
        }
        intents
    }

    /// Install an authoritative history. Unconfirmed local messages and
    /// messages pushed during the fetch are merged back in.
    pub fn apply_history(
        &mut self,
        conversation_id: &ConversationId,
        messages: Vec<Message>,
    ) -> Vec<Intent> {
        let buffered = self.loading.remove(conversation_id).unwrap_or_default();
        let mut merged = resolver::normalize(messages);
        let local = self
            .outbox
            .values()
            .filter(|m| &m.conversation_id == conversation_id)
            .cloned()
            .collect::<Vec<_>>();
        for message in buffered.into_iter().chain(local) {
            resolver::apply(&mut merged, message);
        }
        for message in &merged {
            self.index.remember(conversation_id, &message.id);
        }
        info!(
            conversation_id = %conversation_id,
            message_count = merged.len(),
            "sync: history loaded"
        );

        let latest = merged
            .iter()
            .rev()
            .find(|m| !m.is_pending())
            .map(|m| (m.created_at, m.preview(self.settings.notification_preview_chars)));
        let evicted = self.cache.set(conversation_id.clone(), merged);
        self.log_evictions(evicted);

        let mut intents = Vec::new();
        if let Some((created_at, preview)) = latest {
            self.push_touch(&mut intents, conversation_id, created_at, Some(preview));
        }
        if self.index.is_active(conversation_id) {
            if let Some(messages) = self.cache.get(conversation_id) {
                intents.push(Intent::RenderTimeline {
                    conversation_id: conversation_id.clone(),
                    messages: messages.to_vec(),
                    stale: false,
                });
            }
        }
        intents
    }

    pub fn history_failed(
        &mut self,
        conversation_id: &ConversationId,
        reason: impl Into<String>,
    ) -> Vec<Intent> {
        let reason = reason.into();
        warn!(conversation_id = %conversation_id, "sync: history fetch failed: {reason}");
        let buffered = self.loading.remove(conversation_id).unwrap_or_default();
        let had_cache = self.cache.mark_stale(conversation_id);
        if had_cache {
            for message in buffered {
                self.cache.append(conversation_id, message);
            }
        }

        if !self.index.is_active(conversation_id) {
            return Vec::new();
        }
        if had_cache {
            vec![Intent::ShowStaleIndicator {
                conversation_id: conversation_id.clone(),
                reason,
            }]
        } else {
            vec![Intent::ShowHistoryUnavailable {
                conversation_id: conversation_id.clone(),
                reason,
                retryable: true,
            }]
        }
    }

    /// Keep a confirmed message that arrived during a history fetch so the
    /// fetched snapshot cannot drop it, whether or not the conversation was
    /// already cached.
    pub(crate) fn buffer_while_loading(
        &mut self,
        conversation_id: &ConversationId,
        message: &Message,
    ) {
        if let Some(buffer) = self.loading.get_mut(conversation_id) {
            buffer.push(message.clone());
        }
    }

    pub(crate) fn scroll_for_incoming(&self) -> ScrollBehavior {
        if self.viewport.distance_from_bottom_px <= self.settings.scroll_bottom_threshold_px {
            ScrollBehavior::ScrollToBottom
        } else {
            ScrollBehavior::PreservePosition
        }
    }

    pub(crate) fn unread_intent(&self, conversation_id: &ConversationId) -> Intent {
        Intent::UnreadChanged {
            conversation_id: conversation_id.clone(),
            unread: self.index.unread(conversation_id),
            total_unread: self.index.total_unread(),
        }
    }

    pub(crate) fn push_touch(
        &mut self,
        intents: &mut Vec<Intent>,
        conversation_id: &ConversationId,
        timestamp: DateTime<Utc>,
        preview: Option<String>,
    ) {
        if self
            .index
            .touch(conversation_id, timestamp, preview.clone())
        {
            intents.push(Intent::ConversationTouched {
                conversation_id: conversation_id.clone(),
                last_activity: timestamp,
                preview,
            });
        }
    }

    pub(crate) fn log_evictions(&self, evicted: Vec<ConversationId>) {
        if !evicted.is_empty() {
            debug!(
                evicted = evicted.len(),
                cached = self.cache.len(),
                capacity = self.cache.capacity(),
                "sync: cache over capacity, evicted least recently touched"
            );
        }
    }
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;
