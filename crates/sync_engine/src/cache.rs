use std::collections::HashMap;

use shared::domain::{ConversationId, MessageId};
use tracing::debug;

use crate::{
    resolver::{self, Applied, Reconciled},
    types::{DeliveryStatus, Message},
};

struct CacheEntry {
    messages: Vec<Message>,
    last_touched: u64,
    stale: bool,
}

/// Bounded per-conversation timeline cache with least-recently-touched
/// eviction. The pinned conversation is never evicted.
pub struct MessageCache {
    capacity: usize,
    entries: HashMap<ConversationId, CacheEntry>,
    clock: u64,
    pinned: Option<ConversationId>,
}

impl MessageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            clock: 0,
            pinned: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, conversation_id: &ConversationId) -> bool {
        self.entries.contains_key(conversation_id)
    }

    pub fn get(&mut self, conversation_id: &ConversationId) -> Option<&[Message]> {
        let tick = self.tick();
        let entry = self.entries.get_mut(conversation_id)?;
        entry.last_touched = tick;
        Some(&entry.messages)
    }

    /// Read without refreshing recency.
    pub fn peek(&self, conversation_id: &ConversationId) -> Option<&[Message]> {
        self.entries
            .get(conversation_id)
            .map(|entry| entry.messages.as_slice())
    }

    pub fn set(
        &mut self,
        conversation_id: ConversationId,
        messages: Vec<Message>,
    ) -> Vec<ConversationId> {
        let last_touched = self.tick();
        self.entries.insert(
            conversation_id,
            CacheEntry {
                messages: resolver::normalize(messages),
                last_touched,
                stale: false,
            },
        );
        self.evict_overflow()
    }

    /// Resolver-driven insert. `None` when the conversation is not cached; a
    /// later full reload picks the message up.
    pub fn append(&mut self, conversation_id: &ConversationId, message: Message) -> Option<Applied> {
        let entry = self.touch_entry(conversation_id)?;
        let applied = resolver::apply(&mut entry.messages, message);
        self.evict_overflow();
        Some(applied)
    }

    /// Let a confirmed echo take over a matching pending message. Returns the
    /// replaced local id with the old and new index.
    pub fn adopt_echo(
        &mut self,
        conversation_id: &ConversationId,
        echo: &Message,
    ) -> Option<(MessageId, usize, usize)> {
        let entry = self.touch_entry(conversation_id)?;
        if entry.messages.iter().any(|m| m.id == echo.id) {
            return None;
        }
        let from = resolver::find_echo_target(&entry.messages, echo)?;
        let local_id = entry.messages[from].id.clone();
        let to = resolver::replace_at(&mut entry.messages, from, echo.clone());
        Some((local_id, from, to))
    }

    pub fn reconcile(
        &mut self,
        conversation_id: &ConversationId,
        local_id: &MessageId,
        confirmed: Message,
    ) -> Option<Reconciled> {
        let entry = self.touch_entry(conversation_id)?;
        Some(resolver::reconcile(&mut entry.messages, local_id, confirmed))
    }

    pub fn set_status(
        &mut self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        status: DeliveryStatus,
    ) -> Option<usize> {
        let entry = self.touch_entry(conversation_id)?;
        resolver::set_status(&mut entry.messages, message_id, status)
    }

    pub fn mark_stale(&mut self, conversation_id: &ConversationId) -> bool {
        match self.entries.get_mut(conversation_id) {
            Some(entry) => {
                entry.stale = true;
                true
            }
            None => false,
        }
    }

    pub fn is_stale(&self, conversation_id: &ConversationId) -> bool {
        self.entries
            .get(conversation_id)
            .is_some_and(|entry| entry.stale)
    }

    pub fn pin(&mut self, conversation_id: ConversationId) {
        self.pinned = Some(conversation_id);
    }

    pub fn unpin(&mut self) -> Vec<ConversationId> {
        self.pinned = None;
        self.evict_overflow()
    }

    pub fn evict_overflow(&mut self) -> Vec<ConversationId> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            let victim = self
                .entries
                .iter()
                .filter(|(id, _)| self.pinned.as_ref() != Some(*id))
                .min_by_key(|(_, entry)| entry.last_touched)
                .map(|(id, _)| id.clone());
            let Some(victim) = victim else {
                break;
            };
            self.entries.remove(&victim);
            debug!(conversation_id = %victim, "cache: evicted conversation history");
            evicted.push(victim);
        }
        evicted
    }

    fn touch_entry(&mut self, conversation_id: &ConversationId) -> Option<&mut CacheEntry> {
        let tick = self.tick();
        let entry = self.entries.get_mut(conversation_id)?;
        entry.last_touched = tick;
        Some(entry)
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
