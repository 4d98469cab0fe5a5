use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use shared::domain::{ConversationId, MessageId};

use crate::types::ConversationSummary;

#[derive(Debug, Default)]
struct ConversationEntry {
    last_activity: Option<DateTime<Utc>>,
    unread: u32,
    preview: Option<String>,
    prev: Option<ConversationId>,
    next: Option<ConversationId>,
    recent_ids: VecDeque<MessageId>,
    recent_set: HashSet<MessageId>,
}

/// Conversation ordering (most recently active first), unread counters and
/// the active selection.
///
/// Ordering is an id-keyed doubly linked list so that moving a conversation
/// to the front never resorts the whole list.
#[derive(Debug)]
pub struct ConversationIndex {
    conversations: HashMap<ConversationId, ConversationEntry>,
    head: Option<ConversationId>,
    tail: Option<ConversationId>,
    active: Option<ConversationId>,
    dedup_window: usize,
}

impl ConversationIndex {
    pub fn new(dedup_window: usize) -> Self {
        Self {
            conversations: HashMap::new(),
            head: None,
            tail: None,
            active: None,
            dedup_window: dedup_window.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn contains(&self, conversation_id: &ConversationId) -> bool {
        self.conversations.contains_key(conversation_id)
    }

    /// Register a known conversation at the back of the list, keeping any
    /// existing state. Used to load the initial sidebar in server order.
    pub fn seed(
        &mut self,
        conversation_id: ConversationId,
        last_activity: Option<DateTime<Utc>>,
        unread: u32,
        preview: Option<String>,
    ) {
        if self.conversations.contains_key(&conversation_id) {
            return;
        }
        let is_active = self.active.as_ref() == Some(&conversation_id);
        self.conversations.insert(
            conversation_id.clone(),
            ConversationEntry {
                last_activity,
                unread: if is_active { 0 } else { unread },
                preview,
                ..ConversationEntry::default()
            },
        );
        self.link_back(&conversation_id);
    }

    /// Record activity and move the conversation to the front. Timestamps not
    /// newer than the stored one are ignored so replays never regress order.
    pub fn touch(
        &mut self,
        conversation_id: &ConversationId,
        timestamp: DateTime<Utc>,
        preview: Option<String>,
    ) -> bool {
        self.ensure(conversation_id);
        let Some(entry) = self.conversations.get_mut(conversation_id) else {
            return false;
        };
        if entry
            .last_activity
            .is_some_and(|current| current >= timestamp)
        {
            return false;
        }
        entry.last_activity = Some(timestamp);
        if preview.is_some() {
            entry.preview = preview;
        }
        self.move_to_front(conversation_id);
        true
    }

    /// Activate a conversation and clear its unread counter in one step.
    /// Returns the previously active conversation.
    pub fn select_conversation(&mut self, conversation_id: &ConversationId) -> Option<ConversationId> {
        self.ensure(conversation_id);
        if let Some(entry) = self.conversations.get_mut(conversation_id) {
            entry.unread = 0;
        }
        self.active.replace(conversation_id.clone())
    }

    pub fn clear_selection(&mut self) -> Option<ConversationId> {
        self.active.take()
    }

    pub fn active(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    pub fn is_active(&self, conversation_id: &ConversationId) -> bool {
        self.active.as_ref() == Some(conversation_id)
    }

    pub fn increment_unread(&mut self, conversation_id: &ConversationId) -> u32 {
        self.ensure(conversation_id);
        match self.conversations.get_mut(conversation_id) {
            Some(entry) => {
                entry.unread = entry.unread.saturating_add(1);
                entry.unread
            }
            None => 0,
        }
    }

    /// Returns whether the counter was non-zero.
    pub fn reset_unread(&mut self, conversation_id: &ConversationId) -> bool {
        match self.conversations.get_mut(conversation_id) {
            Some(entry) if entry.unread > 0 => {
                entry.unread = 0;
                true
            }
            _ => false,
        }
    }

    pub fn unread(&self, conversation_id: &ConversationId) -> u32 {
        self.conversations
            .get(conversation_id)
            .map_or(0, |entry| entry.unread)
    }

    pub fn total_unread(&self) -> u32 {
        self.conversations
            .values()
            .fold(0u32, |total, entry| total.saturating_add(entry.unread))
    }

    pub fn has_seen(&self, conversation_id: &ConversationId, message_id: &MessageId) -> bool {
        self.conversations
            .get(conversation_id)
            .is_some_and(|entry| entry.recent_set.contains(message_id))
    }

    /// Add a message id to the bounded window of recently seen ids.
    pub fn remember(&mut self, conversation_id: &ConversationId, message_id: &MessageId) {
        self.ensure(conversation_id);
        let window = self.dedup_window;
        let Some(entry) = self.conversations.get_mut(conversation_id) else {
            return;
        };
        if !entry.recent_set.insert(message_id.clone()) {
            return;
        }
        entry.recent_ids.push_back(message_id.clone());
        while entry.recent_ids.len() > window {
            if let Some(expired) = entry.recent_ids.pop_front() {
                entry.recent_set.remove(&expired);
            }
        }
    }

    pub fn ordered_ids(&self) -> Vec<ConversationId> {
        let mut ids = Vec::with_capacity(self.conversations.len());
        let mut cursor = self.head.clone();
        while let Some(id) = cursor {
            cursor = self
                .conversations
                .get(&id)
                .and_then(|entry| entry.next.clone());
            ids.push(id);
        }
        ids
    }

    pub fn summary(&self, conversation_id: &ConversationId) -> Option<ConversationSummary> {
        let entry = self.conversations.get(conversation_id)?;
        Some(ConversationSummary {
            conversation_id: conversation_id.clone(),
            last_activity: entry.last_activity,
            unread: entry.unread,
            preview: entry.preview.clone(),
            is_active: self.is_active(conversation_id),
        })
    }

    pub fn summaries(&self) -> Vec<ConversationSummary> {
        self.ordered_ids()
            .iter()
            .filter_map(|id| self.summary(id))
            .collect()
    }

    fn ensure(&mut self, conversation_id: &ConversationId) {
        if self.conversations.contains_key(conversation_id) {
            return;
        }
        self.conversations
            .insert(conversation_id.clone(), ConversationEntry::default());
        self.link_front(conversation_id);
    }

    fn move_to_front(&mut self, conversation_id: &ConversationId) {
        if self.head.as_ref() == Some(conversation_id) {
            return;
        }
        self.unlink(conversation_id);
        self.link_front(conversation_id);
    }

    fn unlink(&mut self, conversation_id: &ConversationId) {
        let Some(entry) = self.conversations.get_mut(conversation_id) else {
            return;
        };
        let prev = entry.prev.take();
        let next = entry.next.take();

        match &prev {
            Some(prev_id) => {
                if let Some(prev_entry) = self.conversations.get_mut(prev_id) {
                    prev_entry.next = next.clone();
                }
            }
            None => self.head = next.clone(),
        }
        match &next {
            Some(next_id) => {
                if let Some(next_entry) = self.conversations.get_mut(next_id) {
                    next_entry.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn link_front(&mut self, conversation_id: &ConversationId) {
        let old_head = self.head.replace(conversation_id.clone());
        if let Some(old_head_id) = &old_head {
            if let Some(old_head_entry) = self.conversations.get_mut(old_head_id) {
                old_head_entry.prev = Some(conversation_id.clone());
            }
        } else {
            self.tail = Some(conversation_id.clone());
        }
        if let Some(entry) = self.conversations.get_mut(conversation_id) {
            entry.prev = None;
            entry.next = old_head;
        }
    }

    fn link_back(&mut self, conversation_id: &ConversationId) {
        let old_tail = self.tail.replace(conversation_id.clone());
        if let Some(old_tail_id) = &old_tail {
            if let Some(old_tail_entry) = self.conversations.get_mut(old_tail_id) {
                old_tail_entry.next = Some(conversation_id.clone());
            }
        } else {
            self.head = Some(conversation_id.clone());
        }
        if let Some(entry) = self.conversations.get_mut(conversation_id) {
            entry.prev = old_tail;
            entry.next = None;
        }
    }
}

#[cfg(test)]
#[path = "tests/index_tests.rs"]
mod tests;
