//! Pure dedup and ordering rules for a single conversation timeline.
//!
//! Every function here takes the timeline by reference and performs no I/O,
//! so the rules can be exercised without an engine around them.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use shared::domain::MessageId;

use crate::types::{DeliveryStatus, Message};

/// Where a candidate message belongs in an existing timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Duplicate,
    Replace(usize),
    Insert(usize),
}

/// Result of applying a candidate to a timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Duplicate,
    Inserted { index: usize },
    Replaced { from: usize, to: usize },
}

/// Result of swapping an optimistic message for its server copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Replaced { from: usize, to: usize },
    /// The server copy was already in the timeline; the optimistic entry (if
    /// still present) was dropped.
    AlreadyPresent { removed: Option<usize> },
    Inserted { index: usize },
}

pub fn resolve(existing: &[Message], candidate: &Message) -> Placement {
    if let Some(index) = existing.iter().position(|m| m.id == candidate.id) {
        let current = &existing[index];
        if current.status == DeliveryStatus::Pending
            && candidate.status == DeliveryStatus::Confirmed
        {
            return Placement::Replace(index);
        }
        return Placement::Duplicate;
    }
    Placement::Insert(insertion_index(existing, candidate.created_at))
}

/// Index after every message with a timestamp `<= created_at`, so equal
/// timestamps keep arrival order.
pub fn insertion_index(existing: &[Message], created_at: DateTime<Utc>) -> usize {
    existing.partition_point(|m| m.created_at <= created_at)
}

pub fn apply(messages: &mut Vec<Message>, candidate: Message) -> Applied {
    match resolve(messages, &candidate) {
        Placement::Duplicate => Applied::Duplicate,
        Placement::Insert(index) => {
            messages.insert(index, candidate);
            Applied::Inserted { index }
        }
        Placement::Replace(from) => {
            let to = replace_at(messages, from, candidate);
            Applied::Replaced { from, to }
        }
    }
}

/// Replace the message at `index`, moving it only if its new timestamp would
/// break ordering. Returns the final index.
pub fn replace_at(messages: &mut Vec<Message>, index: usize, replacement: Message) -> usize {
    let fits_before = index == 0 || messages[index - 1].created_at <= replacement.created_at;
    let fits_after =
        index + 1 >= messages.len() || replacement.created_at <= messages[index + 1].created_at;
    if fits_before && fits_after {
        messages[index] = replacement;
        return index;
    }

    messages.remove(index);
    let to = insertion_index(messages, replacement.created_at);
    messages.insert(to, replacement);
    to
}

pub fn reconcile(
    messages: &mut Vec<Message>,
    local_id: &MessageId,
    confirmed: Message,
) -> Reconciled {
    let local_index = messages.iter().position(|m| &m.id == local_id);

    if messages.iter().any(|m| m.id == confirmed.id) {
        if let Some(index) = local_index {
            messages.remove(index);
        }
        return Reconciled::AlreadyPresent {
            removed: local_index,
        };
    }

    match local_index {
        Some(from) => {
            let to = replace_at(messages, from, confirmed);
            Reconciled::Replaced { from, to }
        }
        None => {
            let index = insertion_index(messages, confirmed.created_at);
            messages.insert(index, confirmed);
            Reconciled::Inserted { index }
        }
    }
}

/// The local message a user-originated echo should take over: the oldest
/// pending or failed one with the same body. A failed send whose request
/// timed out may still have been stored by the server.
pub fn find_echo_target(messages: &[Message], echo: &Message) -> Option<usize> {
    if !echo.is_from_local_user() {
        return None;
    }
    messages
        .iter()
        .position(|m| m.is_unconfirmed() && m.is_from_local_user() && m.same_body_as(echo))
}

pub fn set_status(
    messages: &mut [Message],
    local_id: &MessageId,
    status: DeliveryStatus,
) -> Option<usize> {
    let index = messages.iter().position(|m| &m.id == local_id)?;
    messages[index].status = status;
    Some(index)
}

/// Stable sort by timestamp and drop repeated ids (first occurrence wins).
pub fn normalize(messages: Vec<Message>) -> Vec<Message> {
    let mut seen = HashSet::with_capacity(messages.len());
    let mut normalized = messages
        .into_iter()
        .filter(|m| seen.insert(m.id.clone()))
        .collect::<Vec<_>>();
    normalized.sort_by_key(|m| m.created_at);
    normalized
}

#[cfg(test)]
#[path = "tests/resolver_tests.rs"]
mod tests;
