use super::*;
use chrono::DateTime;
use shared::{
    domain::SenderType,
    protocol::{MessagePayload, PushEvent},
};

use crate::types::DeliveryStatus;

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).expect("timestamp")
}

fn conv(value: &str) -> ConversationId {
    ConversationId::from(value)
}

fn message(conversation: &ConversationId, id: &str, secs: i64) -> Message {
    Message {
        id: MessageId::from(id),
        conversation_id: conversation.clone(),
        content: format!("text {id}"),
        media_url: None,
        sender_type: SenderType::Contact,
        created_at: at(secs),
        status: DeliveryStatus::Confirmed,
    }
}

fn push(conversation: &str, id: &str, secs: i64) -> PushEvent {
    PushEvent::new(
        conv(conversation),
        MessagePayload {
            id: MessageId::from(id),
            content: Some(format!("text {id}")),
            media_url: None,
            sender_type: SenderType::Contact,
            created_at: at(secs),
        },
    )
}

fn engine_with_capacity(capacity: usize) -> SyncEngine {
    SyncEngine::new(EngineSettings {
        cache_capacity: capacity,
        ..EngineSettings::default()
    })
}

#[test]
fn selecting_uncached_conversation_requests_fetch_once() {
    let mut engine = SyncEngine::new(EngineSettings::default());
    let c1 = conv("c1");

    let selection = engine.select_conversation(&c1);
    assert!(selection.needs_fetch);
    assert!(selection
        .intents
        .contains(&Intent::ShowLoading { conversation_id: c1.clone() }));
    assert!(engine.is_loading(&c1));

    let again = engine.select_conversation(&c1);
    assert!(!again.needs_fetch);
}

#[test]
fn selecting_cached_conversation_renders_from_cache() {
    let mut engine = SyncEngine::new(EngineSettings::default());
    let c1 = conv("c1");
    engine.apply_history(&c1, vec![message(&c1, "m1", 1)]);

    let selection = engine.select_conversation(&c1);
    assert!(!selection.needs_fetch);
    let rendered = selection.intents.iter().find_map(|intent| match intent {
        Intent::RenderTimeline { messages, stale, .. } => Some((messages.len(), *stale)),
        _ => None,
    });
    assert_eq!(rendered, Some((1, false)));
}

#[test]
fn history_load_renders_active_conversation_and_touches_index() {
    let mut engine = SyncEngine::new(EngineSettings::default());
    let c1 = conv("c1");
    engine.select_conversation(&c1);

    let intents = engine.apply_history(&c1, vec![message(&c1, "m2", 2), message(&c1, "m1", 1)]);
    assert!(intents.iter().any(|intent| matches!(
        intent,
        Intent::RenderTimeline { messages, stale: false, .. } if messages.len() == 2
    )));
    assert!(intents.iter().any(|intent| matches!(
        intent,
        Intent::ConversationTouched { last_activity, .. } if *last_activity == at(2)
    )));
    assert!(!engine.is_loading(&c1));
}

#[test]
fn messages_pushed_during_load_are_merged_into_history() {
    let mut engine = SyncEngine::new(EngineSettings::default());
    let c1 = conv("c1");
    engine.select_conversation(&c1);

    engine.handle_push_event(push("c1", "m3", 3));
    engine.apply_history(&c1, vec![message(&c1, "m1", 1), message(&c1, "m2", 2)]);

    let ids = engine
        .cached_messages(&c1)
        .expect("cached")
        .iter()
        .map(|m| m.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["m1", "m2", "m3"]);
}

#[test]
fn fetch_failure_without_cache_shows_retryable_empty_state() {
    let mut engine = SyncEngine::new(EngineSettings::default());
    let c1 = conv("c1");
    engine.select_conversation(&c1);

    let intents = engine.history_failed(&c1, "connection refused");
    assert_eq!(
        intents,
        vec![Intent::ShowHistoryUnavailable {
            conversation_id: c1.clone(),
            reason: "connection refused".to_string(),
            retryable: true,
        }]
    );
    assert!(!engine.is_loading(&c1));
}

#[test]
fn fetch_failure_with_cache_marks_it_stale() {
    let mut engine = SyncEngine::new(EngineSettings::default());
    let c1 = conv("c1");
    engine.apply_history(&c1, vec![message(&c1, "m1", 1)]);
    engine.select_conversation(&c1);
    engine.begin_history_load(&c1);

    let intents = engine.history_failed(&c1, "timeout");
    assert!(matches!(
        intents.as_slice(),
        [Intent::ShowStaleIndicator { reason, .. }] if reason == "timeout"
    ));

    engine.clear_selection();
    let reselected = engine.select_conversation(&c1);
    assert!(reselected.intents.iter().any(|intent| matches!(
        intent,
        Intent::RenderTimeline { stale: true, .. }
    )));
}

#[test]
fn fetch_failure_for_background_conversation_is_silent() {
    let mut engine = SyncEngine::new(EngineSettings::default());
    let c1 = conv("c1");
    engine.begin_history_load(&c1);
    assert!(engine.history_failed(&c1, "boom").is_empty());
}

#[test]
fn active_conversation_unread_stays_zero() {
    let mut engine = SyncEngine::new(EngineSettings::default());
    let c1 = conv("c1");
    engine.apply_history(&c1, Vec::new());
    engine.select_conversation(&c1);

    for n in 0..5 {
        engine.handle_push_event(push("c1", &format!("m{n}"), n));
        assert_eq!(engine.unread(&c1), 0);
    }
}

#[test]
fn unfocused_selected_conversation_counts_unread_until_focus_returns() {
    let mut engine = SyncEngine::new(EngineSettings::default());
    let c1 = conv("c1");
    engine.apply_history(&c1, Vec::new());
    engine.select_conversation(&c1);
    engine.set_viewport(ViewportState {
        focused: false,
        distance_from_bottom_px: 0.0,
    });
    assert!(!engine.is_active(&c1));

    engine.handle_push_event(push("c1", "m1", 1));
    assert_eq!(engine.unread(&c1), 1);

    let intents = engine.set_viewport(ViewportState::default());
    assert_eq!(
        intents,
        vec![Intent::UnreadChanged {
            conversation_id: c1.clone(),
            unread: 0,
            total_unread: 0,
        }]
    );
    assert_eq!(engine.unread(&c1), 0);
}

#[test]
fn selecting_resets_unread_atomically() {
    let mut engine = SyncEngine::new(EngineSettings::default());
    let c2 = conv("c2");
    engine.handle_push_event(push("c2", "m1", 1));
    engine.handle_push_event(push("c2", "m2", 2));
    assert_eq!(engine.unread(&c2), 2);

    let selection = engine.select_conversation(&c2);
    assert_eq!(engine.unread(&c2), 0);
    assert_eq!(
        selection.intents.first(),
        Some(&Intent::UnreadChanged {
            conversation_id: c2.clone(),
            unread: 0,
            total_unread: 0,
        })
    );
}

// A full cache admits the active conversation by dropping the
// least recently touched one.
#[test]
fn full_cache_evicts_least_recently_touched_non_active_conversation() {
    let mut engine = engine_with_capacity(50);
    for n in 1..=50 {
        let id = ConversationId(format!("C{n}"));
        engine.apply_history(&id, vec![message(&id, &format!("m{n}"), n)]);
    }
    let c1 = conv("C1");
    engine.select_conversation(&c1);
    assert_eq!(engine.cached_conversation_count(), 50);

    engine.handle_push_event(push("C51", "m51", 51));
    assert_eq!(engine.cached_conversation_count(), 50);

    let c51 = conv("C51");
    engine.select_conversation(&c51);
    engine.apply_history(&c51, vec![message(&c51, "m51", 51)]);

    assert_eq!(engine.cached_conversation_count(), 50);
    assert!(engine.cached_messages(&c51).is_some());
    assert!(engine.cached_messages(&conv("C2")).is_none());
    assert!(engine.cached_messages(&c1).is_some());
}

#[test]
fn active_conversation_is_never_evicted() {
    let mut engine = engine_with_capacity(3);
    let active = conv("active");
    engine.apply_history(&active, Vec::new());
    engine.select_conversation(&active);

    for n in 0..20 {
        let id = ConversationId(format!("bg{n}"));
        engine.apply_history(&id, vec![message(&id, "m", n)]);
        assert!(engine.cached_conversation_count() <= 3);
        assert!(engine.cached_messages(&active).is_some());
    }
}

#[test]
fn seeded_conversations_keep_server_order() {
    let mut engine = SyncEngine::new(EngineSettings::default());
    engine.seed_conversations(vec![
        ConversationSummary {
            conversation_id: conv("a"),
            last_activity: Some(at(20)),
            unread: 2,
            preview: Some("hi".to_string()),
            is_active: false,
        },
        ConversationSummary {
            conversation_id: conv("b"),
            last_activity: Some(at(10)),
            unread: 0,
            preview: None,
            is_active: false,
        },
    ]);
    assert_eq!(engine.conversation_order(), vec![conv("a"), conv("b")]);
    assert_eq!(engine.total_unread(), 2);

    engine.handle_push_event(push("b", "m1", 30));
    assert_eq!(engine.conversation_order(), vec![conv("b"), conv("a")]);
    assert_eq!(engine.conversations()[0].unread, 1);
}

#[test]
fn refresh_keeps_messages_pushed_while_in_flight() {
    let mut engine = SyncEngine::new(EngineSettings::default());
    let c1 = conv("c1");
    engine.apply_history(&c1, vec![message(&c1, "m1", 1)]);
    engine.select_conversation(&c1);

    engine.begin_history_load(&c1);
    engine.handle_push_event(push("c1", "m2", 2));
    engine.apply_history(&c1, vec![message(&c1, "m1", 1)]);

    let ids = engine
        .cached_messages(&c1)
        .expect("cached")
        .iter()
        .map(|m| m.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["m1", "m2"]);
    assert!(engine.handle_push_event(push("c1", "m2", 2)).is_empty());
    assert!(!engine.is_loading(&c1));
}
