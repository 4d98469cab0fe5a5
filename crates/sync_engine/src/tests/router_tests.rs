use super::*;
use chrono::{DateTime, Duration, Utc};
use shared::domain::SenderType;

use crate::{
    config::EngineSettings,
    intent::ScrollBehavior,
    types::{DeliveryStatus, OutgoingContent, ViewportState},
};

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).expect("timestamp")
}

fn conv(value: &str) -> ConversationId {
    ConversationId::from(value)
}

fn payload(id: &str, created_at: DateTime<Utc>, sender_type: SenderType) -> MessagePayload {
    MessagePayload {
        id: MessageId::from(id),
        content: Some(format!("text {id}")),
        media_url: None,
        sender_type,
        created_at,
    }
}

fn contact_event(conversation: &str, id: &str, created_at: DateTime<Utc>) -> PushEvent {
    PushEvent::new(conv(conversation), payload(id, created_at, SenderType::Contact))
}

fn history(conversation: &ConversationId, stamps: &[(&str, DateTime<Utc>)]) -> Vec<Message> {
    stamps
        .iter()
        .map(|(id, created_at)| {
            Message::from_payload(
                conversation.clone(),
                payload(id, *created_at, SenderType::Contact),
            )
        })
        .collect()
}

fn active_engine(conversation: &ConversationId, messages: Vec<Message>) -> SyncEngine {
    let mut engine = SyncEngine::new(EngineSettings::default());
    engine.apply_history(conversation, messages);
    engine.select_conversation(conversation);
    engine
}

fn timeline_ids(engine: &SyncEngine, conversation: &ConversationId) -> Vec<String> {
    engine
        .cached_messages(conversation)
        .expect("cached")
        .iter()
        .map(|m| m.id.as_str().to_string())
        .collect()
}

fn count_appends(intents: &[Intent]) -> usize {
    intents
        .iter()
        .filter(|intent| matches!(intent, Intent::AppendMessage { .. }))
        .count()
}

#[test]
fn out_of_order_event_lands_between_cached_messages_with_one_append() {
    let c1 = conv("C1");
    let t1 = at(100);
    let t2 = at(200);
    let t3 = at(300);
    let mut engine = active_engine(&c1, history(&c1, &[("m1", t1), ("m2", t2), ("m3", t3)]));

    let t2_5 = t2 + Duration::milliseconds(50_000);
    let intents = engine.handle_push_event(contact_event("C1", "m2.5", t2_5));

    assert_eq!(timeline_ids(&engine, &c1), vec!["m1", "m2", "m2.5", "m3"]);
    assert_eq!(count_appends(&intents), 1);
    assert!(matches!(
        &intents[0],
        Intent::AppendMessage { index: 2, scroll: ScrollBehavior::ScrollToBottom, .. }
    ));
    assert!(!intents
        .iter()
        .any(|intent| matches!(intent, Intent::PlayNotificationSound)));
}

#[test]
fn event_for_background_conversation_bumps_unread_and_order_only() {
    let c1 = conv("C1");
    let c2 = conv("C2");
    let mut engine = SyncEngine::new(EngineSettings::default());
    engine.handle_push_event(contact_event("C2", "seed", at(50)));
    engine.apply_history(&c1, history(&c1, &[("m1", at(100))]));
    engine.select_conversation(&c1);
    assert_eq!(engine.conversation_order(), vec![c1.clone(), c2.clone()]);
    let unread_before = engine.unread(&c2);

    let intents = engine.handle_push_event(contact_event("C2", "n1", at(500)));

    assert_eq!(engine.unread(&c2), unread_before + 1);
    assert_eq!(engine.conversation_order(), vec![c2.clone(), c1.clone()]);
    assert!(!intents.iter().any(Intent::is_timeline_render));
    assert!(intents
        .iter()
        .filter_map(Intent::conversation_id)
        .all(|id| *id == c2));
    assert!(intents.contains(&Intent::PlayNotificationSound));
    assert!(intents.iter().any(|intent| matches!(
        intent,
        Intent::ShowNotification { conversation_id, .. } if *conversation_id == c2
    )));
    assert_eq!(timeline_ids(&engine, &c1), vec!["m1"]);
}

#[test]
fn replayed_event_is_a_complete_noop() {
    let c1 = conv("C1");
    let mut engine = active_engine(&c1, history(&c1, &[("m1", at(100))]));
    let event = contact_event("C1", "m2", at(200));

    let first = engine.handle_push_event(event.clone());
    let after_first = timeline_ids(&engine, &c1);
    let second = engine.handle_push_event(event);

    assert_eq!(count_appends(&first), 1);
    assert!(second.is_empty());
    assert_eq!(timeline_ids(&engine, &c1), after_first);
}

#[test]
fn replayed_event_for_uncached_conversation_counts_once() {
    let mut engine = SyncEngine::new(EngineSettings::default());
    let event = contact_event("C9", "m1", at(10));
    engine.handle_push_event(event.clone());
    engine.handle_push_event(event.clone());
    engine.handle_push_event(event);
    assert_eq!(engine.unread(&conv("C9")), 1);
}

#[test]
fn message_from_loaded_history_is_not_replayed() {
    let c1 = conv("C1");
    let mut engine = active_engine(&c1, history(&c1, &[("m1", at(100))]));
    engine.handle_push_event(contact_event("C2", "x", at(900)));
    let order_before = engine.conversation_order();

    let intents = engine.handle_push_event(contact_event("C1", "m1", at(100)));
    assert!(intents.is_empty());
    assert_eq!(engine.conversation_order(), order_before);
}

#[test]
fn malformed_events_are_dropped() {
    let mut engine = SyncEngine::new(EngineSettings::default());
    assert!(engine.handle_push_json("not json").is_empty());
    assert!(engine
        .handle_push_json(r#"{"message":{"id":"m1","content":"x","sender_type":"contact","created_at":"2024-01-01T00:00:00Z"}}"#)
        .is_empty());
    assert!(engine
        .handle_push_json(r#"{"conversation_id":"  ","message":null}"#)
        .is_empty());
    assert!(engine.handle_push_json(r#"{"conversation_id":"c1"}"#).is_empty());
    assert!(engine.conversations().is_empty());
}

#[test]
fn decodes_wire_event() {
    let raw = r#"{
        "conversation_id": "c1",
        "message": {
            "id": "m1",
            "content": "hello",
            "media_url": "https://cdn.example/a.png",
            "sender_type": "contact",
            "created_at": "2024-01-01T00:00:00Z"
        }
    }"#;
    let (conversation_id, payload) = decode_push_event(raw).expect("decode");
    assert_eq!(conversation_id, conv("c1"));
    assert_eq!(payload.media_url.as_deref(), Some("https://cdn.example/a.png"));

    let err = decode_push_event(r#"{"message":null}"#).expect_err("must fail");
    assert!(matches!(err, PushEventError::MissingConversationId));
}

#[test]
fn own_messages_never_notify() {
    let mut engine = SyncEngine::new(EngineSettings::default());
    let event = PushEvent::new(conv("C2"), payload("m1", at(10), SenderType::User));
    let intents = engine.handle_push_event(event);

    assert_eq!(engine.unread(&conv("C2")), 0);
    assert!(!intents.iter().any(|intent| matches!(
        intent,
        Intent::PlayNotificationSound | Intent::ShowNotification { .. }
    )));
    assert!(intents
        .iter()
        .any(|intent| matches!(intent, Intent::ConversationTouched { .. })));
}

#[test]
fn system_messages_notify() {
    let mut engine = SyncEngine::new(EngineSettings::default());
    let event = PushEvent::new(conv("C2"), payload("m1", at(10), SenderType::System));
    let intents = engine.handle_push_event(event);
    assert!(intents.contains(&Intent::PlayNotificationSound));
}

#[test]
fn reader_scrolled_up_keeps_position() {
    let c1 = conv("C1");
    let mut engine = active_engine(&c1, Vec::new());
    engine.set_viewport(ViewportState {
        focused: true,
        distance_from_bottom_px: 800.0,
    });
    let intents = engine.handle_push_event(contact_event("C1", "m1", at(10)));
    assert!(matches!(
        &intents[0],
        Intent::AppendMessage { scroll: ScrollBehavior::PreservePosition, .. }
    ));

    engine.set_viewport(ViewportState {
        focused: true,
        distance_from_bottom_px: 40.0,
    });
    let intents = engine.handle_push_event(contact_event("C1", "m2", at(20)));
    assert!(matches!(
        &intents[0],
        Intent::AppendMessage { scroll: ScrollBehavior::ScrollToBottom, .. }
    ));
}

#[test]
fn notification_body_is_truncated() {
    let mut engine = SyncEngine::new(EngineSettings {
        notification_preview_chars: 5,
        ..EngineSettings::default()
    });
    let mut message = payload("m1", at(10), SenderType::Contact);
    message.content = Some("hello there, world".to_string());
    let intents = engine.handle_push_event(PushEvent::new(conv("C2"), message));
    let body = intents.iter().find_map(|intent| match intent {
        Intent::ShowNotification { body, .. } => Some(body.clone()),
        _ => None,
    });
    assert_eq!(body.as_deref(), Some("hello..."));
}

#[test]
fn echo_of_own_send_replaces_optimistic_message() {
    let c1 = conv("C1");
    let mut engine = active_engine(&c1, history(&c1, &[("m1", at(100))]));
    let started = engine
        .begin_send(Some(&c1), OutgoingContent::text("hello"), at(200))
        .expect("valid send");

    let mut echo = payload("srv-1", at(201), SenderType::User);
    echo.content = Some("hello".to_string());
    let intents = engine.handle_push_event(PushEvent::new(c1.clone(), echo));

    assert!(matches!(
        &intents[0],
        Intent::ReplaceMessage { previous_id, .. } if *previous_id == started.pending.local_id
    ));
    assert_eq!(timeline_ids(&engine, &c1), vec!["m1", "srv-1"]);
    let timeline = engine.cached_messages(&c1).expect("cached");
    assert_eq!(timeline[1].status, DeliveryStatus::Confirmed);
    assert!(engine.unconfirmed_messages(&c1).is_empty());
}
