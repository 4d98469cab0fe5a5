use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::{ConversationId, MessageId},
    protocol::{MessagePayload, PushEvent, SendMessageRequest},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod intent;
pub mod outgoing;
pub mod resolver;
pub mod router;
pub mod transport;
pub mod types;

pub use config::EngineSettings;
pub use engine::{Selection, SyncEngine};
pub use error::{PushEventError, SendValidationError, TransportError};
pub use intent::{Intent, ScrollBehavior};
pub use outgoing::{PendingSend, SendStarted};
pub use transport::HttpMessageApi;
pub use types::{
    ConversationSummary, DeliveryStatus, Message, OutgoingContent, ViewportState,
};

const INTENT_CHANNEL_CAPACITY: usize = 1024;

/// Request/response side of the application server.
#[async_trait]
pub trait MessageApi: Send + Sync {
    async fn send_message(
        &self,
        conversation_id: &ConversationId,
        request: &SendMessageRequest,
    ) -> Result<MessagePayload>;
    async fn fetch_messages(&self, conversation_id: &ConversationId) -> Result<Vec<MessagePayload>>;
}

pub struct MissingMessageApi;

#[async_trait]
impl MessageApi for MissingMessageApi {
    async fn send_message(
        &self,
        conversation_id: &ConversationId,
        _request: &SendMessageRequest,
    ) -> Result<MessagePayload> {
        Err(anyhow!(
            "message api unavailable for conversation {conversation_id}"
        ))
    }

    async fn fetch_messages(&self, conversation_id: &ConversationId) -> Result<Vec<MessagePayload>> {
        Err(anyhow!(
            "message api unavailable for conversation {conversation_id}"
        ))
    }
}

/// How a send ended. Transport failures are state, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Confirmed { local_id: MessageId, message_id: MessageId },
    Failed { local_id: MessageId, reason: String },
}

/// Async shell around [`SyncEngine`]: owns the engine, performs the network
/// calls it cannot, and fans intents out to subscribers (render adapters,
/// notification bridges).
///
/// The engine lock is never held across an `.await`, so push events keep
/// flowing while a send or fetch is in flight.
pub struct ConversationSyncClient {
    api: Arc<dyn MessageApi>,
    inner: Mutex<SyncEngine>,
    intents: broadcast::Sender<Intent>,
}

impl ConversationSyncClient {
    pub fn new(settings: EngineSettings) -> Arc<Self> {
        Self::new_with_api(settings, Arc::new(MissingMessageApi))
    }

    pub fn new_with_api(settings: EngineSettings, api: Arc<dyn MessageApi>) -> Arc<Self> {
        let (intents, _) = broadcast::channel(INTENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            api,
            inner: Mutex::new(SyncEngine::new(settings)),
            intents,
        })
    }

    pub fn subscribe_intents(&self) -> broadcast::Receiver<Intent> {
        self.intents.subscribe()
    }

    fn dispatch(&self, intents: Vec<Intent>) {
        for intent in intents {
            let _ = self.intents.send(intent);
        }
    }

    pub async fn handle_push_json(&self, raw: &str) {
        let intents = self.inner.lock().await.handle_push_json(raw);
        self.dispatch(intents);
    }

    pub async fn handle_push_event(&self, event: PushEvent) {
        let intents = self.inner.lock().await.handle_push_event(event);
        self.dispatch(intents);
    }

    pub async fn set_viewport(&self, viewport: ViewportState) {
        let intents = self.inner.lock().await.set_viewport(viewport);
        self.dispatch(intents);
    }

    pub async fn seed_conversations(&self, conversations: Vec<ConversationSummary>) {
        self.inner.lock().await.seed_conversations(conversations);
    }

    /// Activate a conversation, loading its history when it is not cached.
    /// Also the target of a notification click.
    pub async fn select_conversation(&self, conversation_id: &ConversationId) {
        let selection = self.inner.lock().await.select_conversation(conversation_id);
        self.dispatch(selection.intents);
        if selection.needs_fetch {
            self.load_history(conversation_id).await;
        }
    }

    /// Reload a conversation's history even if it is cached.
    pub async fn refresh_conversation(&self, conversation_id: &ConversationId) {
        self.inner.lock().await.begin_history_load(conversation_id);
        self.load_history(conversation_id).await;
    }

    pub async fn clear_selection(&self) -> Option<ConversationId> {
        self.inner.lock().await.clear_selection()
    }

    async fn load_history(&self, conversation_id: &ConversationId) {
        let result = self.api.fetch_messages(conversation_id).await;
        let intents = {
            let mut engine = self.inner.lock().await;
            match result {
                Ok(payloads) => {
                    let messages = payloads
                        .into_iter()
                        .map(|payload| Message::from_payload(conversation_id.clone(), payload))
                        .collect();
                    engine.apply_history(conversation_id, messages)
                }
                Err(err) => engine.history_failed(conversation_id, format!("{err:#}")),
            }
        };
        self.dispatch(intents);
    }

    /// Send into the active conversation.
    pub async fn send_message(
        &self,
        content: OutgoingContent,
    ) -> std::result::Result<SendOutcome, SendValidationError> {
        let active = self.inner.lock().await.active_conversation().cloned();
        self.send_to(active.as_ref(), content).await
    }

    pub async fn send_to(
        &self,
        conversation_id: Option<&ConversationId>,
        content: OutgoingContent,
    ) -> std::result::Result<SendOutcome, SendValidationError> {
        let started = {
            let mut engine = self.inner.lock().await;
            engine.begin_send(conversation_id, content, Utc::now())
        };
        let started = match started {
            Ok(started) => started,
            Err(reason) => {
                info!("sync: send rejected locally: {reason}");
                self.dispatch(vec![Intent::ValidationRejected { reason }]);
                return Err(reason);
            }
        };
        self.dispatch(started.intents);
        Ok(self.deliver(started.pending).await)
    }

    /// Reissue a failed send in place. `None` if the message is not a failed
    /// local message of that conversation.
    pub async fn retry_send(
        &self,
        conversation_id: &ConversationId,
        local_id: &MessageId,
    ) -> Option<SendOutcome> {
        let started = self
            .inner
            .lock()
            .await
            .begin_retry(conversation_id, local_id)?;
        self.dispatch(started.intents);
        Some(self.deliver(started.pending).await)
    }

    async fn deliver(&self, pending: PendingSend) -> SendOutcome {
        let result = self
            .api
            .send_message(&pending.conversation_id, &pending.request)
            .await;
        let (intents, outcome) = {
            let mut engine = self.inner.lock().await;
            match result {
                Ok(payload) => {
                    let message_id = payload.id.clone();
                    let intents = engine.confirm_send(&pending, payload);
                    (
                        intents,
                        SendOutcome::Confirmed {
                            local_id: pending.local_id.clone(),
                            message_id,
                        },
                    )
                }
                Err(err) => {
                    let reason = format!("{err:#}");
                    warn!(
                        conversation_id = %pending.conversation_id,
                        "sync: send request failed: {reason}"
                    );
                    let intents = engine.fail_send(&pending, reason.clone());
                    (
                        intents,
                        SendOutcome::Failed {
                            local_id: pending.local_id.clone(),
                            reason,
                        },
                    )
                }
            }
        };
        self.dispatch(intents);
        outcome
    }

    pub async fn conversations(&self) -> Vec<ConversationSummary> {
        self.inner.lock().await.conversations()
    }

    pub async fn cached_messages(&self, conversation_id: &ConversationId) -> Option<Vec<Message>> {
        self.inner
            .lock()
            .await
            .cached_messages(conversation_id)
            .map(<[Message]>::to_vec)
    }

    pub async fn unread(&self, conversation_id: &ConversationId) -> u32 {
        self.inner.lock().await.unread(conversation_id)
    }

    pub async fn total_unread(&self) -> u32 {
        self.inner.lock().await.total_unread()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
