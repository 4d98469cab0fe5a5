use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use shared::{
    domain::ConversationId,
    error::ApiError,
    protocol::{MessageListResponse, MessagePayload, SendMessageRequest, SendMessageResponse},
};
use tracing::debug;
use url::Url;

use crate::{error::TransportError, MessageApi};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// [`MessageApi`] over the application server's REST endpoints.
pub struct HttpMessageApi {
    http: Client,
    base_url: Url,
}

impl HttpMessageApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url).map_err(|err| TransportError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: err.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "url cannot carry a path".to_string(),
            }
            .into());
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self { http, base_url })
    }

    /// `{base}/conversations/{id}/messages` with the id percent-encoded.
    pub fn messages_url(&self, conversation_id: &ConversationId) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("conversations")
                .push(conversation_id.as_str())
                .push("messages");
        }
        url
    }
}

async fn rejected(response: Response) -> TransportError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => TransportError::Rejected {
            status,
            code: Some(api_error.code),
            message: api_error.message,
        },
        Err(_) => TransportError::Rejected {
            status,
            code: None,
            message: if body.trim().is_empty() {
                "empty response body".to_string()
            } else {
                body
            },
        },
    }
}

#[async_trait]
impl MessageApi for HttpMessageApi {
    async fn send_message(
        &self,
        conversation_id: &ConversationId,
        request: &SendMessageRequest,
    ) -> Result<MessagePayload> {
        let url = self.messages_url(conversation_id);
        debug!(conversation_id = %conversation_id, "http: POST {url}");
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("failed to send message to conversation {conversation_id}"))?;
        if !response.status().is_success() {
            return Err(rejected(response).await.into());
        }
        let body: SendMessageResponse = response
            .json()
            .await
            .context("invalid send message response")?;
        Ok(body.message)
    }

    async fn fetch_messages(&self, conversation_id: &ConversationId) -> Result<Vec<MessagePayload>> {
        let url = self.messages_url(conversation_id);
        debug!(conversation_id = %conversation_id, "http: GET {url}");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to fetch messages for conversation {conversation_id}"))?;
        if !response.status().is_success() {
            return Err(rejected(response).await.into());
        }
        let body: MessageListResponse = response
            .json()
            .await
            .context("invalid message list response")?;
        Ok(body.into_messages())
    }
}
