#[cfg(test)]
#[path = "remote_test.rs"]
mod tests;

use std::time;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::Deserialize;

use crate::backend::NexusError;
use crate::backend::nexus::check_status;
use crate::backend::utils::endpoint_url;
use crate::config::{BackendConfig, user_agent};
use crate::models::utils::{deserialize_id, deserialize_timestamp};
use crate::models::{Conversation, ConversationSummary, Message, NewConversation, Role};

use super::SessionStore;

/// Session store backed by the `/history` endpoints of the NEXUS API.
pub struct RemoteStore {
    endpoint: String,
    timeout: Option<time::Duration>,
    client: reqwest::Client,
}

#[async_trait]
impl SessionStore for RemoteStore {
    async fn list_conversations(&self, limit: usize) -> Vec<ConversationSummary> {
        match self.fetch_conversations(limit).await {
            Ok(conversations) => conversations,
            Err(err) => {
                log::error!("Failed to load history: {:#}", err);
                vec![]
            }
        }
    }

    async fn get_conversation(&self, id: String) -> Option<Conversation> {
        match self.fetch_conversation(&id).await {
            Ok(conversation) => conversation,
            Err(err) => {
                log::error!("Failed to load conversation {}: {:#}", id, err);
                None
            }
        }
    }

    async fn create_conversation(&self, req: NewConversation) -> Option<String> {
        match self.post_conversation(&req).await {
            Ok(id) => {
                log::debug!("Created conversation {} ({:?})", id, req.title);
                Some(id)
            }
            Err(err) => {
                log::error!("Failed to create conversation: {:#}", err);
                None
            }
        }
    }

    async fn add_message(&self, conversation_id: String, message: Message) -> bool {
        match self.post_message(&conversation_id, &message).await {
            Ok(()) => true,
            Err(err) => {
                log::error!(
                    "Failed to save {} message to conversation {}: {:#}",
                    message.role(),
                    conversation_id,
                    err
                );
                false
            }
        }
    }

    async fn delete_conversation(&self, id: String) -> bool {
        match self.delete(&["history", id.as_str()]).await {
            Ok(()) => true,
            Err(err) => {
                log::error!("Failed to delete conversation {}: {:#}", id, err);
                false
            }
        }
    }

    async fn clear_history(&self) -> bool {
        match self.delete(&["history"]).await {
            Ok(()) => true,
            Err(err) => {
                log::error!("Failed to clear history: {:#}", err);
                false
            }
        }
    }

    async fn search(&self, query: String, limit: usize) -> Vec<ConversationSummary> {
        match self.fetch_search(&query, limit).await {
            Ok(results) => results,
            Err(err) => {
                log::error!("Search for {:?} failed: {:#}", query, err);
                vec![]
            }
        }
    }
}

impl RemoteStore {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn request(
        &self,
        method: reqwest::Method,
        segments: &[&str],
    ) -> Result<reqwest::RequestBuilder> {
        let url = endpoint_url(&self.endpoint, segments)?;
        let mut req = self
            .client
            .request(method, url)
            .header("User-Agent", user_agent());
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        Ok(req)
    }

    async fn fetch_conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>> {
        let res = self
            .request(reqwest::Method::GET, &["history"])?
            .query(&[("limit", limit)])
            .send()
            .await
            .wrap_err("listing conversations")?;

        let res = check_status(res)
            .await?
            .json::<HistoryResponse>()
            .await
            .wrap_err("parsing history response")?;
        Ok(res.conversations.into_iter().map(Into::into).collect())
    }

    async fn fetch_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let res = self
            .request(reqwest::Method::GET, &["history", id])?
            .send()
            .await
            .wrap_err(format!("fetching conversation {}", id))?;

        let res = match check_status(res).await {
            Ok(res) => res,
            Err(err)
                if err
                    .downcast_ref::<NexusError>()
                    .is_some_and(NexusError::is_not_found) =>
            {
                log::debug!("Conversation {} not found", id);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let conversation = res
            .json::<ConversationResponse>()
            .await
            .wrap_err("parsing conversation response")?;
        Ok(Some(conversation.into()))
    }

    async fn post_conversation(&self, req: &NewConversation) -> Result<String> {
        let mut form = vec![("title", req.title.as_str())];
        if let Some(model) = req.model.as_deref() {
            form.push(("model", model));
        }

        let res = self
            .request(reqwest::Method::POST, &["history", "create"])?
            .form(&form)
            .send()
            .await
            .wrap_err("creating conversation")?;

        let res = check_status(res)
            .await?
            .json::<CreatedResponse>()
            .await
            .wrap_err("parsing create response")?;
        Ok(res.id)
    }

    async fn post_message(&self, conversation_id: &str, message: &Message) -> Result<()> {
        let mut form = vec![
            ("role", message.role().as_str()),
            ("content", message.content()),
        ];
        if let Some(model) = message.model() {
            form.push(("model", model));
        }

        let res = self
            .request(
                reqwest::Method::POST,
                &["history", conversation_id, "message"],
            )?
            .form(&form)
            .send()
            .await
            .wrap_err("saving message")?;
        check_status(res).await?;
        Ok(())
    }

    async fn delete(&self, segments: &[&str]) -> Result<()> {
        let res = self
            .request(reqwest::Method::DELETE, segments)?
            .send()
            .await
            .wrap_err(format!("deleting /{}", segments.join("/")))?;
        check_status(res).await?;
        Ok(())
    }

    async fn fetch_search(&self, query: &str, limit: usize) -> Result<Vec<ConversationSummary>> {
        let res = self
            .request(reqwest::Method::GET, &["history", "search", query])?
            .query(&[("limit", limit)])
            .send()
            .await
            .wrap_err("searching history")?;

        let res = check_status(res)
            .await?
            .json::<SearchResponse>()
            .await
            .wrap_err("parsing search response")?;
        Ok(res.results.into_iter().map(Into::into).collect())
    }
}

impl From<&BackendConfig> for RemoteStore {
    fn from(value: &BackendConfig) -> Self {
        let mut store = RemoteStore::new(&value.endpoint);
        store.timeout = value.timeout();
        store
    }
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    conversations: Vec<SummaryResponse>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SummaryResponse>,
}

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    #[serde(deserialize_with = "deserialize_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    #[serde(deserialize_with = "deserialize_id")]
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message_count: Option<usize>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ConversationResponse {
    #[serde(deserialize_with = "deserialize_id")]
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    messages: Vec<MessageResponse>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    timestamp: Option<DateTime<Utc>>,
}

impl From<SummaryResponse> for ConversationSummary {
    fn from(value: SummaryResponse) -> Self {
        Self {
            id: value.id,
            title: value.title.unwrap_or_default(),
            model: value.model,
            message_count: value.message_count.unwrap_or_default(),
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl From<ConversationResponse> for Conversation {
    fn from(value: ConversationResponse) -> Self {
        let messages = value
            .messages
            .into_iter()
            .filter_map(MessageResponse::into_message)
            .collect();

        Conversation::new(value.id)
            .with_title(value.title.unwrap_or_default())
            .with_model(value.model)
            .with_messages(messages)
            .with_created_at(value.created_at)
            .with_updated_at(value.updated_at)
    }
}

impl MessageResponse {
    fn into_message(self) -> Option<Message> {
        let role = match self.role.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            other => {
                log::warn!("Skipping stored message with role {:?}", other);
                return None;
            }
        };

        let mut message = Message::new(role, self.content.unwrap_or_default());
        if let Some(model) = self.model {
            message = message.with_model(model);
        }
        if let Some(timestamp) = self.timestamp {
            message = message.with_created_at(timestamp);
        }
        Some(message)
    }
}
