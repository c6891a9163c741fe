pub mod remote;

use std::sync::Arc;

use crate::{
    config::BackendConfig,
    models::{Conversation, ConversationSummary, Message, NewConversation},
};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use remote::RemoteStore;

/// Conversation persistence. Every implementation absorbs its own failures:
/// a broken store degrades to empty lists and `false`/`None`, it never stops
/// a chat turn.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait SessionStore {
    /// Most recent first, at most `limit` rows.
    async fn list_conversations(&self, limit: usize) -> Vec<ConversationSummary>;
    async fn get_conversation(&self, id: String) -> Option<Conversation>;
    /// Returns the id of the new conversation.
    async fn create_conversation(&self, req: NewConversation) -> Option<String>;
    async fn add_message(&self, conversation_id: String, message: Message) -> bool;
    async fn delete_conversation(&self, id: String) -> bool;
    async fn clear_history(&self) -> bool;
    async fn search(&self, query: String, limit: usize) -> Vec<ConversationSummary>;
}

pub type ArcSessionStore = Arc<dyn SessionStore + Send + Sync>;

pub fn new_session_store(config: &BackendConfig) -> ArcSessionStore {
    Arc::new(RemoteStore::from(config))
}
